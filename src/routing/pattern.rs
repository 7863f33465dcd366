use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

use super::Params;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("parameter {name:?} could not be parsed as {expected}: {raw:?}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        raw: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    UnsignedInteger,
    Double,
    Bool,
}

impl ParamType {
    fn parse(self, name: &str, raw: &str) -> Result<ParamValue, ParameterError> {
        let err = || ParameterError::TypeMismatch {
            name: name.to_string(),
            expected: self.label(),
            raw: raw.to_string(),
        };
        Ok(match self {
            ParamType::String => ParamValue::String(raw.to_string()),
            ParamType::Integer => ParamValue::Integer(raw.parse().map_err(|_| err())?),
            ParamType::UnsignedInteger => ParamValue::UnsignedInteger(raw.parse().map_err(|_| err())?),
            ParamType::Double => ParamValue::Double(raw.parse().map_err(|_| err())?),
            ParamType::Bool => ParamValue::Bool(parse_bool(raw).ok_or_else(err)?),
        })
    }

    fn label(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::UnsignedInteger => "unsigned_integer",
            ParamType::Double => "double",
            ParamType::Bool => "bool",
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Integer(i64),
    UnsignedInteger(u64),
    Double(f64),
    Bool(bool),
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Capture { name: String, ty: ParamType },
}

#[derive(Debug, Clone)]
struct QueryParam {
    name: String,
    ty: ParamType,
    default: Option<String>,
}

enum PatternKind {
    Segments {
        segments: Vec<Segment>,
        query: Vec<QueryParam>,
    },
    Regex(Regex),
}

pub struct Pattern {
    kind: PatternKind,
}

impl Pattern {
    pub fn parse(spec: &str) -> Result<Self, String> {
        let (path_part, query_part) = match spec.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (spec, None),
        };

        let segments = path_part
            .trim_start_matches('/')
            .trim_end_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(parse_segment)
            .collect::<Result<Vec<_>, _>>()?;

        let query = query_part
            .map(|q| q.split('&').filter(|s| !s.is_empty()).map(parse_query_param).collect::<Result<Vec<_>, _>>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            kind: PatternKind::Segments { segments, query },
        })
    }

    pub fn parse_regex(spec: &str) -> Result<Self, String> {
        let re = Regex::new(spec).map_err(|e| e.to_string())?;
        Ok(Self { kind: PatternKind::Regex(re) })
    }

    /// Returns `None` for no match, `Some(Ok(params))` on a full match, or
    /// `Some(Err(_))` when the path matched but a parameter failed to
    /// coerce (spec §8 S5).
    pub fn matches(&self, path: &str, query: &str) -> Option<Result<Params, ParameterError>> {
        match &self.kind {
            PatternKind::Regex(re) => {
                if re.is_match(path) {
                    Some(Ok(Params::new()))
                } else {
                    None
                }
            }
            PatternKind::Segments { segments, query: query_params } => {
                let path_tokens: Vec<&str> = path
                    .trim_start_matches('/')
                    .trim_end_matches('/')
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .collect();
                if path_tokens.len() != segments.len() {
                    return None;
                }
                let mut params = Params::new();
                for (segment, token) in segments.iter().zip(path_tokens.iter()) {
                    match segment {
                        Segment::Literal(lit) => {
                            if lit != token {
                                return None;
                            }
                        }
                        Segment::Capture { name, ty } => match ty.parse(name, token) {
                            Ok(value) => {
                                params.insert(name.clone(), value);
                            }
                            Err(e) => return Some(Err(e)),
                        },
                    }
                }

                let query_map = parse_query_string(query);
                for qp in query_params {
                    match query_map.get(qp.name.as_str()) {
                        Some(raw) => match qp.ty.parse(&qp.name, raw) {
                            Ok(value) => {
                                params.insert(qp.name.clone(), value);
                            }
                            Err(e) => return Some(Err(e)),
                        },
                        None => {
                            if let Some(default) = &qp.default {
                                // Defaults are pre-validated at pattern parse time.
                                let value = qp.ty.parse(&qp.name, default).expect("default already validated");
                                params.insert(qp.name.clone(), value);
                            }
                        }
                    }
                }
                Some(Ok(params))
            }
        }
    }
}

fn parse_query_string(query: &str) -> HashMap<&str, &str> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| pair.split_once('='))
        .collect()
}

fn parse_segment(token: &str) -> Result<Segment, String> {
    if let Some(inner) = token.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        let (name, ty) = match inner.split_once(':') {
            Some((n, t)) => (n, parse_type(t)?),
            None => (inner, ParamType::String),
        };
        Ok(Segment::Capture { name: name.to_string(), ty })
    } else {
        Ok(Segment::Literal(token.to_string()))
    }
}

fn parse_query_param(token: &str) -> Result<QueryParam, String> {
    let (name, rest) = token
        .split_once('=')
        .ok_or_else(|| format!("malformed query parameter {token:?}, expected name={{type}}"))?;
    let inner = rest
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| format!("malformed query parameter {token:?}, expected name={{type}}"))?;
    let (ty_str, default) = match inner.split_once(':') {
        Some((t, d)) => (t, Some(d.to_string())),
        None => (inner, None),
    };
    Ok(QueryParam {
        name: name.to_string(),
        ty: parse_type(ty_str)?,
        default,
    })
}

fn parse_type(raw: &str) -> Result<ParamType, String> {
    match raw {
        "string" => Ok(ParamType::String),
        "integer" => Ok(ParamType::Integer),
        "unsigned_integer" => Ok(ParamType::UnsignedInteger),
        "double" => Ok(ParamType::Double),
        "bool" => Ok(ParamType::Bool),
        other => Err(format!("unknown parameter type {other:?}")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn literal_and_capture_segments() {
        let pattern = Pattern::parse("/{device}/probe").unwrap();
        let params = pattern.matches("/ABC123/probe", "").unwrap().unwrap();
        assert_eq!(params.get("device"), Some(&ParamValue::String("ABC123".into())));
    }

    #[test]
    fn typed_capture_coerces() {
        let pattern = Pattern::parse("/{id:integer}").unwrap();
        let params = pattern.matches("/42", "").unwrap().unwrap();
        assert_eq!(params.get("id"), Some(&ParamValue::Integer(42)));
    }

    #[test]
    fn typed_capture_mismatch_is_parameter_error() {
        let pattern = Pattern::parse("/{id:integer}").unwrap();
        let err = pattern.matches("/not-a-number", "").unwrap().unwrap_err();
        assert!(matches!(err, ParameterError::TypeMismatch { .. }));
    }

    #[test]
    fn query_default_applies_when_missing() {
        let pattern = Pattern::parse("/sample?count={integer:100}").unwrap();
        let params = pattern.matches("/sample", "").unwrap().unwrap();
        assert_eq!(params.get("count"), Some(&ParamValue::Integer(100)));
    }

    #[test]
    fn query_without_default_is_omitted_when_missing() {
        let pattern = Pattern::parse("/sample?from={unsigned_integer}").unwrap();
        let params = pattern.matches("/sample", "").unwrap().unwrap();
        assert!(!params.contains_key("from"));
    }

    #[test]
    fn unknown_extra_query_params_are_ignored() {
        let pattern = Pattern::parse("/sample?count={integer:100}").unwrap();
        let params = pattern.matches("/sample", "count=5&bogus=1").unwrap().unwrap();
        assert_eq!(params.get("count"), Some(&ParamValue::Integer(5)));
    }

    #[test]
    fn trailing_slash_is_ignored() {
        let pattern = Pattern::parse("/probe").unwrap();
        assert!(pattern.matches("/probe/", "").is_some());
    }

    #[test]
    fn wrong_segment_count_does_not_match() {
        let pattern = Pattern::parse("/{device}/probe").unwrap();
        assert!(pattern.matches("/probe", "").is_none());
    }

    #[test]
    fn raw_regex_variant_matches_full_path_with_no_captures() {
        let pattern = Pattern::parse_regex("^/asset/[^/]+$").unwrap();
        let result = pattern.matches("/asset/abc-123", "").unwrap().unwrap();
        assert!(result.is_empty());
        assert!(pattern.matches("/asset/abc-123/extra", "").is_none());
    }
}
