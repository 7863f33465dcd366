//! Typed path/query route table (spec §4.6).
//!
//! This is a first-class matcher independent of axum's own router: routes
//! are matched in insertion order, path segments and query parameters are
//! coerced to declared types, and a raw-regex variant matches the full path
//! with no captures. The HTTP dispatcher (`crate::server`) uses axum purely
//! as transport and asks this table to pick the route.

mod pattern;

pub use pattern::{ParamType, ParamValue, ParameterError, Pattern};

use axum::http::Method;

/// What a matched route's handler should do; the dispatcher matches on this
/// to call the right async handler function (spec §4.7 "standard handlers").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerId {
    ProbeAll,
    ProbeDevice,
    CurrentAll,
    CurrentDevice,
    SampleAll,
    SampleDevice,
    AssetList,
    AssetIds,
    AdapterCommandPut,
    AdapterCommandDelete,
}

pub struct Route {
    pub method: Method,
    pub pattern: Pattern,
    pub handler: HandlerId,
}

/// Parameters extracted from a successful match: path captures first, then
/// query parameters, all in declaration order.
pub type Params = std::collections::HashMap<String, ParamValue>;

#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, method: Method, pattern_str: &str, handler: HandlerId) {
        let pattern = Pattern::parse(pattern_str).unwrap_or_else(|e| {
            panic!("invalid route pattern {pattern_str:?}: {e}");
        });
        self.routes.push(Route { method, pattern, handler });
    }

    pub fn insert_regex(&mut self, method: Method, regex: &str, handler: HandlerId) {
        let pattern = Pattern::parse_regex(regex).unwrap_or_else(|e| {
            panic!("invalid regex route pattern {regex:?}: {e}");
        });
        self.routes.push(Route { method, pattern, handler });
    }

    /// First matching route in insertion order (spec §8 property 4). Once a
    /// route's verb+path match, parameter coercion failure is surfaced as
    /// `ParameterError` for *that* route rather than falling through to the
    /// next one (spec §8 S5).
    pub fn dispatch(
        &self,
        method: &Method,
        path: &str,
        query: &str,
    ) -> Option<Result<(HandlerId, Params), ParameterError>> {
        for route in &self.routes {
            if &route.method != method {
                continue;
            }
            match route.pattern.matches(path, query) {
                Some(Ok(params)) => return Some(Ok((route.handler, params))),
                Some(Err(e)) => return Some(Err(e)),
                None => continue,
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_table() -> RouteTable {
        let mut table = RouteTable::new();
        table.insert(
            Method::GET,
            "/{device}/sample?from={unsigned_integer}&count={integer:100}",
            HandlerId::SampleDevice,
        );
        table
    }

    #[test]
    fn s4_routing_defaults_and_captures() {
        let table = sample_table();
        let (handler, params) = table.dispatch(&Method::GET, "/ABC123/sample", "").unwrap().unwrap();
        assert_eq!(handler, HandlerId::SampleDevice);
        assert_eq!(params.get("device"), Some(&ParamValue::String("ABC123".into())));
        assert_eq!(params.get("count"), Some(&ParamValue::Integer(100)));
        assert!(!params.contains_key("from"));
    }

    #[test]
    fn s5_parameter_error() {
        let table = sample_table();
        let err = table
            .dispatch(&Method::GET, "/ABC123/sample", "count=xxx")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ParameterError::TypeMismatch { .. }));
    }

    #[test]
    fn property_4_first_match_wins() {
        let mut table = RouteTable::new();
        table.insert(Method::GET, "/probe", HandlerId::ProbeAll);
        table.insert(Method::GET, "/probe", HandlerId::ProbeDevice);
        let (handler, _) = table.dispatch(&Method::GET, "/probe", "").unwrap().unwrap();
        assert_eq!(handler, HandlerId::ProbeAll);
    }

    #[test]
    fn no_match_returns_none() {
        let table = sample_table();
        assert!(table.dispatch(&Method::GET, "/nope", "").is_none());
    }
}
