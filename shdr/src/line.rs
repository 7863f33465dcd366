use time::format_description::well_known::Iso8601;
use time::OffsetDateTime;

/// One decoded logical SHDR record. Multiline accumulation has already been
/// resolved by the time this type is produced (see [`crate::codec::ShdrDecoder`]).
#[derive(Debug, Clone, PartialEq)]
pub enum ShdrRecord {
    /// `* key: value` protocol command.
    Command { key: String, value: String },
    /// `TIMESTAMP|KEY|VALUE[|KEY|VALUE...]` observation line.
    Data(DataLine),
}

/// A parsed (but not yet data-set-aware) observation line.
///
/// `timestamp` is `None` when the timestamp field was empty or failed to
/// parse as ISO-8601 — callers fall back to the adapter's receive time per
/// spec (malformed timestamps are a warning, not a dropped observation).
#[derive(Debug, Clone, PartialEq)]
pub struct DataLine {
    pub timestamp: Option<OffsetDateTime>,
    pub timestamp_was_malformed: bool,
    /// (data item key, raw value token) in the order they appeared on the wire.
    pub pairs: Vec<(String, String)>,
}

/// Parse one already-dequeued, already-multiline-resolved line into a record.
///
/// Returns `None` for blank lines, which callers should simply ignore.
pub fn parse_line(line: &str) -> Option<ShdrRecord> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    if let Some(rest) = line.strip_prefix('*') {
        return Some(parse_command(rest));
    }
    Some(ShdrRecord::Data(parse_data_line(line)))
}

/// Resolve a multiline record: `prefix` is the header line up to (excluding)
/// the `--multiline--TOKEN` marker, `continuation` is the accumulated body of
/// intervening lines joined by `\n`. The continuation text is appended,
/// verbatim and without further `|`-splitting, to the value of the last
/// field on the prefix line — this is what lets a multiline value embed `|`
/// characters (e.g. an inline XML/asset payload) per spec.
pub fn parse_multiline(prefix: &str, continuation: &str) -> Option<ShdrRecord> {
    let prefix = prefix.trim_end_matches(['\r', '\n']);
    if let Some(rest) = prefix.strip_prefix('*') {
        let ShdrRecord::Command { key, value } = parse_command(rest) else {
            unreachable!()
        };
        let value = if continuation.is_empty() {
            value
        } else {
            format!("{value}\n{continuation}")
        };
        return Some(ShdrRecord::Command { key, value });
    }
    let mut data = parse_data_line(prefix);
    if let Some((_, last_value)) = data.pairs.last_mut() {
        if !continuation.is_empty() {
            last_value.push('\n');
            last_value.push_str(continuation);
        }
    } else if !continuation.is_empty() {
        // No data-item pairs on the header line: nothing to attach the body
        // to but the timestamp field itself was the whole line. Drop it as
        // an (unreachable in practice) malformed multiline header.
        return None;
    }
    Some(ShdrRecord::Data(data))
}

fn parse_command(rest: &str) -> ShdrRecord {
    let rest = rest.trim_start();
    match rest.split_once(':') {
        Some((key, value)) => ShdrRecord::Command {
            key: key.trim().to_string(),
            value: value.trim().to_string(),
        },
        None => ShdrRecord::Command {
            key: rest.trim().to_string(),
            value: String::new(),
        },
    }
}

fn parse_data_line(line: &str) -> DataLine {
    let mut tokens = line.split('|');
    let timestamp_token = tokens.next().unwrap_or_default();
    let (timestamp, timestamp_was_malformed) = if timestamp_token.trim().is_empty() {
        (None, false)
    } else {
        match OffsetDateTime::parse(timestamp_token, &Iso8601::DEFAULT) {
            Ok(ts) => (Some(ts), false),
            Err(_) => (None, true),
        }
    };

    let rest: Vec<&str> = tokens.collect();
    let mut pairs = Vec::with_capacity(rest.len() / 2);
    let mut chunks = rest.chunks_exact(2);
    for chunk in &mut chunks {
        pairs.push((chunk[0].to_string(), chunk[1].to_string()));
    }
    // A dangling key with no value is dropped silently; the caller logs a
    // warning if it wants to (parity with "unknown data-item keys" handling).

    DataLine {
        timestamp,
        timestamp_was_malformed,
        pairs,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_command() {
        let rec = parse_line("* conversionRequired: yes").unwrap();
        assert_eq!(
            rec,
            ShdrRecord::Command {
                key: "conversionRequired".into(),
                value: "yes".into()
            }
        );
    }

    #[test]
    fn parses_command_no_value() {
        let rec = parse_line("*foo").unwrap();
        assert_eq!(
            rec,
            ShdrRecord::Command {
                key: "foo".into(),
                value: "".into()
            }
        );
    }

    #[test]
    fn parses_data_line_with_timestamp() {
        let rec =
            parse_line("2023-01-01T00:00:00.000000Z|avail|AVAILABLE|power|ON").unwrap();
        let ShdrRecord::Data(data) = rec else {
            panic!("expected data line");
        };
        assert!(data.timestamp.is_some());
        assert!(!data.timestamp_was_malformed);
        assert_eq!(
            data.pairs,
            vec![
                ("avail".to_string(), "AVAILABLE".to_string()),
                ("power".to_string(), "ON".to_string())
            ]
        );
    }

    #[test]
    fn empty_timestamp_uses_receive_time() {
        let rec = parse_line("|avail|AVAILABLE").unwrap();
        let ShdrRecord::Data(data) = rec else {
            panic!("expected data line");
        };
        assert_eq!(data.timestamp, None);
        assert!(!data.timestamp_was_malformed);
    }

    #[test]
    fn malformed_timestamp_is_flagged() {
        let rec = parse_line("not-a-time|avail|AVAILABLE").unwrap();
        let ShdrRecord::Data(data) = rec else {
            panic!("expected data line");
        };
        assert_eq!(data.timestamp, None);
        assert!(data.timestamp_was_malformed);
    }

    #[test]
    fn dangling_key_is_dropped() {
        let rec = parse_line("|avail|AVAILABLE|dangling").unwrap();
        let ShdrRecord::Data(data) = rec else {
            panic!("expected data line");
        };
        assert_eq!(data.pairs, vec![("avail".to_string(), "AVAILABLE".to_string())]);
    }

    #[test]
    fn blank_line_is_none() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   \r\n"), None);
    }
}
