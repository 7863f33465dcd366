use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ShdrError;
use crate::line::{parse_line, parse_multiline, ShdrRecord};

const MAX_LINE: usize = 64 * 1024;
const MAX_MULTILINE_BODY: usize = 16 * 1024 * 1024;

const MULTILINE_MARKER: &str = "--multiline--";

#[derive(Debug, Default)]
enum Accumulator {
    #[default]
    Idle,
    Multiline {
        terminator: String,
        prefix: String,
        continuation: String,
    },
}

/// Decodes a byte stream of `\n`-terminated SHDR lines into [`ShdrRecord`]s,
/// transparently resolving the `--multiline--TOKEN` continuation mechanism
/// so callers never see raw continuation lines.
#[derive(Debug, Default)]
pub struct ShdrDecoder {
    acc: Accumulator,
}

impl ShdrDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn feed_line(&mut self, line: &str) -> Result<Option<ShdrRecord>, ShdrError> {
        match &mut self.acc {
            Accumulator::Multiline {
                terminator,
                prefix,
                continuation,
            } => {
                if line == terminator {
                    let prefix = std::mem::take(prefix);
                    let continuation = std::mem::take(continuation);
                    self.acc = Accumulator::Idle;
                    return Ok(parse_multiline(&prefix, &continuation));
                }
                if continuation.len() + line.len() > MAX_MULTILINE_BODY {
                    let terminator = terminator.clone();
                    self.acc = Accumulator::Idle;
                    return Err(ShdrError::MultilineTooLong {
                        terminator,
                        max: MAX_MULTILINE_BODY,
                    });
                }
                if !continuation.is_empty() {
                    continuation.push('\n');
                }
                continuation.push_str(line);
                Ok(None)
            }
            Accumulator::Idle => {
                if let Some(marker_at) = line.find(MULTILINE_MARKER) {
                    let prefix = line[..marker_at].to_string();
                    let terminator = line[marker_at..].to_string();
                    self.acc = Accumulator::Multiline {
                        terminator,
                        prefix,
                        continuation: String::new(),
                    };
                    return Ok(None);
                }
                Ok(parse_line(line))
            }
        }
    }
}

impl Decoder for ShdrDecoder {
    type Item = ShdrRecord;
    type Error = ShdrError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(newline_at) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_LINE {
                    return Err(ShdrError::LineTooLong { max: MAX_LINE });
                }
                return Ok(None);
            };
            if newline_at > MAX_LINE {
                src.advance(newline_at + 1);
                return Err(ShdrError::LineTooLong { max: MAX_LINE });
            }
            let line_bytes = src.split_to(newline_at + 1);
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]);
            let line = line.trim_end_matches('\r');
            if let Some(record) = self.feed_line(line)? {
                return Ok(Some(record));
            }
            // Multiline continuation or a blank line: keep scanning this buffer.
        }
    }
}

/// Writes agent-to-adapter lines — in practice only `* PONG <ms>` heartbeat
/// replies (spec §4.3). The line is written verbatim with a trailing `\n`;
/// callers are responsible for the `* ` command prefix.
impl Encoder<String> for ShdrDecoder {
    type Error = ShdrError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encodes_line_with_trailing_newline() {
        let mut decoder = ShdrDecoder::new();
        let mut buf = BytesMut::new();
        decoder.encode("* PONG 10000".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"* PONG 10000\n");
    }

    #[test]
    fn decodes_plain_lines() {
        let mut decoder = ShdrDecoder::new();
        let mut buf = BytesMut::from("* device: foo\n2023-01-01T00:00:00Z|avail|AVAILABLE\n");
        let first = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(
            first,
            ShdrRecord::Command {
                key: "device".into(),
                value: "foo".into()
            }
        );
        let second = decoder.decode(&mut buf).unwrap();
        assert!(second.is_some());
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn incomplete_line_waits_for_more_bytes() {
        let mut decoder = ShdrDecoder::new();
        let mut buf = BytesMut::from("* device: fo");
        assert_eq!(decoder.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"o\n");
        assert!(decoder.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn multiline_is_joined_and_parsed_as_one_record() {
        let mut decoder = ShdrDecoder::new();
        let mut buf = BytesMut::from(
            "2023-01-01T00:00:00Z|msg|start--multiline--TOKEN\nline one\nline two\n--multiline--TOKEN\n",
        );
        let record = decoder.decode(&mut buf).unwrap().unwrap();
        let ShdrRecord::Data(data) = record else {
            panic!("expected data record");
        };
        assert_eq!(
            data.pairs,
            vec![("msg".to_string(), "start\nline one\nline two".to_string())]
        );
    }
}
