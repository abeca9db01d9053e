//! Newline framing for the serial JSON stream
//!
//! Outbound: one compact JSON object per line. Inbound: incremental line
//! assembly that is restartable across arbitrarily chunked reads.

use super::message::Command;
use crate::error::Result;

/// Serialize a command as compact JSON followed by `\n`
///
/// No line-length limit is enforced here; the payload size is whatever the
/// caller built. Do not feed untrusted, unbounded field values.
pub fn encode(command: &Command) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(command)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Incremental line assembler
///
/// Buffers raw bytes and yields complete `\n`-terminated lines, decoded with
/// lossy UTF-8 (invalid sequences become replacement characters, never an
/// error). The trailing partial line is kept as bytes so a multi-byte
/// character split across two reads survives intact.
#[derive(Default)]
pub struct LineFramer {
    remainder: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning all newly completed lines
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.remainder.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.remainder.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.remainder.drain(..=pos).collect();
            line.pop(); // drop the '\n'
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Bytes held back waiting for a terminating newline
    pub fn pending(&self) -> &[u8] {
        &self.remainder
    }

    /// Drop any buffered partial line
    pub fn reset(&mut self) {
        self.remainder.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_newline() {
        let cmd = Command::get_status();
        let bytes = encode(&cmd).unwrap();
        assert_eq!(*bytes.last().unwrap(), b'\n');
        let text = std::str::from_utf8(&bytes[..bytes.len() - 1]).unwrap();
        assert!(text.starts_with('{') && text.ends_with('}'));
        assert!(text.contains("\"command\":\"get_status\""));
    }

    #[test]
    fn test_feed_splits_complete_lines() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"one\ntwo\nthree");
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(framer.pending(), b"three");
    }

    #[test]
    fn test_partial_line_survives_across_calls() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"{\"type\":").is_empty());
        assert!(framer.feed(b"\"response\"").is_empty());
        let lines = framer.feed(b"}\n");
        assert_eq!(lines, vec!["{\"type\":\"response\"}"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_chunk_invariance() {
        // Reassembled output must not depend on how the input was chunked.
        let input = b"alpha\nbeta\n{\"k\":1}\ngamma";
        for chunk_size in 1..=input.len() {
            let mut framer = LineFramer::new();
            let mut lines = Vec::new();
            for chunk in input.chunks(chunk_size) {
                lines.extend(framer.feed(chunk));
            }
            let mut rebuilt = lines.join("\n").into_bytes();
            if !lines.is_empty() {
                rebuilt.push(b'\n');
            }
            rebuilt.extend_from_slice(framer.pending());
            assert_eq!(rebuilt, input, "chunk_size={}", chunk_size);
        }
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut framer = LineFramer::new();
        let input = "27.5°C\n".as_bytes();
        // Split inside the two-byte '°' sequence.
        let split = input.iter().position(|&b| b == 0xC2).unwrap() + 1;
        assert!(framer.feed(&input[..split]).is_empty());
        let lines = framer.feed(&input[split..]);
        assert_eq!(lines, vec!["27.5°C"]);
    }

    #[test]
    fn test_invalid_utf8_never_errors() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"\xFF\xFEok\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("ok"));
    }
}
