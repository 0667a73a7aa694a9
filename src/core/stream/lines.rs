/// Reassembles newline-delimited records from an arbitrary sequence of byte
/// chunks. Sources (HTTP bodies, child process pipes) split wherever they
/// please, including in the middle of a record or a multi-byte character, so
/// the buffer is kept as raw bytes and only converted to text at record
/// boundaries.
#[derive(Debug, Default)]
pub struct LineReassembler {
    carry: Vec<u8>,
}

impl LineReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every record completed by it, in arrival
    /// order. Blank records (empty or whitespace-only) are dropped; a single
    /// trailing carriage return is stripped so CRLF sources decode cleanly.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut records = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                if let Some(record) = take_record(&mut self.carry) {
                    records.push(record);
                }
            } else {
                self.carry.push(byte);
            }
        }
        records
    }

    /// Drains the carry-over buffer at end-of-input. Sources are not
    /// required to terminate their final record with a newline.
    pub fn finish(&mut self) -> Option<String> {
        take_record(&mut self.carry)
    }
}

fn take_record(carry: &mut Vec<u8>) -> Option<String> {
    if carry.last() == Some(&b'\r') {
        carry.pop();
    }
    let bytes = std::mem::take(carry);
    let record = String::from_utf8_lossy(&bytes).into_owned();
    if record.trim().is_empty() {
        None
    } else {
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_all(reassembler: &mut LineReassembler, chunks: &[&[u8]]) -> Vec<String> {
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(reassembler.push(chunk));
        }
        out.extend(reassembler.finish());
        out
    }

    #[test]
    fn complete_lines_come_out_in_order() {
        let mut lines = LineReassembler::new();
        let records = lines.push(b"alpha\nbeta\ngamma\n");
        assert_eq!(records, vec!["alpha", "beta", "gamma"]);
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn record_split_across_chunks_is_never_split_in_output() {
        let mut lines = LineReassembler::new();
        assert!(lines.push(b"hel").is_empty());
        assert!(lines.push(b"lo wor").is_empty());
        assert_eq!(lines.push(b"ld\n"), vec!["hello world"]);
    }

    #[test]
    fn unterminated_tail_is_emitted_on_finish() {
        let mut lines = LineReassembler::new();
        assert_eq!(lines.push(b"done\nleftover"), vec!["done"]);
        assert_eq!(lines.finish(), Some("leftover".to_string()));
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn blank_and_whitespace_records_are_filtered() {
        let mut lines = LineReassembler::new();
        let records = lines.push(b"one\n\n   \n\t\ntwo\n");
        assert_eq!(records, vec!["one", "two"]);
        assert!(lines.push(b"   ").is_empty());
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn trailing_carriage_return_is_stripped() {
        let mut lines = LineReassembler::new();
        assert_eq!(lines.push(b"crlf record\r\n"), vec!["crlf record"]);
    }

    #[test]
    fn split_inside_multibyte_character_is_buffered() {
        let text = "naïve — héllo\n";
        let bytes = text.as_bytes();
        // The emdash and accented characters are multi-byte; split at every
        // byte offset and make sure the record always comes out intact.
        for split in 0..bytes.len() {
            let mut lines = LineReassembler::new();
            let mut records = lines.push(&bytes[..split]);
            records.extend(lines.push(&bytes[split..]));
            assert_eq!(records, vec!["naïve — héllo"], "split at byte {split}");
        }
    }

    #[test]
    fn every_chunking_yields_the_same_record_sequence() {
        let input = "first record\n{\"type\":\"text\",\"content\":\"héllo\"}\n\n  \nlast — no newline";
        let bytes = input.as_bytes();
        let expected = collect_all(&mut LineReassembler::new(), &[bytes]);
        assert_eq!(
            expected,
            vec![
                "first record",
                "{\"type\":\"text\",\"content\":\"héllo\"}",
                "last — no newline"
            ]
        );

        // All two-way splits.
        for i in 0..=bytes.len() {
            let mut lines = LineReassembler::new();
            let got = collect_all(&mut lines, &[&bytes[..i], &bytes[i..]]);
            assert_eq!(got, expected, "two-way split at {i}");
        }

        // All three-way splits.
        for i in 0..=bytes.len() {
            for j in i..=bytes.len() {
                let mut lines = LineReassembler::new();
                let got = collect_all(&mut lines, &[&bytes[..i], &bytes[i..j], &bytes[j..]]);
                assert_eq!(got, expected, "three-way split at {i},{j}");
            }
        }

        // Byte-by-byte.
        let mut lines = LineReassembler::new();
        let mut got = Vec::new();
        for b in bytes {
            got.extend(lines.push(std::slice::from_ref(b)));
        }
        got.extend(lines.finish());
        assert_eq!(got, expected, "byte-by-byte");
    }

    #[test]
    fn empty_chunks_are_harmless() {
        let mut lines = LineReassembler::new();
        assert!(lines.push(b"").is_empty());
        assert_eq!(lines.push(b"data\n"), vec!["data"]);
        assert!(lines.push(b"").is_empty());
    }
}
