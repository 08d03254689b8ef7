use log::warn;
use serde::Deserialize;

/// Splits an unbounded byte stream into complete lines. Network reads can cut
/// a line (or a multi-byte character) anywhere, so bytes are buffered until a
/// newline arrives; a partial trailing line is held back for the next push.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk; returns every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let rest = self.buffer.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.buffer, rest);
            line.pop(); // trailing \n
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

#[derive(Deserialize)]
struct StreamFrame {
    chunk: Option<String>,
}

/// Extract the incremental text fragment from one stream line. Lines without
/// the `data: ` prefix (comments, done sentinels, keep-alives) are ignored; a
/// line that fails to parse is logged and skipped so consumption continues.
pub fn parse_data_line(line: &str) -> Option<String> {
    let data = line.trim().strip_prefix("data: ")?;
    if data == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<StreamFrame>(data) {
        Ok(frame) => frame.chunk,
        Err(e) => {
            warn!("Error parsing stream frame: {} for data: {}", e, data);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_chunks(reads: &[&[u8]]) -> String {
        let mut decoder = SseLineDecoder::new();
        let mut accumulated = String::new();
        for read in reads {
            for line in decoder.push(read) {
                if let Some(chunk) = parse_data_line(&line) {
                    accumulated.push_str(&chunk);
                }
            }
        }
        accumulated
    }

    #[test]
    fn whole_payload_in_one_read() {
        let text = collect_chunks(&[b"data: {\"chunk\":\"Hel\"}\ndata: {\"chunk\":\"lo\"}\n"]);
        assert_eq!(text, "Hello");
    }

    #[test]
    fn line_split_across_reads_yields_same_content() {
        // Same payload, boundary in the middle of the second `data:` prefix.
        let text = collect_chunks(&[b"data: {\"chunk\":\"Hel\"}\nda", b"ta: {\"chunk\":\"lo\"}\n"]);
        assert_eq!(text, "Hello");
    }

    #[test]
    fn every_single_byte_boundary_yields_same_content() {
        let payload: &[u8] = b"data: {\"chunk\":\"Hel\"}\ndata: {\"chunk\":\"lo\"}\n";
        for split in 0..payload.len() {
            let (a, b) = payload.split_at(split);
            assert_eq!(collect_chunks(&[a, b]), "Hello", "split at {}", split);
        }
    }

    #[test]
    fn multibyte_character_split_across_reads() {
        let payload = "data: {\"chunk\":\"héllo\"}\n".as_bytes();
        // Cut inside the two-byte encoding of 'é'.
        let cut = payload.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let (a, b) = payload.split_at(cut);
        assert_eq!(collect_chunks(&[a, b]), "héllo");
    }

    #[test]
    fn unrecognized_lines_are_ignored() {
        let text = collect_chunks(
            &[b": keep-alive\nevent: done\ndata: {\"chunk\":\"ok\"}\ndata: [DONE]\n"]
        );
        assert_eq!(text, "ok");
    }

    #[test]
    fn parse_failure_does_not_abort_the_stream() {
        let text = collect_chunks(
            &[b"data: {not json\ndata: {\"chunk\":\"still \"}\ndata: {\"chunk\":\"here\"}\n"]
        );
        assert_eq!(text, "still here");
    }

    #[test]
    fn crlf_terminated_lines_are_handled() {
        let text = collect_chunks(&[b"data: {\"chunk\":\"win\"}\r\n"]);
        assert_eq!(text, "win");
    }

    #[test]
    fn trailing_partial_line_is_held_back() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(b"data: {\"chunk\":\"never finished").is_empty());
        let lines = decoder.push(b"\"}\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(parse_data_line(&lines[0]).unwrap(), "never finished");
    }
}
