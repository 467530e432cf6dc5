//! Stream line demultiplexer.
//!
//! Reassembles arbitrary output chunks into complete lines and decodes each
//! line of the stdout tag protocol into a [`LogEntry`]. This reads untrusted
//! program output: malformed tags or markers never fail, the text just passes
//! through as plain `log` content.

use tsx_engine::protocol::{LINE_MARKER_PREFIX, LINE_MARKER_SUFFIX, TAG_SEPARATOR};

use crate::log_entry::{LogEntry, LogMethod};

/// Stateful line splitter + classifier for one run's combined output.
#[derive(Debug, Default)]
pub struct StreamLineDemuxer {
    /// Content received after the last newline
    pending: String,
    match_lines: bool,
}

impl StreamLineDemuxer {
    pub fn new(match_lines: bool) -> Self {
        Self {
            pending: String::new(),
            match_lines,
        }
    }

    /// Append a chunk and return the entries for every line it completed,
    /// in arrival order.
    pub fn feed(&mut self, chunk: &str) -> Vec<LogEntry> {
        self.pending.push_str(chunk);

        let Some(last_newline) = self.pending.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete[..last_newline]
            .split('\n')
            .map(|line| self.classify(line))
            .collect()
    }

    /// Emit the final unterminated line, if any. Called once at process exit.
    pub fn flush(&mut self) -> Option<LogEntry> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(self.classify(&line))
    }

    /// Partial line carried to the next `feed`.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    fn classify(&self, raw: &str) -> LogEntry {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let (method, rest) = strip_tag(raw);

        let (line, content) = if self.match_lines {
            extract_marker(rest)
        } else {
            (None, rest.to_string())
        };

        LogEntry::new(method, content, line)
    }
}

/// Detect and remove a leading method tag plus one separator.
fn strip_tag(line: &str) -> (LogMethod, &str) {
    for method in LogMethod::ALL {
        if let Some(rest) = line.strip_prefix(method.tag()) {
            return (method, rest.strip_prefix(TAG_SEPARATOR).unwrap_or(rest));
        }
    }
    (LogMethod::Log, line)
}

/// Find the first well-formed `[LINE_MARKER:<digits>]` and remove it along
/// with one following separator. Digits that are not a positive `u32`
/// leave the text untouched.
fn extract_marker(text: &str) -> (Option<u32>, String) {
    let mut search_from = 0;

    while let Some(found) = text[search_from..].find(LINE_MARKER_PREFIX) {
        let start = search_from + found;
        let digits_start = start + LINE_MARKER_PREFIX.len();
        let digits_len = text[digits_start..]
            .bytes()
            .take_while(|b| b.is_ascii_digit())
            .count();
        let digits_end = digits_start + digits_len;

        if digits_len > 0 && text[digits_end..].starts_with(LINE_MARKER_SUFFIX) {
            return match text[digits_start..digits_end].parse::<u32>() {
                Ok(n) if n > 0 => {
                    let after = &text[digits_end + LINE_MARKER_SUFFIX.len()..];
                    let after = after.strip_prefix(TAG_SEPARATOR).unwrap_or(after);
                    (Some(n), format!("{}{}", &text[..start], after))
                }
                _ => (None, text.to_string()),
            };
        }

        search_from = digits_start;
    }

    (None, text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type Shape = (String, Option<u32>, LogMethod);

    fn shapes(entries: &[LogEntry]) -> Vec<Shape> {
        entries
            .iter()
            .map(|e| (e.content.clone(), e.line, e.method))
            .collect()
    }

    fn feed_all(demux: &mut StreamLineDemuxer, chunks: &[&str]) -> Vec<LogEntry> {
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(demux.feed(chunk));
        }
        out.extend(demux.flush());
        out
    }

    #[test]
    fn test_complete_lines() {
        let mut demux = StreamLineDemuxer::new(true);
        let out = demux.feed("__LOG__ [LINE_MARKER:1] hi\n__ERR__ [LINE_MARKER:2] bad\n");
        assert_eq!(
            shapes(&out),
            vec![
                ("hi".to_string(), Some(1), LogMethod::Log),
                ("bad".to_string(), Some(2), LogMethod::Error),
            ]
        );
        assert_eq!(demux.pending(), "");
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut demux = StreamLineDemuxer::new(true);
        assert!(demux.feed("__WRN__ [LINE_MA").is_empty());
        assert_eq!(demux.pending(), "__WRN__ [LINE_MA");
        let out = demux.feed("RKER:12] careful\n__INF");
        assert_eq!(
            shapes(&out),
            vec![("careful".to_string(), Some(12), LogMethod::Warn)]
        );
        assert_eq!(demux.pending(), "__INF");
    }

    #[test]
    fn test_flush_emits_unterminated_line() {
        let mut demux = StreamLineDemuxer::new(true);
        assert!(demux.feed("__INF__ done").is_empty());
        let last = demux.flush().unwrap();
        assert_eq!(last.method, LogMethod::Info);
        assert_eq!(last.content, "done");
        assert!(demux.flush().is_none());
    }

    #[test]
    fn test_flush_without_pending() {
        let mut demux = StreamLineDemuxer::new(true);
        demux.feed("__LOG__ x\n");
        assert!(demux.flush().is_none());
    }

    #[test]
    fn test_error_tag_stripped() {
        let mut demux = StreamLineDemuxer::new(false);
        let out = demux.feed("__ERR__ Uncaught Exception: boom\n");
        assert_eq!(out[0].method, LogMethod::Error);
        assert_eq!(out[0].content, "Uncaught Exception: boom");
    }

    #[test]
    fn test_tag_without_separator() {
        let mut demux = StreamLineDemuxer::new(false);
        let out = demux.feed("__WRN__careful\n");
        assert_eq!(out[0].method, LogMethod::Warn);
        assert_eq!(out[0].content, "careful");
    }

    #[test]
    fn test_untagged_line_is_plain_log() {
        let mut demux = StreamLineDemuxer::new(true);
        let out = demux.feed("node: warning something\n");
        assert_eq!(
            shapes(&out),
            vec![("node: warning something".to_string(), None, LogMethod::Log)]
        );
    }

    #[test]
    fn test_tag_only_recognised_as_prefix() {
        let mut demux = StreamLineDemuxer::new(false);
        let out = demux.feed("text __ERR__ inside\n");
        assert_eq!(out[0].method, LogMethod::Log);
        assert_eq!(out[0].content, "text __ERR__ inside");
    }

    #[test]
    fn test_marker_ignored_when_matching_off() {
        let mut demux = StreamLineDemuxer::new(false);
        let out = demux.feed("__LOG__ [LINE_MARKER:7] hi\n");
        assert_eq!(out[0].line, None);
        assert_eq!(out[0].content, "[LINE_MARKER:7] hi");
    }

    #[test]
    fn test_marker_extracted() {
        let mut demux = StreamLineDemuxer::new(true);
        let out = demux.feed("[LINE_MARKER:7] value\n");
        assert_eq!(out[0].line, Some(7));
        assert_eq!(out[0].content, "value");
    }

    #[test]
    fn test_unparseable_marker_left_alone() {
        let mut demux = StreamLineDemuxer::new(true);
        for raw in [
            "__LOG__ [LINE_MARKER:abc] x",
            "__LOG__ [LINE_MARKER:] x",
            "__LOG__ [LINE_MARKER:0] x",
            "__LOG__ [LINE_MARKER:99999999999999999999] x",
            "__LOG__ [LINE_MARKER:12 x",
        ] {
            let out = demux.feed(&format!("{}\n", raw));
            assert_eq!(out[0].line, None, "for {}", raw);
            assert_eq!(out[0].content, raw.trim_start_matches("__LOG__ "), "for {}", raw);
        }
    }

    #[test]
    fn test_marker_after_malformed_one() {
        let mut demux = StreamLineDemuxer::new(true);
        let out = demux.feed("__LOG__ [LINE_MARKER:x] [LINE_MARKER:4] y\n");
        assert_eq!(out[0].line, Some(4));
        assert_eq!(out[0].content, "[LINE_MARKER:x] y");
    }

    #[test]
    fn test_crlf_and_empty_lines() {
        let mut demux = StreamLineDemuxer::new(true);
        let out = demux.feed("__LOG__ a\r\n\n__LOG__ b\n");
        assert_eq!(
            shapes(&out),
            vec![
                ("a".to_string(), None, LogMethod::Log),
                (String::new(), None, LogMethod::Log),
                ("b".to_string(), None, LogMethod::Log),
            ]
        );
    }

    #[test]
    fn test_one_char_at_a_time() {
        let text = "__LOG__ [LINE_MARKER:1] héllo\n__ERR__ [LINE_MARKER:2] bad\n";
        let mut whole = StreamLineDemuxer::new(true);
        let expected = shapes(&feed_all(&mut whole, &[text]));

        let mut split = StreamLineDemuxer::new(true);
        let chars: Vec<String> = text.chars().map(String::from).collect();
        let chunks: Vec<&str> = chars.iter().map(String::as_str).collect();
        assert_eq!(shapes(&feed_all(&mut split, &chunks)), expected);
    }

    fn line_strategy() -> impl Strategy<Value = String> {
        let tag = prop::sample::select(vec!["", "__LOG__ ", "__ERR__ ", "__WRN__ ", "__INF__ "]);
        let marker = prop::option::of(1u32..500).prop_map(|m| match m {
            Some(n) => format!("[LINE_MARKER:{}] ", n),
            None => String::new(),
        });
        (tag, marker, "[ a-zA-Z0-9:\\[\\]_]{0,20}")
            .prop_map(|(tag, marker, body)| format!("{}{}{}", tag, marker, body))
    }

    proptest! {
        #[test]
        fn prop_split_invariance(
            lines in prop::collection::vec(line_strategy(), 1..12),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
            match_lines in any::<bool>(),
        ) {
            let text: String = lines.iter().map(|l| format!("{}\n", l)).collect();

            let mut whole = StreamLineDemuxer::new(match_lines);
            let expected = shapes(&feed_all(&mut whole, &[&text]));
            prop_assert_eq!(expected.len(), lines.len());

            let mut offsets: Vec<usize> = cuts.iter().map(|c| c.index(text.len() + 1)).collect();
            offsets.push(0);
            offsets.push(text.len());
            offsets.sort_unstable();
            offsets.dedup();
            let chunks: Vec<&str> = offsets.windows(2).map(|w| &text[w[0]..w[1]]).collect();

            let mut split = StreamLineDemuxer::new(match_lines);
            prop_assert_eq!(shapes(&feed_all(&mut split, &chunks)), expected);
        }
    }
}
