//! Stdout tag protocol shared by the runtime shim and the host-side demuxer.
//!
//! One line of program output per physical log line:
//!
//! ```text
//! <TAG><sep><LINE_MARKER?><content>
//! ```
//!
//! Both ends of the pipe are built from the constants below.

use serde::{Deserialize, Serialize};

pub const LOG_TAG: &str = "__LOG__";
pub const ERROR_TAG: &str = "__ERR__";
pub const WARN_TAG: &str = "__WRN__";
pub const INFO_TAG: &str = "__INF__";

/// Single space between the tag and the payload.
pub const TAG_SEPARATOR: char = ' ';

pub const LINE_MARKER_PREFIX: &str = "[LINE_MARKER:";
pub const LINE_MARKER_SUFFIX: &str = "]";

/// Console method a log line originated from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMethod {
    #[default]
    Log,
    Error,
    Warn,
    Info,
}

impl LogMethod {
    pub const ALL: [LogMethod; 4] = [
        LogMethod::Log,
        LogMethod::Error,
        LogMethod::Warn,
        LogMethod::Info,
    ];

    /// Reserved sentinel the shim prefixes to lines of this method.
    pub fn tag(self) -> &'static str {
        match self {
            LogMethod::Log => LOG_TAG,
            LogMethod::Error => ERROR_TAG,
            LogMethod::Warn => WARN_TAG,
            LogMethod::Info => INFO_TAG,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.tag() == tag)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogMethod::Log => "log",
            LogMethod::Error => "error",
            LogMethod::Warn => "warn",
            LogMethod::Info => "info",
        }
    }
}

impl std::fmt::Display for LogMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render the marker token for a 1-based source line.
pub fn line_marker(line: u32) -> String {
    format!("{}{}{}", LINE_MARKER_PREFIX, line, LINE_MARKER_SUFFIX)
}

/// Render one tagged output line the way the shim writes it.
pub fn tagged_line(method: LogMethod, line: Option<u32>, content: &str) -> String {
    match line {
        Some(n) => format!(
            "{}{}{}{}{}",
            method.tag(),
            TAG_SEPARATOR,
            line_marker(n),
            TAG_SEPARATOR,
            content
        ),
        None => format!("{}{}{}", method.tag(), TAG_SEPARATOR, content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip() {
        for method in LogMethod::ALL {
            assert_eq!(LogMethod::from_tag(method.tag()), Some(method));
        }
        assert_eq!(LogMethod::from_tag("__NOPE__"), None);
    }

    #[test]
    fn test_line_marker_format() {
        assert_eq!(line_marker(7), "[LINE_MARKER:7]");
    }

    #[test]
    fn test_tagged_line() {
        assert_eq!(
            tagged_line(LogMethod::Error, Some(2), "bad"),
            "__ERR__ [LINE_MARKER:2] bad"
        );
        assert_eq!(tagged_line(LogMethod::Log, None, "hi"), "__LOG__ hi");
    }

    #[test]
    fn test_method_serializes_lowercase() {
        let json = serde_json::to_string(&LogMethod::Warn).unwrap();
        assert_eq!(json, "\"warn\"");
    }
}
