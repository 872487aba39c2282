//! Unified-log line parsing.
//!
//! Parses the syslog-style text emitted by `log stream` and `log show`
//! (`--style syslog`) into [`LogLine`] records. Lines that do not match the
//! expected shape (header banners, "Filtering the log data" notices,
//! wrapped continuation output) return `None`.

use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;

use crate::types::{LogLevel, LogLine};

/// Shape of a syslog-style unified log line:
/// `2024-05-01 12:00:00.123456-0700 host process[pid]: (Framework) [subsystem:category] message`
static LOG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<timestamp>\d{4}-\d{2}-\d{2}\ \d{2}:\d{2}:\d{2}\.\d+[-+]\d{4})\s+
        (?P<hostname>\S+)\s+
        (?P<process>[\w\-\.]+)\[(?P<pid>\d+)\]:\s+
        (?:\((?P<framework>[\w\.]+)\)\s+)?
        (?:\[(?P<subsystem>[\w\.\-]+):(?P<category>[\w\.\-]+)\]\s+)?
        (?P<message>.*)$",
    )
    .expect("unified log line pattern")
});

/// Parse one syslog-style line into a [`LogLine`].
pub fn parse_line(line: &str) -> Option<LogLine> {
    let caps = LOG_LINE.captures(line.trim_end())?;

    let timestamp = DateTime::parse_from_str(
        caps.name("timestamp")?.as_str(),
        "%Y-%m-%d %H:%M:%S%.f%z",
    )
    .ok()?
    .with_timezone(&Local);

    let message = caps.name("message").map(|m| m.as_str()).unwrap_or("");
    let subsystem = caps
        .name("subsystem")
        .or_else(|| caps.name("framework"))
        .map(|m| m.as_str().to_string());

    Some(LogLine {
        timestamp,
        process: caps.name("process")?.as_str().to_string(),
        subsystem,
        category: caps.name("category").map(|m| m.as_str().to_string()),
        level: LogLevel::infer(message),
        text: message.to_string(),
    })
}

/// True for status noise that `log` prints before streaming starts.
pub fn is_stream_preamble(line: &str) -> bool {
    line.starts_with("Filtering") || line.starts_with("Timestamp") || line.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_basic_line() {
        let line = "2024-05-01 09:30:15.123456-0700 mac MyApp[4242]: Fetching profile data";
        let parsed = parse_line(line).expect("should parse");

        assert_eq!(parsed.process, "MyApp");
        assert_eq!(parsed.text, "Fetching profile data");
        assert_eq!(parsed.level, LogLevel::Info);
        assert_eq!(parsed.subsystem, None);
        assert_eq!(parsed.timestamp.second(), 15);
    }

    #[test]
    fn test_parse_with_subsystem_and_category() {
        let line = "2024-05-01 09:30:15.123456-0700 mac MyApp[4242]: \
                    [com.example.app:networking] request failed with status 500";
        let parsed = parse_line(line).expect("should parse");

        assert_eq!(parsed.subsystem.as_deref(), Some("com.example.app"));
        assert_eq!(parsed.category.as_deref(), Some("networking"));
        assert_eq!(parsed.level, LogLevel::Error);
    }

    #[test]
    fn test_parse_with_framework() {
        let line =
            "2024-05-01 09:30:15.123456-0700 mac Xcode[88]: (DVTFoundation) building target";
        let parsed = parse_line(line).expect("should parse");

        assert_eq!(parsed.process, "Xcode");
        assert_eq!(parsed.subsystem.as_deref(), Some("DVTFoundation"));
    }

    #[test]
    fn test_reject_non_log_lines() {
        assert!(parse_line("Filtering the log data using \"process == MyApp\"").is_none());
        assert!(parse_line("random text").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn test_is_stream_preamble() {
        assert!(is_stream_preamble("Filtering the log data"));
        assert!(is_stream_preamble(""));
        assert!(!is_stream_preamble(
            "2024-05-01 09:30:15.123456-0700 mac MyApp[1]: hi"
        ));
    }

    #[test]
    fn test_level_inferred_from_message() {
        let warn = "2024-05-01 09:30:15.000000-0700 mac swift[7]: warning: deprecated API";
        assert_eq!(parse_line(warn).expect("parse").level, LogLevel::Warning);

        let err = "2024-05-01 09:30:15.000000-0700 mac ld[9]: link failed";
        assert_eq!(parse_line(err).expect("parse").level, LogLevel::Error);
    }
}
