//! Build-log source reading.
//!
//! Decodes a completed build log into a line sequence. Xcode stores these as
//! `.xcactivitylog` files: a gzip container whose payload is an `SLF0`
//! structured-record stream. Each record carries a section title, the invoked
//! command line, and any captured stdout/stderr text. Plain-text logs are
//! decoded as-is.

use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::{Error, Result};

/// Gzip magic bytes at the start of the container
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Magic header of the decompressed structured-record payload
const SLF_MAGIC: &[u8] = b"SLF0";

/// The format a log file was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compressed SLF0 activity log
    ActivityLog,
    /// Plain (or lossily decoded) text
    PlainText,
}

/// A lazy, finite, non-restartable sequence of decoded log lines
#[derive(Debug)]
pub struct LogLines {
    format: LogFormat,
    inner: std::vec::IntoIter<String>,
}

impl LogLines {
    pub fn format(&self) -> LogFormat {
        self.format
    }
}

impl Iterator for LogLines {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.inner.next()
    }
}

/// Read a build log file and decode it into text lines.
///
/// Detects the activity-log container by its gzip magic header and falls back
/// to raw-text decoding when the header is absent. Truncated or in-progress
/// files yield whatever decodes cleanly rather than failing.
pub fn read(path: &Path) -> Result<LogLines> {
    let bytes = std::fs::read(path)?;

    if bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC {
        // Tolerate truncation: keep whatever the decoder produced before
        // hitting the end of a partial file.
        let mut payload = Vec::new();
        let mut decoder = GzDecoder::new(&bytes[..]);
        if let Err(err) = decoder.read_to_end(&mut payload) {
            tracing::debug!(
                "partial gzip read of {} ({} bytes decoded): {}",
                path.display(),
                payload.len(),
                err
            );
        }

        if payload.starts_with(SLF_MAGIC) {
            return Ok(LogLines {
                format: LogFormat::ActivityLog,
                inner: tokenize_slf(&payload[SLF_MAGIC.len()..]).into_iter(),
            });
        }

        if !payload.is_empty() {
            return Ok(LogLines {
                format: LogFormat::PlainText,
                inner: text_lines(&payload).into_iter(),
            });
        }

        return Err(Error::unsupported_format(
            path,
            "gzip container with undecodable payload",
        ));
    }

    Ok(LogLines {
        format: LogFormat::PlainText,
        inner: text_lines(&bytes).into_iter(),
    })
}

/// Lossily decode raw bytes into lines.
fn text_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|l| l.to_string())
        .collect()
}

/// Walk the SLF0 token stream and collect captured text in record order.
///
/// Token grammar (decimal or hex count, then a type tag):
/// - `N#`  integer
/// - `N"`  string of N bytes
/// - `N(`  list of N elements
/// - `N%`  class name of N bytes
/// - `N@`  reference to a previously declared class
/// - `N^`  IEEE double (hex-encoded count field)
/// - `-`   null
///
/// Only string payloads carry the text we care about (titles, command lines,
/// captured stdout/stderr); everything else is skipped. A malformed or
/// truncated stream terminates the walk, keeping the lines read so far.
fn tokenize_slf(payload: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pos = 0usize;

    while pos < payload.len() {
        if payload[pos] == b'-' {
            pos += 1;
            continue;
        }

        // Count field: decimal for most tags, hex for doubles.
        let count_start = pos;
        while pos < payload.len() && payload[pos].is_ascii_hexdigit() {
            pos += 1;
        }
        if pos == count_start || pos >= payload.len() {
            tracing::debug!("SLF0 stream ended mid-token at offset {}", count_start);
            break;
        }

        let tag = payload[pos];
        pos += 1;

        let count_str = match std::str::from_utf8(&payload[count_start..pos - 1]) {
            Ok(s) => s,
            Err(_) => break,
        };

        match tag {
            b'"' | b'%' => {
                let Ok(len) = count_str.parse::<usize>() else {
                    break;
                };
                let end = pos.saturating_add(len).min(payload.len());
                if tag == b'"' {
                    let text = String::from_utf8_lossy(&payload[pos..end]);
                    for line in text.lines().filter(|l| !l.trim().is_empty()) {
                        lines.push(line.to_string());
                    }
                }
                if end == payload.len() && pos + len > payload.len() {
                    // Truncated trailing payload; keep what we extracted.
                    pos = end;
                    break;
                }
                pos = end;
            }
            b'#' | b'(' | b'@' | b'^' => {
                // Scalar or structural token; no payload bytes follow.
            }
            _ => {
                tracing::debug!("unknown SLF0 tag {:?} at offset {}", tag as char, pos - 1);
                break;
            }
        }
    }

    lines
}
