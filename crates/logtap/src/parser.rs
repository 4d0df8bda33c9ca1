//! 🔍 Line Parser: gunzip in, URL paths out.
//!
//! 🎬 *[a gzip blob lands on the desk. it has been through things.]*
//!
//! The access-log format we eat:
//! - gzip-compressed text (concatenated gzip members are fine, CDNs love those)
//! - the first two lines are header/metadata rows and are skipped unconditionally
//! - every other line is whitespace-delimited; field 7 is the path, field 11 the query
//! - a query of `-` means "no query"
//!
//! A line with too few fields is dropped without a word. That's data cleaning,
//! not an error. A blob that is not gzip at all IS an error, and a fatal one.
//!
//! Everything in here is pure. No shared state, safe to call from as many
//! blocking threads as the runtime feels like handing us.

use std::io::Read;

use flate2::read::MultiGzDecoder;
use regex::Regex;
use serde::Deserialize;
use tracing::trace;

use crate::error::{LogTapError, Result};

/// 📐 Where things live in a log line. The defaults match CloudFront-style access logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LineFormat {
    /// 🗑️ lines skipped at the top of every object
    #[serde(default = "default_header_lines")]
    pub header_lines: usize,
    /// 🎯 0-based field index of the path
    #[serde(default = "default_path_field")]
    pub path_field: usize,
    /// ❓ 0-based field index of the query string
    #[serde(default = "default_query_field")]
    pub query_field: usize,
}

fn default_header_lines() -> usize {
    2
}

fn default_path_field() -> usize {
    7
}

fn default_query_field() -> usize {
    11
}

impl Default for LineFormat {
    fn default() -> Self {
        Self {
            header_lines: default_header_lines(),
            path_field: default_path_field(),
            query_field: default_query_field(),
        }
    }
}

/// 📦 What one object gave us, plus the bookkeeping the stats want.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    /// ✅ `path` or `path?query`, in line order
    pub paths: Vec<String>,
    /// 📄 non-blank lines after the header
    pub lines_seen: usize,
    /// 🗑️ lines that were too short or did not match the pattern
    pub lines_dropped: usize,
}

/// 🫁 Gunzip, then extract. `key` is only used to make the error readable.
pub fn parse_log(
    key: &str,
    raw: &[u8],
    pattern: Option<&Regex>,
    format: &LineFormat,
) -> Result<ParseOutcome> {
    let the_text = decompress(key, raw)?;
    let the_outcome = extract_paths(&the_text, pattern, format);
    trace!(
        "🔍 '{}': {} lines, {} paths, {} dropped",
        key,
        the_outcome.lines_seen,
        the_outcome.paths.len(),
        the_outcome.lines_dropped
    );
    Ok(the_outcome)
}

/// 📏 Most up-front allocation a single object gets before the decoder has to grow it.
const MAX_PREALLOC_BYTES: usize = 64 * 1024 * 1024;

/// 📏 Guess at the inflated size: 4× the gzip bytes, capped.
fn decompressed_capacity_hint(compressed_len: usize) -> usize {
    compressed_len.saturating_mul(4).min(MAX_PREALLOC_BYTES)
}

/// 🫁 Gzip bytes → plain bytes. Multi-member streams are read to the very end.
pub fn decompress(key: &str, raw: &[u8]) -> Result<Vec<u8>> {
    let mut the_plain = Vec::with_capacity(decompressed_capacity_hint(raw.len()));
    MultiGzDecoder::new(raw)
        .read_to_end(&mut the_plain)
        .map_err(|e| LogTapError::Decompression {
            key: key.to_string(),
            message: e.to_string(),
        })?;
    Ok(the_plain)
}

/// 🎯 Plain log bytes → paths. Invalid UTF-8 gets the replacement character, not a panic.
pub fn extract_paths(text: &[u8], pattern: Option<&Regex>, format: &LineFormat) -> ParseOutcome {
    let mut the_outcome = ParseOutcome::default();

    for the_raw_line in lines(text).skip(format.header_lines) {
        let the_line = String::from_utf8_lossy(the_raw_line);
        let fields: Vec<&str> = the_line.split_whitespace().collect();
        if fields.is_empty() {
            // -- 🫥 the trailing newline's ghost. not a line, not a drop.
            continue;
        }
        the_outcome.lines_seen += 1;

        match path_from_fields(&fields, pattern, format) {
            Some(path) => the_outcome.paths.push(path),
            None => the_outcome.lines_dropped += 1,
        }
    }

    the_outcome
}

/// One line's fields → maybe a path.
fn path_from_fields(fields: &[&str], pattern: Option<&Regex>, format: &LineFormat) -> Option<String> {
    let the_path = *fields.get(format.path_field)?;

    if let Some(the_pattern) = pattern {
        if !the_pattern.is_match(the_path) {
            return None;
        }
    }

    // -- ❓ a missing query column reads the same as "-"
    match fields.get(format.query_field) {
        Some(&query) if query != "-" => Some(format!("{the_path}?{query}")),
        _ => Some(the_path.to_string()),
    }
}

/// ✂️ Split on `\n` the way `str::split` would, trailing empty piece included.
fn lines(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut the_start = 0;
    memchr::memchr_iter(b'\n', bytes)
        .chain(std::iter::once(bytes.len()))
        .map(move |the_end| {
            let the_line = &bytes[the_start..the_end];
            the_start = the_end + 1;
            the_line
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::gzip_bytes;

    const HEADER: &str = "#Version: 1.0\n#Fields: date time edge bytes ip method host uri status referer ua query\n";

    #[test]
    fn the_one_where_the_capacity_guess_never_overflows_or_balloons() {
        assert_eq!(decompressed_capacity_hint(0), 0);
        assert_eq!(decompressed_capacity_hint(1_000), 4_000);
        assert_eq!(decompressed_capacity_hint(usize::MAX), MAX_PREALLOC_BYTES);
        assert_eq!(decompressed_capacity_hint(MAX_PREALLOC_BYTES), MAX_PREALLOC_BYTES);
    }

    fn a_line(path: &str, query: &str) -> String {
        format!("2024-01-01 00:00:00 IAD 512 1.2.3.4 GET example.com {path} 200 - Mozilla {query}\n")
    }

    fn extract(text: &str, pattern: Option<&Regex>) -> ParseOutcome {
        extract_paths(text.as_bytes(), pattern, &LineFormat::default())
    }

    #[test]
    fn the_one_where_n_good_lines_give_n_paths_in_order() {
        let the_text = format!(
            "{HEADER}{}{}{}",
            a_line("/one", "-"),
            a_line("/two", "-"),
            a_line("/three", "-")
        );

        let the_outcome = extract(&the_text, None);
        assert_eq!(the_outcome.paths, vec!["/one", "/two", "/three"]);
        assert_eq!(the_outcome.lines_seen, 3);
        assert_eq!(the_outcome.lines_dropped, 0);
    }

    #[test]
    fn the_one_where_the_header_is_skipped_no_matter_what_it_says() {
        // 🧪 header rows that would otherwise parse as perfectly good lines
        let the_text = format!(
            "{}{}{}",
            a_line("/header-one", "-"),
            a_line("/header-two", "-"),
            a_line("/real", "-")
        );
        assert_eq!(extract(&the_text, None).paths, vec!["/real"]);
    }

    #[test]
    fn the_one_where_short_lines_are_quietly_shown_the_door() {
        // -- 8 fields survives, 7 fields does not
        let the_text = "h1\nh2\na b c d e f g /seven-fields\na b c d e f g\n";
        let the_outcome = extract(the_text, None);
        assert_eq!(the_outcome.paths, vec!["/seven-fields"]);
        assert_eq!(the_outcome.lines_dropped, 1);
    }

    #[test]
    fn the_one_where_dash_means_no_query() {
        let the_text = format!("{HEADER}{}{}", a_line("/plain", "-"), a_line("/search", "q=rust&page=2"));
        assert_eq!(
            extract(&the_text, None).paths,
            vec!["/plain", "/search?q=rust&page=2"]
        );
    }

    #[test]
    fn the_one_where_a_missing_query_column_is_not_undefined() {
        // 🧪 9 fields: a path, but no field 11 at all
        let the_text = "h1\nh2\n0 1 2 3 4 5 6 /short 8\n";
        assert_eq!(extract(the_text, None).paths, vec!["/short"]);
    }

    #[test]
    fn the_one_where_the_pattern_picks_favorites() {
        let the_pattern = Regex::new("^/static/").expect("💀 test regex");
        let the_text = format!("{HEADER}{}{}", a_line("/static/app.js", "-"), a_line("/api/x", "-"));

        let the_outcome = extract(&the_text, Some(&the_pattern));
        assert_eq!(the_outcome.paths, vec!["/static/app.js"]);
        assert_eq!(the_outcome.lines_dropped, 1);
    }

    #[test]
    fn the_one_where_the_pattern_judges_the_path_not_the_query() {
        let the_pattern = Regex::new("secret").expect("💀 test regex");
        let the_text = format!("{HEADER}{}", a_line("/public", "token=secret"));
        assert!(extract(&the_text, Some(&the_pattern)).paths.is_empty());
    }

    #[test]
    fn the_one_where_tabs_and_crlf_are_just_whitespace() {
        let the_text = "h1\r\nh2\r\na\tb\tc\td\te\tf\tg\t/tabbed\ti\tj\tk\tx=1\r\n";
        assert_eq!(extract(the_text, None).paths, vec!["/tabbed?x=1"]);
    }

    #[test]
    fn the_one_where_fewer_than_two_lines_is_zero_paths_not_a_tantrum() {
        assert!(extract("", None).paths.is_empty());
        assert!(extract("only-one-line", None).paths.is_empty());
    }

    #[test]
    fn the_one_where_invalid_utf8_is_replaced_not_fatal() {
        let mut the_bytes = b"h1\nh2\n0 1 2 3 4 5 6 /caf".to_vec();
        the_bytes.extend_from_slice(&[0xff, 0xfe]);
        the_bytes.extend_from_slice(b" 8 9 10 -\n");

        let the_outcome = extract_paths(&the_bytes, None, &LineFormat::default());
        assert_eq!(the_outcome.paths.len(), 1);
        assert!(the_outcome.paths[0].starts_with("/caf"));
    }

    #[test]
    fn the_one_where_gzip_goes_in_and_paths_come_out() {
        let the_raw = gzip_bytes(b"h1\nh2\nGET /a 1 1 1 1 1 /foo 1 1 1 -\n").expect("💀 gzip");
        let the_outcome =
            parse_log("log1.gz", &the_raw, None, &LineFormat::default()).expect("💀 valid gzip should parse");
        assert_eq!(the_outcome.paths, vec!["/foo"]);
    }

    #[test]
    fn the_one_where_concatenated_members_are_all_read() {
        let mut the_raw = gzip_bytes(b"h1\nh2\n0 1 2 3 4 5 6 /first 8 9 10 -\n").expect("💀 gzip");
        the_raw.extend(gzip_bytes(b"0 1 2 3 4 5 6 /second 8 9 10 -\n").expect("💀 gzip"));

        let the_outcome =
            parse_log("multi.gz", &the_raw, None, &LineFormat::default()).expect("💀 multi-member gzip");
        assert_eq!(the_outcome.paths, vec!["/first", "/second"]);
    }

    #[test]
    fn the_one_where_plain_text_pretending_to_be_gzip_gets_caught() {
        let the_error = parse_log("liar.gz", b"definitely not gzip", None, &LineFormat::default())
            .expect_err("non-gzip bytes must fail");
        match the_error {
            LogTapError::Decompression { key, .. } => assert_eq!(key, "liar.gz"),
            other => panic!("💀 expected Decompression, got {other:?}"),
        }
    }

    #[test]
    fn the_one_where_a_custom_layout_moves_the_furniture() {
        let the_format = LineFormat {
            header_lines: 0,
            path_field: 1,
            query_field: 2,
        };
        let the_outcome = extract_paths(b"GET /moved q=1\n", None, &the_format);
        assert_eq!(the_outcome.paths, vec!["/moved?q=1"]);
    }
}
