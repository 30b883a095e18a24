//! Utility functions for string handling, selector compilation and file system checks.
//!
//! - String truncation for log previews and slugification for file names
//! - Source-code list normalization for the command line
//! - CSS selector compilation with a typed error
//! - Output directory validation

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::ScrapeError;

static NON_SLUG_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a character boundary) and
/// get a `"…(+N bytes)"` suffix.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Convert a park name to a kebab-case file stem.
///
/// Lowercases, collapses every run of characters outside `[a-z0-9]` into a
/// single hyphen and trims hyphens from both ends. Names with nothing left
/// become `"unnamed"`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("Starved Rock State Park"), "starved-rock-state-park");
/// assert_eq!(slugify("  Lakeview Park! "), "lakeview-park");
/// ```
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let slug = NON_SLUG_CHARS.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug.to_string()
    }
}

/// Trim requested source codes and drop empty entries.
pub fn normalize_source_codes(codes: &[String]) -> Vec<String> {
    codes
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// Compile a CSS selector, keeping the offending text in the error.
pub fn parse_selector(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector).map_err(|e| ScrapeError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe = path.join("..__probe_write__");
    fs::write(&probe, b"").await?;
    let _ = fs::remove_file(&probe).await;
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let s = "é".repeat(10); // 2 bytes each
        let result = truncate_for_log(&s, 5);
        assert!(result.starts_with("éé…"));
        assert!(result.contains("(+16 bytes)"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Lakeview Park"), "lakeview-park");
        assert_eq!(slugify("Starved Rock State Park"), "starved-rock-state-park");
        assert_eq!(slugify("Multiple   Spaces"), "multiple-spaces");
        assert_eq!(slugify("--Fort Ouiatenon (Historic)--"), "fort-ouiatenon-historic");
        assert_eq!(slugify("!!!"), "unnamed");
    }

    #[test]
    fn test_normalize_source_codes() {
        let raw = vec![" IL".to_string(), "".to_string(), "IN ".to_string(), "  ".to_string()];
        assert_eq!(normalize_source_codes(&raw), vec!["IL", "IN"]);
        assert!(normalize_source_codes(&[]).is_empty());
    }

    #[test]
    fn test_parse_selector_reports_bad_input() {
        assert!(parse_selector("div.park > h1").is_ok());
        match parse_selector("div[") {
            Err(ScrapeError::InvalidSelector { selector, .. }) => assert_eq!(selector, "div["),
            other => panic!("expected InvalidSelector, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_nested_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("out").join("parks");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join("..__probe_write__").exists());
    }
}
