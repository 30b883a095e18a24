//! Discovery from links on a server-rendered homepage.
//!
//! The collector narrows the homepage to a configured section, walks every
//! `a[href]` inside it and keeps the links whose raw `href` matches the
//! configured pattern. Matching links are resolved against the homepage URL.
//!
//! # Href patterns
//!
//! Patterns are shell-style globs matched against the whole `href`:
//!
//! | Syntax | Matches |
//! |--------|---------|
//! | `*` | any run of characters except `/` |
//! | `?` | one character except `/` |
//! | `[abc]`, `[a-z]`, `[^x]` | one character from (or not from) the class |
//! | `\x` | the literal `x` |
//!
//! A pattern that is not a valid glob (e.g. an unclosed `[`) still works:
//! when it ends in `*` it is used as a prefix, otherwise as a substring.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

use super::UrlCollector;
use crate::config::{LinkNameAttribute, StaticHtmlSelectors};
use crate::error::ScrapeError;
use crate::fetch::{Page, PageFetcher};
use crate::utils::parse_selector;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// Compiled form of a configured href pattern.
#[derive(Debug, Clone)]
pub enum HrefPattern {
    Any,
    Glob(Regex),
    Prefix(String),
    Contains(String),
}

impl HrefPattern {
    pub fn new(pattern: &str) -> Self {
        if pattern.is_empty() {
            return HrefPattern::Any;
        }
        match glob_to_regex(pattern) {
            Some(regex) => HrefPattern::Glob(regex),
            None => match pattern.strip_suffix('*') {
                Some(prefix) => HrefPattern::Prefix(prefix.to_string()),
                None => HrefPattern::Contains(pattern.to_string()),
            },
        }
    }

    pub fn matches(&self, href: &str) -> bool {
        match self {
            HrefPattern::Any => true,
            HrefPattern::Glob(regex) => regex.is_match(href),
            HrefPattern::Prefix(prefix) => href.starts_with(prefix.as_str()),
            HrefPattern::Contains(needle) => href.contains(needle.as_str()),
        }
    }
}

/// Escape a character for use inside a regex character class.
fn push_class_char(out: &mut String, c: char) {
    if matches!(c, '\\' | ']' | '[' | '^' | '-' | '&' | '~') {
        out.push('\\');
    }
    out.push(c);
}

/// Translate a glob into an anchored regex. `None` means the glob is malformed.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '\\' => {
                let escaped = chars.next()?;
                out.push_str(&regex::escape(&escaped.to_string()));
            }
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('^');
                }
                let mut members = 0;
                loop {
                    let lo = match chars.next()? {
                        ']' if members > 0 => break,
                        ']' => return None,
                        '\\' => chars.next()?,
                        other => other,
                    };
                    push_class_char(&mut out, lo);
                    if chars.peek() == Some(&'-') {
                        chars.next();
                        let hi = match chars.next()? {
                            ']' => return None,
                            '\\' => chars.next()?,
                            other => other,
                        };
                        if hi < lo {
                            return None;
                        }
                        out.push('-');
                        push_class_char(&mut out, hi);
                    }
                    members += 1;
                }
                out.push(']');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out).ok()
}

pub struct StaticHtmlCollector {
    section: Selector,
    section_css: String,
    pattern: HrefPattern,
    name_attribute: LinkNameAttribute,
    fetcher: Arc<dyn PageFetcher>,
}

impl StaticHtmlCollector {
    pub fn new(selectors: &StaticHtmlSelectors, fetcher: Arc<dyn PageFetcher>) -> Result<Self, ScrapeError> {
        let section_css = selectors.section.css();
        Ok(Self {
            section: parse_selector(&section_css)?,
            section_css,
            pattern: HrefPattern::new(&selectors.href_pattern),
            name_attribute: selectors.name_attribute,
            fetcher,
        })
    }

    fn link_name(&self, link: &ElementRef<'_>) -> String {
        let attr = |name: &str| link.value().attr(name).unwrap_or_default().trim().to_string();
        match self.name_attribute {
            LinkNameAttribute::Text => link.text().collect::<String>().trim().to_string(),
            LinkNameAttribute::Title => attr("title"),
            LinkNameAttribute::AriaLabel => attr("aria-label"),
        }
    }

    /// Matching links inside the configured section(s), in document order.
    fn links(&self, page: &Page) -> Vec<Url> {
        let document = page.html();
        let mut urls = Vec::new();
        // Nested section matches walk the same anchors more than once.
        let mut seen = HashSet::new();
        for section in document.select(&self.section) {
            for link in section.select(&ANCHOR) {
                let Some(href) = link.value().attr("href") else {
                    continue;
                };
                if !self.pattern.matches(href) {
                    continue;
                }
                match page.url.join(href) {
                    Ok(url) if !seen.insert(url.clone()) => {
                        debug!(%url, "Skipping duplicate detail link");
                    }
                    Ok(url) => {
                        debug!(name = %self.link_name(&link), %url, "Found detail link");
                        urls.push(url);
                    }
                    Err(e) => debug!(href, error = %e, "Skipping unparseable href"),
                }
            }
        }
        urls
    }
}

#[async_trait]
impl UrlCollector for StaticHtmlCollector {
    #[instrument(level = "info", skip_all, fields(%homepage, section = %self.section_css))]
    async fn collect(&self, homepage: &Url) -> Result<Vec<Url>, ScrapeError> {
        let page = self.fetcher.fetch(homepage).await?;
        let urls = self.links(&page);
        if urls.is_empty() {
            return Err(ScrapeError::NoUrlsDiscovered(homepage.to_string()));
        }
        info!(count = urls.len(), "Collected detail URLs");
        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SectionSelector;
    use crate::fetch::testing::MockFetcher;

    const HOMEPAGE: &str = "https://www.example.gov/dnr/state-parks/";

    fn collector(fetcher: MockFetcher, section: SectionSelector, pattern: &str) -> StaticHtmlCollector {
        let selectors = StaticHtmlSelectors {
            section,
            href_pattern: pattern.into(),
            name_attribute: LinkNameAttribute::Text,
        };
        StaticHtmlCollector::new(&selectors, Arc::new(fetcher)).unwrap()
    }

    #[test]
    fn test_glob_patterns() {
        let p = HrefPattern::new("/parks/*");
        assert!(matches!(p, HrefPattern::Glob(_)));
        assert!(p.matches("/parks/oak"));
        assert!(p.matches("/parks/"));
        assert!(!p.matches("/parks/oak/trails"));
        assert!(!p.matches("/about"));
        assert!(!p.matches("https://x.gov/parks/oak"));

        let p = HrefPattern::new("/p?rk-[0-9].html");
        assert!(p.matches("/park-7.html"));
        assert!(!p.matches("/park-x.html"));
        assert!(!p.matches("/p/rk-1.html"));

        let p = HrefPattern::new("/[^a]*");
        assert!(p.matches("/bison"));
        assert!(!p.matches("/antelope"));

        let p = HrefPattern::new(r"/parks\*");
        assert!(p.matches("/parks*"));
        assert!(!p.matches("/parks1"));

        assert!(HrefPattern::new("").matches("anything/at/all"));
    }

    #[test]
    fn test_invalid_glob_falls_back() {
        let p = HrefPattern::new("/parks[lakes/*");
        assert!(matches!(p, HrefPattern::Prefix(_)));
        assert!(p.matches("/parks[lakes/dunes/extra"));
        assert!(!p.matches("/parks/lakes"));

        let p = HrefPattern::new("[state-parks");
        assert!(matches!(p, HrefPattern::Contains(_)));
        assert!(p.matches("/dnr/[state-parks/x"));

        assert!(matches!(HrefPattern::new("/a[]"), HrefPattern::Contains(_)));
        assert!(matches!(HrefPattern::new("/trailing\\"), HrefPattern::Contains(_)));
    }

    #[tokio::test]
    async fn test_collect_filters_and_resolves() {
        let html = r#"<html><body>
            <nav><a href="/parks/nav-only">Nav</a></nav>
            <section id="564717">
                <a href="/parks/oak">Oak Park</a>
                <a href="/about">About us</a>
                <a name="anchor-without-href">x</a>
            </section>
        </body></html>"#;
        let fetcher = MockFetcher::new().html(HOMEPAGE, html);
        let section = SectionSelector {
            id: Some("564717".into()),
            ..Default::default()
        };
        let urls = collector(fetcher, section, "/parks/*")
            .collect(&Url::parse(HOMEPAGE).unwrap())
            .await
            .unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].as_str(), "https://www.example.gov/parks/oak");
    }

    #[tokio::test]
    async fn test_collect_whole_body_when_no_section() {
        let html = r#"<body><a href="oak.html">Oak</a><div><a href="elm.html">Elm</a></div></body>"#;
        let fetcher = MockFetcher::new().html(HOMEPAGE, html);
        let urls = collector(fetcher, SectionSelector::default(), "")
            .collect(&Url::parse(HOMEPAGE).unwrap())
            .await
            .unwrap();
        let urls: Vec<&str> = urls.iter().map(Url::as_str).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.example.gov/dnr/state-parks/oak.html",
                "https://www.example.gov/dnr/state-parks/elm.html",
            ]
        );
    }

    #[tokio::test]
    async fn test_nested_sections_yield_each_link_once() {
        let html = r#"<body>
            <div class="parks"><div class="parks">
                <a href="/parks/oak">Oak</a>
            </div>
            <a href="/parks/elm">Elm</a>
            <a href="/parks/oak">Oak again</a></div>
        </body>"#;
        let fetcher = MockFetcher::new().html(HOMEPAGE, html);
        let section = SectionSelector {
            class: Some("parks".into()),
            ..Default::default()
        };
        let urls = collector(fetcher, section, "/parks/*")
            .collect(&Url::parse(HOMEPAGE).unwrap())
            .await
            .unwrap();
        let urls: Vec<&str> = urls.iter().map(Url::as_str).collect();
        assert_eq!(
            urls,
            vec!["https://www.example.gov/parks/oak", "https://www.example.gov/parks/elm"]
        );
    }

    #[tokio::test]
    async fn test_zero_matches_is_an_error() {
        let html = r#"<body><section class="parks"><a href="/about">About</a></section></body>"#;
        let fetcher = MockFetcher::new().html(HOMEPAGE, html);
        let section = SectionSelector {
            class: Some("parks".into()),
            ..Default::default()
        };
        let err = collector(fetcher, section, "/parks/*")
            .collect(&Url::parse(HOMEPAGE).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::NoUrlsDiscovered(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_surfaced() {
        let fetcher = MockFetcher::new()
            .html(HOMEPAGE, "<body></body>")
            .failing(HOMEPAGE, 1);
        let err = collector(fetcher, SectionSelector::default(), "")
            .collect(&Url::parse(HOMEPAGE).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Status { status: 503, .. }));
    }

    #[test]
    fn test_link_name_attributes() {
        let html = scraper::Html::parse_fragment(
            r#"<a href="/p" title="Title Name" aria-label="Aria Name">  Text Name </a>"#,
        );
        let link = html.select(&ANCHOR).next().unwrap();
        let mut c = collector(MockFetcher::new(), SectionSelector::default(), "");
        assert_eq!(c.link_name(&link), "Text Name");
        c.name_attribute = LinkNameAttribute::Title;
        assert_eq!(c.link_name(&link), "Title Name");
        c.name_attribute = LinkNameAttribute::AriaLabel;
        assert_eq!(c.link_name(&link), "Aria Name");
    }
}
