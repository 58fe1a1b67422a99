//! 最大页码提取。
//!
//! 目前只有“扫描内联脚本里的分页器调用”这一种启发式，放在 `PageCounter`
//! 之后，替换实现时调用方无需改动。

use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::repo::error::RepoError;

pub trait PageCounter: Send + Sync {
    fn max_page(&self, html: &str) -> Result<u32, RepoError>;
}

fn re_int() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"\d+").unwrap())
}

fn script_selector() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("script").unwrap())
}

/// 第一个包含 `marker` 的 `<script>`，取 marker 之后出现的第一个整数。
#[derive(Debug, Clone)]
pub struct ScriptMarkerCounter {
    pub marker: &'static str,
}

impl PageCounter for ScriptMarkerCounter {
    fn max_page(&self, html: &str) -> Result<u32, RepoError> {
        let doc = Html::parse_document(html);
        for script in doc.select(script_selector()) {
            let text: String = script.text().collect();
            let Some(pos) = text.find(self.marker) else {
                continue;
            };
            let tail = &text[pos + self.marker.len()..];
            let Some(found) = re_int().find(tail) else {
                continue;
            };
            if let Ok(n) = found.as_str().parse::<u32>()
                && n > 0
            {
                return Ok(n);
            }
        }
        Err(RepoError::PaginationNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> ScriptMarkerCounter {
        ScriptMarkerCounter {
            marker: "Paginator",
        }
    }

    #[test]
    fn reads_first_integer_inside_marker() {
        let html = r#"<html><body><script>var x = 7;</script>
            <script>paginator = new Paginator("p", 42, 25, 1, "search.php?page=");</script>
            </body></html>"#;
        assert_eq!(counter().max_page(html).unwrap(), 42);
    }

    #[test]
    fn marker_call_with_literal_number() {
        let html = "<html><head><script>Paginator(42)</script></head><body></body></html>";
        assert_eq!(counter().max_page(html).unwrap(), 42);
    }

    #[test]
    fn document_without_script_is_not_found() {
        let html = "<html><body><table><tr><td>1</td></tr></table></body></html>";
        assert_eq!(counter().max_page(html), Err(RepoError::PaginationNotFound));
    }

    #[test]
    fn script_without_marker_is_not_found() {
        let html = "<html><body><script>var pages = 12;</script></body></html>";
        assert_eq!(counter().max_page(html), Err(RepoError::PaginationNotFound));
    }
}
