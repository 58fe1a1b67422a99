//! HTML 树遍历与文本工具。
//!
//! 解析器只依赖通用的元素/文本节点模型，不要求 XHTML 严格性。

use scraper::{ElementRef, Html};
use url::Url;

use crate::repo::error::RepoError;

/// 直接子元素（跳过文本/注释节点）。
pub(crate) fn child_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children().filter_map(ElementRef::wrap)
}

/// 名为 `tag` 的直接子元素。
pub(crate) fn children_named<'a>(
    el: ElementRef<'a>,
    tag: &'static str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    child_elements(el).filter(move |c| c.value().name() == tag)
}

/// 按文档顺序查找第一个名为 `tag` 的后代元素。
pub(crate) fn first_descendant<'a>(el: ElementRef<'a>, tag: &str) -> Option<ElementRef<'a>> {
    el.descendants()
        .filter_map(ElementRef::wrap)
        .skip(1)
        .find(|d| d.value().name() == tag)
}

pub(crate) fn body(doc: &Html) -> Result<ElementRef<'_>, RepoError> {
    children_named(doc.root_element(), "body")
        .next()
        .ok_or_else(|| RepoError::extraction("<body> not found"))
}

/// body 下第 `index` 个（从 1 开始）直接子 `<table>` 的行列表。
pub(crate) fn table_rows<'a>(
    body: ElementRef<'a>,
    index: usize,
) -> Result<Vec<ElementRef<'a>>, RepoError> {
    let table = children_named(body, "table")
        .nth(index.saturating_sub(1))
        .ok_or_else(|| RepoError::extraction(format!("<table> #{index} not found")))?;
    let tbody = children_named(table, "tbody")
        .next()
        .ok_or_else(|| RepoError::extraction("<tbody> not found"))?;
    let rows: Vec<_> = children_named(tbody, "tr").collect();
    if rows.is_empty() {
        return Err(RepoError::extraction("none <tr> found"));
    }
    Ok(rows)
}

/// 元素内全部文本，空白折叠为单个空格。
pub(crate) fn normalized_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// 只取元素自身的文本子节点（不含嵌套标签里的文字）。
pub(crate) fn own_text(el: ElementRef<'_>) -> String {
    let raw: String = el
        .children()
        .filter_map(|n| n.value().as_text())
        .map(|t| &**t)
        .collect();
    collapse_whitespace(&raw)
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn resolve(base: &Url, href: &str) -> Result<Url, RepoError> {
    base.join(href.trim())
        .map_err(|e| RepoError::extraction(format!("bad link {href:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_text_skips_nested_markup() {
        let doc = Html::parse_fragment(r#"<a href="x">Main  title<br><font>978</font></a>"#);
        let a = first_descendant(doc.root_element(), "a").unwrap();
        assert_eq!(own_text(a), "Main title");
        assert_eq!(normalized_text(a), "Main title978");
    }

    #[test]
    fn table_rows_counts_only_direct_tables() {
        let doc = Html::parse_document(
            "<html><body><table><tr><td><table><tr><td>x</td></tr></table></td></tr></table>\
             <table><tr><td>a</td></tr><tr><td>b</td></tr></table></body></html>",
        );
        let body = body(&doc).unwrap();
        let rows = table_rows(body, 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(table_rows(body, 3).is_err());
    }
}
