//! 搜索结果列表页 → `RowRecord` 序列。

use scraper::{ElementRef, Html};

use super::html_utils::{body, children_named, normalized_text, own_text, table_rows};
use crate::repo::RowRecord;
use crate::repo::error::RepoError;

/// 列表页的结构描述。位置即“模式”：第几个 table、哪一格是标题。
#[derive(Debug, Clone)]
pub struct ListingLayout {
    /// body 下第几个 `<table>`（从 1 开始）
    pub table_index: usize,
    /// 详情链接 href 的前缀
    pub item_prefix: &'static str,
    /// 每行开头需要跳过的格子数（ID 列）
    pub skip_leading_cells: usize,
    /// 跳过之后，标题所在列的下标
    pub title_column: usize,
    pub column_count: usize,
}

/// 解析整页；任何一行出错整页失败，不返回残缺结果。
///
/// 最多读 `page_size` 行。最后一页可能不足 `page_size` 行，但至少要有一行数据。
pub fn extract_rows(
    html: &str,
    layout: &ListingLayout,
    page_size: usize,
) -> Result<Vec<RowRecord>, RepoError> {
    let doc = Html::parse_document(html);
    let body = body(&doc)?;
    let trs = table_rows(body, layout.table_index)?;

    // 第一行是表头
    let data_rows: Vec<_> = trs.into_iter().skip(1).take(page_size).collect();
    if data_rows.is_empty() {
        return Err(RepoError::extraction("listing table has no data rows"));
    }

    data_rows
        .into_iter()
        .enumerate()
        .map(|(idx, tr)| {
            extract_row(tr, layout).map_err(|err| match err {
                RepoError::ExtractionFailed { reason } => {
                    RepoError::extraction(format!("row {}: {reason}", idx + 1))
                }
                other => other,
            })
        })
        .collect()
}

fn extract_row(tr: ElementRef<'_>, layout: &ListingLayout) -> Result<RowRecord, RepoError> {
    let mut columns = Vec::with_capacity(layout.column_count);
    let mut info_page = None;

    let cells = children_named(tr, "td")
        .skip(layout.skip_leading_cells)
        .take(layout.column_count);
    for (i, td) in cells.enumerate() {
        if i == layout.title_column {
            let (title, href) = title_anchor(td, layout.item_prefix)
                .ok_or_else(|| RepoError::extraction("book title not found"))?;
            info_page = Some(href);
            columns.push(title);
        } else {
            columns.push(normalized_text(td));
        }
    }

    if columns.len() != layout.column_count {
        return Err(RepoError::extraction(format!(
            "expected {} columns, found {}",
            layout.column_count,
            columns.len()
        )));
    }
    let info_page = info_page.ok_or_else(|| RepoError::extraction("book title not found"))?;
    Ok(RowRecord { columns, info_page })
}

/// 标题格里第一个指向详情页的链接：(文字, href)。
fn title_anchor(td: ElementRef<'_>, prefix: &str) -> Option<(String, String)> {
    td.descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "a")
        .find_map(|a| {
            let href = a.value().attr("href")?.trim();
            if !href.starts_with(prefix) {
                return None;
            }
            let mut text = own_text(a);
            if text.is_empty() {
                text = normalized_text(a);
            }
            Some((text, href.to_string()))
        })
}


#[cfg(test)]
mod tests {
    use super::fixtures::listing_page;
    use super::*;

    const PAGE: usize = 25;

    fn layout() -> ListingLayout {
        ListingLayout {
            table_index: 3,
            item_prefix: "book",
            skip_leading_cells: 1,
            title_column: 1,
            column_count: 8,
        }
    }

    #[test]
    fn full_page_yields_page_size_rows() {
        let rows = extract_rows(&listing_page(25, Some(4)), &layout(), PAGE).unwrap();
        assert_eq!(rows.len(), 25);
        for (i, row) in rows.iter().enumerate() {
            let n = i + 1;
            assert_eq!(row.columns.len(), 8);
            assert_eq!(row.columns[0], format!("Author {n}"));
            assert_eq!(row.columns[1], format!("Book Title {n}"));
            assert_eq!(row.columns[7], "pdf");
            assert_eq!(row.info_page, format!("book/index.php?md5=HASH{n}"));
        }
    }

    #[test]
    fn extra_rows_beyond_page_size_are_ignored() {
        let rows = extract_rows(&listing_page(30, None), &layout(), PAGE).unwrap();
        assert_eq!(rows.len(), 25);
    }

    #[test]
    fn short_last_page_is_accepted() {
        let rows = extract_rows(&listing_page(3, None), &layout(), PAGE).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].columns[1], "Book Title 3");
    }

    #[test]
    fn missing_table_fails_whole_page() {
        let html = "<html><body><table><tr><td>only one</td></tr></table></body></html>";
        let err = extract_rows(html, &layout(), PAGE).unwrap_err();
        assert!(matches!(err, RepoError::ExtractionFailed { .. }));
    }

    #[test]
    fn header_only_table_fails() {
        let err = extract_rows(&listing_page(0, None), &layout(), PAGE).unwrap_err();
        assert!(matches!(err, RepoError::ExtractionFailed { .. }));
    }

    #[test]
    fn row_without_title_anchor_fails_whole_page() {
        let html = listing_page(5, None).replace("book/index.php?md5=HASH4", "other.php?x=4");
        let err = extract_rows(&html, &layout(), PAGE).unwrap_err();
        match err {
            RepoError::ExtractionFailed { reason } => assert!(reason.starts_with("row 4")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
