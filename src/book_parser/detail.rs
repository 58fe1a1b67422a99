//! 详情页 → `BookRecord`。
//!
//! 详情页被看作一张固定结构的 label/value 表。每一行的含义由 `DetailLayout`
//! 里的“行角色表”声明，新站点只需提供自己的角色表。

use scraper::{ElementRef, Html};
use url::Url;

use super::book::BookRecord;
use super::html_utils::{body, children_named, first_descendant, normalized_text, resolve, table_rows};
use crate::repo::error::RepoError;

/// 行的位置：从表头数或从表尾数（0 起）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSlot {
    FromStart(usize),
    FromEnd(usize),
}

impl RowSlot {
    fn resolve(self, len: usize) -> Option<usize> {
        match self {
            RowSlot::FromStart(i) if i < len => Some(i),
            RowSlot::FromEnd(i) if i >= 1 && i <= len => Some(len - i),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRole {
    /// `<a><img src>` 封面
    Cover,
    /// 若干 (label, value) 格子对
    Fields,
    /// 首格以 `label_prefix` 开头，其后每格一个 `<a title href>` 镜像
    Mirrors {
        label_prefix: &'static str,
        expected: usize,
    },
    /// 整行文本即简介
    Synopsis,
}

#[derive(Debug, Clone)]
pub struct DetailLayout {
    /// body 下第几个 `<table>`（从 1 开始）
    pub table_index: usize,
    pub roles: &'static [(RowSlot, RowRole)],
    /// 未在 `roles` 中出现的行按此角色处理；`None` 表示忽略。
    pub other_rows: Option<RowRole>,
}

impl DetailLayout {
    fn role_of(&self, idx: usize, len: usize) -> Option<RowRole> {
        self.roles
            .iter()
            .find(|(slot, _)| slot.resolve(len) == Some(idx))
            .map(|(_, role)| *role)
            .or(self.other_rows)
    }
}

/// 解析详情页。任何一行缺失都会使整体失败，不返回半成品。
pub fn extract_book(html: &str, page_url: &Url, layout: &DetailLayout) -> Result<BookRecord, RepoError> {
    let doc = Html::parse_document(html);
    let body = body(&doc)?;
    let rows = table_rows(body, layout.table_index)?;

    // 每个角色必须落在不同的行上，行数不够时两个槽位会重叠
    let mut taken: Vec<usize> = Vec::with_capacity(layout.roles.len());
    for (slot, _) in layout.roles {
        let Some(idx) = slot.resolve(rows.len()) else {
            return Err(RepoError::extraction(format!(
                "detail row {slot:?} missing ({} rows)",
                rows.len()
            )));
        };
        if taken.contains(&idx) {
            return Err(RepoError::extraction(format!(
                "detail row {slot:?} overlaps another role ({} rows)",
                rows.len()
            )));
        }
        taken.push(idx);
    }

    let mut book = BookRecord::new();
    book.url = Some(page_url.clone());
    for (idx, tr) in rows.iter().enumerate() {
        let Some(role) = layout.role_of(idx, rows.len()) else {
            continue;
        };
        apply_role(role, *tr, page_url, &mut book).map_err(|err| match err {
            RepoError::ExtractionFailed { reason } => {
                RepoError::extraction(format!("detail row {idx}: {reason}"))
            }
            other => other,
        })?;
    }
    Ok(book)
}

fn apply_role(
    role: RowRole,
    tr: ElementRef<'_>,
    base: &Url,
    book: &mut BookRecord,
) -> Result<(), RepoError> {
    match role {
        RowRole::Cover => {
            let src = first_descendant(tr, "a")
                .and_then(|a| first_descendant(a, "img"))
                .and_then(|img| img.value().attr("src"))
                .ok_or_else(|| RepoError::extraction("cover image not found"))?;
            book.cover = Some(resolve(base, src)?);
        }
        RowRole::Fields => {
            let cells: Vec<_> = children_named(tr, "td").collect();
            for pair in cells.chunks_exact(2) {
                let label = normalized_text(pair[0]);
                let value = normalized_text(pair[1]);
                book.fill(label.trim_end_matches(':').trim_end(), &value);
            }
        }
        RowRole::Mirrors {
            label_prefix,
            expected,
        } => {
            let mut cells = children_named(tr, "td");
            let label = cells
                .next()
                .map(normalized_text)
                .ok_or_else(|| RepoError::extraction("mirror label cell not found"))?;
            if !label.starts_with(label_prefix) {
                return Err(RepoError::extraction(format!(
                    "expected {label_prefix:?} row, found {label:?}"
                )));
            }
            let mut found = 0usize;
            for td in cells {
                let Some(a) = first_descendant(td, "a") else {
                    continue;
                };
                let (Some(name), Some(href)) = (a.value().attr("title"), a.value().attr("href"))
                else {
                    continue;
                };
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                book.add_mirror(name, resolve(base, href)?);
                found += 1;
            }
            if found < expected {
                return Err(RepoError::extraction(format!(
                    "expected {expected} mirrors, found {found}"
                )));
            }
        }
        RowRole::Synopsis => {
            let text: String = tr.text().collect();
            book.synopsis = text.trim().to_string();
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::fixtures::detail_page;
    use super::*;

    const ROLES: &[(RowSlot, RowRole)] = &[
        (RowSlot::FromStart(0), RowRole::Cover),
        (
            RowSlot::FromEnd(2),
            RowRole::Mirrors {
                label_prefix: "Mirrors",
                expected: 2,
            },
        ),
        (RowSlot::FromEnd(1), RowRole::Synopsis),
    ];

    fn layout() -> DetailLayout {
        DetailLayout {
            table_index: 1,
            roles: ROLES,
            other_rows: Some(RowRole::Fields),
        }
    }

    fn page_url() -> Url {
        Url::parse("http://lib.example/book/index.php?md5=HASH").unwrap()
    }

    #[test]
    fn extracts_fields_mirrors_cover_and_synopsis() {
        let html = detail_page(
            "Rust in Action",
            &[("Libgen.lc", "http://libgen.lc/ads.php?md5=x"), ("Library.lol", "/main/x")],
        );
        let book = extract_book(&html, &page_url(), &layout()).unwrap();
        assert_eq!(book.title, "Rust in Action");
        assert_eq!(book.author, "Jane Doe");
        assert_eq!(book.publisher, "Acme Press");
        assert_eq!(book.series, "Practical");
        assert_eq!(book.year, "2019");
        assert_eq!(book.edition, "2nd");
        assert_eq!(book.pages, "321");
        assert_eq!(book.isbn, "9780000000001");
        assert_eq!(book.id, "1234");
        assert_eq!(book.extension, "pdf");
        assert_eq!(book.extra.get("City").map(String::as_str), Some("Springfield"));
        assert!(!book.extra.contains_key("Periodical"));
        assert_eq!(
            book.cover.as_ref().map(Url::as_str),
            Some("http://lib.example/covers/1234.jpg")
        );
        assert_eq!(book.mirrors.len(), 2);
        assert_eq!(book.mirrors["Library.lol"].as_str(), "http://lib.example/main/x");
        assert!(book.synopsis.starts_with("A practical introduction"));
        assert!(book.synopsis.ends_with("Second paragraph."));
        assert_eq!(book.url, Some(page_url()));
    }

    #[test]
    fn extraction_is_idempotent() {
        let html = detail_page("Same", &[("A", "/a"), ("B", "/b")]);
        let first = extract_book(&html, &page_url(), &layout()).unwrap();
        let second = extract_book(&html, &page_url(), &layout()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn single_mirror_is_an_error() {
        let html = detail_page("Lonely", &[("A", "/a")]);
        let err = extract_book(&html, &page_url(), &layout()).unwrap_err();
        assert!(matches!(err, RepoError::ExtractionFailed { .. }));
    }

    #[test]
    fn wrong_mirror_label_is_an_error() {
        let html = detail_page("X", &[("A", "/a"), ("B", "/b")]).replace("Mirrors:", "Links:");
        assert!(extract_book(&html, &page_url(), &layout()).is_err());
    }

    #[test]
    fn missing_table_is_an_error() {
        let html = "<html><body><p>not found</p></body></html>";
        let err = extract_book(html, &page_url(), &layout()).unwrap_err();
        assert!(matches!(err, RepoError::ExtractionFailed { .. }));
    }

    #[test]
    fn two_row_table_does_not_yield_record_without_mirrors() {
        let html = "<html><body><table>\
                    <tr><td><a href='/c'><img src='/c.jpg'></a></td></tr>\
                    <tr><td>Some synopsis</td></tr>\
                    </table></body></html>";
        let err = extract_book(html, &page_url(), &layout()).unwrap_err();
        assert!(matches!(err, RepoError::ExtractionFailed { .. }));
    }

    #[test]
    fn too_few_rows_is_an_error() {
        let html = "<html><body><table><tr><td>Mirrors:</td></tr></table></body></html>";
        assert!(extract_book(html, &page_url(), &layout()).is_err());
    }
}
