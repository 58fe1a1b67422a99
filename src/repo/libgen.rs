//! Library Genesis（search.php 简单视图）。

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};
use url::Url;

use super::error::RepoError;
use super::query::{QueryFields, SortMode};
use super::{FetchStep, Repository, RowRecord, fetch_content};
use crate::book_parser::book::BookRecord;
use crate::book_parser::detail::{DetailLayout, RowRole, RowSlot, extract_book};
use crate::book_parser::pagination::{PageCounter, ScriptMarkerCounter};
use crate::book_parser::rows::{ListingLayout, extract_rows};
use crate::download::downloader::{DirectDownloader, MirrorPageDownloader, MirrorDownloader, MirrorStrategy};
use crate::network_parser::network::{ContentFetcher, HttpMethod};

const SEARCH_URL: &str = "http://gen.lib.rus.ec/search.php";
const BOOKS_PER_PAGE: usize = 25;

const COLUMNS: [&str; 8] = [
    "Author", "Title", "Publisher", "Year", "Pages", "Language", "Size", "Extension",
];
const AUTHOR: usize = 0;
const TITLE: usize = 1;
const YEAR: usize = 3;
const KEY_COLUMNS: [usize; 3] = [TITLE, AUTHOR, YEAR];

const DETAIL_ROLES: &[(RowSlot, RowRole)] = &[
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

pub struct LibGen {
    search_url: String,
    fields: QueryFields,
    listing: ListingLayout,
    detail: DetailLayout,
    pages: ScriptMarkerCounter,
    mirrors: HashMap<String, MirrorStrategy>,
    fetcher: ContentFetcher,
}

impl LibGen {
    pub fn new() -> Result<Self, RepoError> {
        Ok(Self {
            search_url: SEARCH_URL.to_string(),
            fields: QueryFields {
                query: "req",
                page: "page",
                sort: Some("sort"),
                sort_mode: Some("sortmode"),
                sort_mode_values: [(SortMode::Asc, "ASC"), (SortMode::Desc, "DESC")],
                extra: BTreeMap::from([
                    ("phrase", "1"),
                    ("view", "simple"),
                    ("column", "def"),
                    ("sort", "def"),
                ]),
            },
            listing: ListingLayout {
                table_index: 3,
                item_prefix: "book",
                skip_leading_cells: 1,
                title_column: TITLE,
                column_count: COLUMNS.len(),
            },
            detail: DetailLayout {
                table_index: 1,
                roles: DETAIL_ROLES,
                other_rows: Some(RowRole::Fields),
            },
            pages: ScriptMarkerCounter {
                marker: "Paginator",
            },
            mirrors: HashMap::from([
                ("Libgen.lc".to_string(), MirrorStrategy::mirror_page("GET")),
                ("Library.lol".to_string(), MirrorStrategy::mirror_page("GET")),
                ("Gen.lib.rus.ec".to_string(), MirrorStrategy::mirror_page("GET")),
            ]),
            fetcher: ContentFetcher::new()?,
        })
    }

    /// 替换搜索入口（镜像站或本地测试服务）。
    #[cfg(test)]
    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    #[cfg(test)]
    pub fn with_mirror(mut self, name: impl Into<String>, strategy: MirrorStrategy) -> Self {
        self.mirrors.insert(name.into(), strategy);
        self
    }
}

impl Repository for LibGen {
    fn name(&self) -> &str {
        "libgen"
    }

    fn base_url(&self) -> Result<Url, RepoError> {
        Url::parse(&self.search_url)
            .map_err(|e| RepoError::Config(format!("search url {:?}: {e}", self.search_url)))
    }

    fn query_fields(&self) -> &QueryFields {
        &self.fields
    }

    fn columns(&self) -> &[&'static str] {
        &COLUMNS
    }

    fn key_columns(&self) -> &[usize] {
        &KEY_COLUMNS
    }

    fn page_size(&self) -> usize {
        BOOKS_PER_PAGE
    }

    fn http_method(&self, _step: FetchStep) -> HttpMethod {
        HttpMethod::Get
    }

    fn fetcher(&self) -> &ContentFetcher {
        &self.fetcher
    }

    fn list_rows(&self, content: &str) -> Result<Vec<RowRecord>, RepoError> {
        let rows = extract_rows(content, &self.listing, self.page_size())?;
        debug!(target: "repo", rows = rows.len(), "列表解析完成");
        Ok(rows)
    }

    fn book_info(&self, row: &RowRecord) -> Result<BookRecord, RepoError> {
        let base = self.base_url()?;
        let page = base
            .join(&row.info_page)
            .map_err(|e| RepoError::extraction(format!("bad info page {:?}: {e}", row.info_page)))?;
        let content = fetch_content(self, &page, FetchStep::Detail)?;
        let book = extract_book(&content, &page, &self.detail)?;
        info!(target: "repo", title = %book.title, mirrors = book.mirrors.len(), "详情解析完成");
        Ok(book)
    }

    fn max_page(&self, content: &str) -> Result<u32, RepoError> {
        self.pages.max_page(content)
    }

    fn begin_download(&self, mirror: &str) -> Result<Box<dyn MirrorDownloader>, RepoError> {
        let strategy = self
            .mirrors
            .get(mirror)
            .ok_or_else(|| RepoError::UnsupportedMirror(mirror.to_string()))?;
        let method = self.http_method(FetchStep::Download);
        let direct = DirectDownloader::new(mirror, self.fetcher.clone(), method);
        let downloader: Box<dyn MirrorDownloader> = match strategy.landing_link {
            None => Box::new(direct),
            Some(link_text) => Box::new(MirrorPageDownloader::new(direct, link_text)),
        };
        Ok(downloader)
    }
}
