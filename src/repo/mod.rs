//! 仓库（书籍搜索站点）抽象。
//!
//! 流水线只通过 `Repository` 访问站点：构造查询、选择 HTTP 方法、解析列表与详情、
//! 选择镜像下载策略。新增站点只需再实现一次该 trait。

pub mod error;
pub mod libgen;
pub mod query;

use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::book_parser::book::BookRecord;
use crate::download::downloader::MirrorDownloader;
use crate::network_parser::network::{ContentFetcher, FetchBody, HttpMethod};
use error::RepoError;
use query::{QueryFields, SearchQuery, build_url};

/// 流水线中的请求阶段，各阶段可使用不同的 HTTP 方法。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStep {
    Listing,
    Detail,
    Download,
}

/// 列表页中的一行：展示列 + 详情页引用（相对路径与 query）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRecord {
    pub columns: Vec<String>,
    pub info_page: String,
}

impl RowRecord {
    /// 由仓库声明的关键列拼出的可读标识。
    pub fn key(&self, repo: &dyn Repository, delimiter: &str) -> String {
        repo.key_columns()
            .iter()
            .filter_map(|&i| self.columns.get(i))
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(delimiter)
    }

    /// 非关键列，形如 `Publisher: Acme`。
    pub fn details(&self, repo: &dyn Repository) -> Vec<String> {
        let keys = repo.key_columns();
        repo.columns()
            .iter()
            .zip(&self.columns)
            .enumerate()
            .filter(|(i, _)| !keys.contains(i))
            .map(|(_, (name, value))| format!("{name}: {value}"))
            .collect()
    }
}

pub trait Repository: Send + Sync {
    fn name(&self) -> &str;

    /// 搜索入口地址；格式错误属于配置错误。
    fn base_url(&self) -> Result<Url, RepoError>;

    fn query_fields(&self) -> &QueryFields;

    fn columns(&self) -> &[&'static str];

    fn key_columns(&self) -> &[usize];

    fn page_size(&self) -> usize;

    fn http_method(&self, step: FetchStep) -> HttpMethod;

    /// POST 阶段使用的 Content-Type。
    fn content_type(&self) -> &str {
        ""
    }

    fn fetcher(&self) -> &ContentFetcher;

    fn list_rows(&self, content: &str) -> Result<Vec<RowRecord>, RepoError>;

    /// 按行里保存的引用重新抓取详情页并解析。
    fn book_info(&self, row: &RowRecord) -> Result<BookRecord, RepoError>;

    fn max_page(&self, content: &str) -> Result<u32, RepoError>;

    fn begin_download(&self, mirror: &str) -> Result<Box<dyn MirrorDownloader>, RepoError>;
}

pub fn search_url(repo: &dyn Repository, query: &SearchQuery) -> Result<Url, RepoError> {
    Ok(build_url(&repo.base_url()?, repo.query_fields(), query))
}

/// 以指定阶段的方法抓取页面文本。
pub fn fetch_content(repo: &dyn Repository, url: &Url, step: FetchStep) -> Result<String, RepoError> {
    let method = repo.http_method(step);
    let body = FetchBody {
        content_type: repo.content_type().to_string(),
        body: String::new(),
    };
    debug!(target: "repo", repo = repo.name(), ?step, url = %url, "抓取页面");
    let resp = repo.fetcher().fetch(url, method, Some(&body))?;
    Ok(resp.text())
}

pub const SUPPORTED_REPOSITORIES: &[&str] = &["libgen"];

pub fn resolve_repository(key: &str) -> Result<Arc<dyn Repository>, RepoError> {
    match key {
        "libgen" => Ok(Arc::new(libgen::LibGen::new()?)),
        other => Err(RepoError::Config(format!(
            "unknown repository {other:?}, use one of [{}]",
            SUPPORTED_REPOSITORIES.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_repository_lists_supported_keys() {
        let err = resolve_repository("nope").err().unwrap();
        assert!(err.to_string().contains("libgen"));
    }

    #[test]
    fn row_key_joins_key_columns() {
        let repo = libgen::LibGen::new().unwrap();
        let row = RowRecord {
            columns: ["Knuth", "TAOCP", "AW", "1968", "650", "English", "9 Mb", "djvu"]
                .map(String::from)
                .to_vec(),
            info_page: "book/index.php?md5=1".to_string(),
        };
        assert_eq!(row.key(&repo, " | "), "TAOCP | Knuth | 1968");
        let details = row.details(&repo);
        assert!(details.contains(&"Publisher: AW".to_string()));
        assert!(!details.iter().any(|d| d.starts_with("Title")));
    }
}
