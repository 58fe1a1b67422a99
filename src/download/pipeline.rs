//! 搜索 → 列表 → 详情 → 下载 → 引用 的流水线步骤。
//!
//! 这些函数都是阻塞的，界面层在后台线程里调用它们。

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::models::{DownloadOutcome, DownloadProgress, DownloadTask};
use crate::base_system::context::Config;
use crate::book_parser::book::BookRecord;
use crate::repo::error::RepoError;
use crate::repo::query::SearchQuery;
use crate::repo::{FetchStep, Repository, RowRecord, fetch_content, search_url};

/// 一页搜索结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub page: u32,
    pub rows: Vec<RowRecord>,
    pub max_page: u32,
    /// 没找到分页信息时为 false，此时 `max_page == page`
    pub pagination_known: bool,
}

pub fn fetch_listing(repo: &dyn Repository, query: &SearchQuery) -> Result<ListingPage, RepoError> {
    let url = search_url(repo, query)?;
    let content = fetch_content(repo, &url, FetchStep::Listing)?;
    let rows = repo.list_rows(&content)?;
    let (max_page, pagination_known) = match repo.max_page(&content) {
        Ok(max) => (max.max(query.page()), true),
        Err(RepoError::PaginationNotFound) => {
            debug!(target: "repo", page = query.page(), "未找到分页信息，按单页处理");
            (query.page(), false)
        }
        Err(err) => return Err(err),
    };
    info!(
        target: "repo",
        term = query.term(),
        page = query.page(),
        max_page,
        rows = rows.len(),
        "列表获取完成"
    );
    Ok(ListingPage {
        page: query.page(),
        rows,
        max_page,
        pagination_known,
    })
}

/// 页码必须落在 `1..=max`。
pub fn validate_page(page: u32, max: u32) -> Result<u32, RepoError> {
    if page == 0 || page > max {
        return Err(RepoError::InvalidPage { page, max });
    }
    Ok(page)
}

/// 先校验页码再抓取；越界时不发出任何请求。
pub fn load_page(
    repo: &dyn Repository,
    base: &SearchQuery,
    page: u32,
    max: u32,
) -> Result<ListingPage, RepoError> {
    let page = validate_page(page, max)?;
    fetch_listing(repo, &base.for_page(page))
}

/// 本次会话内已获取的列表页。
#[derive(Debug, Default)]
pub struct PageCache {
    pages: HashMap<u32, Arc<ListingPage>>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, page: u32) -> Option<Arc<ListingPage>> {
        self.pages.get(&page).cloned()
    }

    pub fn insert(&mut self, listing: ListingPage) -> Arc<ListingPage> {
        let listing = Arc::new(listing);
        self.pages.insert(listing.page, Arc::clone(&listing));
        listing
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }
}

/// 写出 `<dir>/<slug>.bib`，目录不存在时创建。
pub fn write_citation(book: &BookRecord, dir: &Path) -> Result<PathBuf, RepoError> {
    fs::create_dir_all(dir)
        .map_err(|e| RepoError::DownloadFailed(format!("create {}: {e}", dir.display())))?;
    let path = book.citation_path_in(dir);
    fs::write(&path, book.to_bib())
        .map_err(|e| RepoError::DownloadFailed(format!("write {}: {e}", path.display())))?;
    debug!(target: "download", path = %path.display(), "引用已写出");
    Ok(path)
}

/// 以 `<cmd> [args..] <book> <bib>` 启动下载后命令，不等待其结束。
pub fn spawn_post_command(cmd: &str, book_file: &Path, citation: &Path) -> bool {
    let mut parts = cmd.split_whitespace();
    let Some(program) = parts.next() else {
        return false;
    };
    match Command::new(program)
        .args(parts)
        .arg(book_file)
        .arg(citation)
        .spawn()
    {
        Ok(child) => {
            info!(target: "download", program, pid = child.id(), "已启动下载后命令");
            true
        }
        Err(err) => {
            warn!(target: "download", program, error = %err, "下载后命令启动失败");
            false
        }
    }
}

/// 下载一本书：镜像下载 → 写引用 → 触发下载后命令。
pub fn run_download(
    repo: &dyn Repository,
    task: &DownloadTask,
    config: &Config,
    progress: &mut dyn FnMut(DownloadProgress),
) -> Result<DownloadOutcome, RepoError> {
    if let Some(parent) = task.dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RepoError::DownloadFailed(format!("create {}: {e}", parent.display())))?;
    }
    let downloader = repo.begin_download(&task.mirror)?;
    info!(target: "download", mirror = downloader.key(), dest = %task.dest.display(), "选定镜像");
    let file = downloader.exec(&task.url, &task.dest, progress)?;
    let bytes = file.metadata().map(|m| m.len()).unwrap_or(0);
    let citation = write_citation(&task.book, &config.bib_dir())?;
    if let Some(cmd) = config.exec_cmd() {
        spawn_post_command(cmd, &task.dest, &citation);
    }
    Ok(DownloadOutcome {
        file: task.dest.clone(),
        bytes,
        citation,
    })
}
