//! 镜像下载器：把镜像地址上的文件流式写到本地。
//!
//! - `DirectDownloader`：镜像地址即文件地址
//! - `MirrorPageDownloader`：镜像地址是落地页，页面里的 “GET” 链接才是文件

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::models::DownloadProgress;
use super::progress::ProgressReporter;
use crate::book_parser::html_utils::{normalized_text, resolve};
use crate::network_parser::network::{ContentFetcher, HttpMethod};
use crate::repo::error::RepoError;

const CHUNK: usize = 8 * 1024;

/// 仓库为每个镜像名声明的下载方式；默认即直链下载。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStrategy {
    /// 有值时镜像地址是落地页，文件在文字为此值的链接上
    pub landing_link: Option<&'static str>,
}

impl MirrorStrategy {
    pub fn mirror_page(link_text: &'static str) -> Self {
        Self {
            landing_link: Some(link_text),
        }
    }
}

pub trait MirrorDownloader: Send {
    /// 镜像名
    fn key(&self) -> &str;

    /// 下载到 `dest`（覆盖已有文件），返回从头打开的只读句柄。
    ///
    /// 失败时删除残留的部分文件，错误统一为 `DownloadFailed`。
    fn exec(
        &self,
        url: &Url,
        dest: &Path,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<File, RepoError>;
}

pub struct DirectDownloader {
    name: String,
    fetcher: ContentFetcher,
    method: HttpMethod,
}

impl DirectDownloader {
    pub fn new(name: &str, fetcher: ContentFetcher, method: HttpMethod) -> Self {
        Self {
            name: name.to_string(),
            fetcher,
            method,
        }
    }
}

impl MirrorDownloader for DirectDownloader {
    fn key(&self) -> &str {
        &self.name
    }

    fn exec(
        &self,
        url: &Url,
        dest: &Path,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<File, RepoError> {
        stream_to_file(&self.fetcher, self.method, url, dest, progress)
    }
}

/// 先解析落地页，再交给内部的直链下载器。
pub struct MirrorPageDownloader {
    file: DirectDownloader,
    link_text: &'static str,
}

impl MirrorPageDownloader {
    pub fn new(file: DirectDownloader, link_text: &'static str) -> Self {
        Self { file, link_text }
    }

    fn file_link(&self, page: &Url) -> Result<Url, RepoError> {
        let html = self
            .file
            .fetcher
            .fetch(page, self.file.method, None)
            .map_err(RepoError::into_download_failure)?
            .text();
        find_link(&html, page, self.link_text)
    }
}

impl MirrorDownloader for MirrorPageDownloader {
    fn key(&self) -> &str {
        self.file.key()
    }

    fn exec(
        &self,
        url: &Url,
        dest: &Path,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<File, RepoError> {
        let file_url = self.file_link(url)?;
        debug!(target: "download", mirror = self.key(), link = %file_url, "落地页解析完成");
        self.file.exec(&file_url, dest, progress)
    }
}

/// 落地页里第一个文字为 `link_text`（忽略大小写）的 `<a href>`。
fn find_link(html: &str, page: &Url, link_text: &str) -> Result<Url, RepoError> {
    let doc = Html::parse_document(html);
    let anchors = Selector::parse("a[href]")
        .map_err(|e| RepoError::DownloadFailed(format!("selector: {e}")))?;
    let href = doc
        .select(&anchors)
        .find(|a| normalized_text(*a).eq_ignore_ascii_case(link_text))
        .and_then(|a| a.value().attr("href"))
        .ok_or_else(|| {
            RepoError::DownloadFailed(format!("no {link_text:?} link on mirror page {page}"))
        })?;
    resolve(page, href).map_err(RepoError::into_download_failure)
}

fn stream_to_file(
    fetcher: &ContentFetcher,
    method: HttpMethod,
    url: &Url,
    dest: &Path,
    progress: &mut dyn FnMut(DownloadProgress),
) -> Result<File, RepoError> {
    info!(target: "download", url = %url, dest = %dest.display(), "开始下载");
    let resp = fetcher
        .open(url, method, None)
        .map_err(RepoError::into_download_failure)?;

    let mut file = File::create(dest)
        .map_err(|e| RepoError::DownloadFailed(format!("create {}: {e}", dest.display())))?;

    let written = copy_with_progress(resp, &mut file, progress);
    drop(file);
    match written {
        Ok(bytes) => {
            info!(target: "download", bytes, dest = %dest.display(), "下载完成");
            File::open(dest)
                .map_err(|e| RepoError::DownloadFailed(format!("reopen {}: {e}", dest.display())))
        }
        Err(err) => {
            warn!(target: "download", error = %err, "下载失败，删除部分文件");
            let _ = fs::remove_file(dest);
            Err(err)
        }
    }
}

fn copy_with_progress(
    mut resp: reqwest::blocking::Response,
    file: &mut File,
    progress: &mut dyn FnMut(DownloadProgress),
) -> Result<u64, RepoError> {
    let mut reporter = ProgressReporter::new(resp.content_length(), progress);
    let mut buf = [0u8; CHUNK];
    loop {
        let n = resp
            .read(&mut buf)
            .map_err(|e| RepoError::DownloadFailed(format!("read stream: {e}")))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .map_err(|e| RepoError::DownloadFailed(format!("write file: {e}")))?;
        reporter.advance(n);
    }
    file.flush()
        .map_err(|e| RepoError::DownloadFailed(format!("flush file: {e}")))?;
    reporter.finish();
    Ok(reporter.received())
}
