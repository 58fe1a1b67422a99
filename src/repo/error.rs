//! 仓库访问、解析与下载的错误分类。

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoError {
    /// 没有拿到任何响应（DNS、连接、读取中断等）。
    #[error("transport error: {0}")]
    Transport(String),
    #[error("fetch failed with status {status}")]
    FetchFailed { status: u16 },
    #[error("extraction failed: {reason}")]
    ExtractionFailed { reason: String },
    /// 软失败：调用方应退化为“只有当前页”。
    #[error("max page number not found")]
    PaginationNotFound,
    #[error("unsupported mirror: {0}")]
    UnsupportedMirror(String),
    #[error("download failed: {0}")]
    DownloadFailed(String),
    #[error("page {page} is out of bound (1..={max})")]
    InvalidPage { page: u32, max: u32 },
    #[error("invalid repository configuration: {0}")]
    Config(String),
}

impl RepoError {
    pub fn extraction(reason: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            reason: reason.into(),
        }
    }

    /// 下载阶段的任何失败都归并为 `DownloadFailed`。
    pub fn into_download_failure(self) -> Self {
        match self {
            Self::DownloadFailed(_) => self,
            other => Self::DownloadFailed(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::FetchFailed {
                status: status.as_u16(),
            };
        }
        Self::Transport(err.to_string())
    }
}
