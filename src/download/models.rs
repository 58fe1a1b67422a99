//! 下载相关的数据模型定义。

use std::path::{Path, PathBuf};

use url::Url;

use crate::book_parser::book::BookRecord;
use crate::repo::error::RepoError;

/// 下载进度：已知总长时为比例，否则为已接收字节数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DownloadProgress {
    Fraction(f64),
    Bytes(u64),
}

impl DownloadProgress {
    /// 状态栏显示用的整数百分比；未知总长时为 `None`。
    pub fn percent(self) -> Option<u8> {
        match self {
            Self::Fraction(f) => Some((f.clamp(0.0, 1.0) * 100.0).floor() as u8),
            Self::Bytes(_) => None,
        }
    }
}

/// 一次下载动作：哪本书、走哪个镜像、写到哪里。
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub mirror: String,
    pub url: Url,
    pub dest: PathBuf,
    pub book: BookRecord,
}

impl DownloadTask {
    /// 书里没有这个镜像时返回 `UnsupportedMirror`。
    pub fn for_mirror(book: &BookRecord, mirror: &str, out_dir: &Path) -> Result<Self, RepoError> {
        let url = book
            .mirrors
            .get(mirror)
            .cloned()
            .ok_or_else(|| RepoError::UnsupportedMirror(mirror.to_string()))?;
        Ok(Self {
            mirror: mirror.to_string(),
            url,
            dest: book.file_path_in(out_dir),
            book: book.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub file: PathBuf,
    pub bytes: u64,
    pub citation: PathBuf,
}
