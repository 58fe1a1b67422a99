//! 由书名派生输出文件名。

use std::path::{Path, PathBuf};

pub const CITATION_EXT: &str = "bib";

/// 书名 → 文件名主干：标点、下划线、空白均视为分隔符，折叠为单个 `-`，整体小写。
pub fn slug(title: &str) -> String {
    let joined = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();
    if joined.is_empty() {
        "untitled".to_string()
    } else {
        joined
    }
}

pub fn book_file_name(title: &str, extension: &str) -> String {
    let ext = extension.trim().trim_start_matches('.').to_lowercase();
    if ext.is_empty() {
        slug(title)
    } else {
        format!("{}.{}", slug(title), ext)
    }
}

pub fn citation_file_name(title: &str) -> String {
    format!("{}.{CITATION_EXT}", slug(title))
}

pub fn book_file_path(dir: &Path, title: &str, extension: &str) -> PathBuf {
    dir.join(book_file_name(title, extension))
}

pub fn citation_file_path(dir: &Path, title: &str) -> PathBuf {
    dir.join(citation_file_name(title))
}
