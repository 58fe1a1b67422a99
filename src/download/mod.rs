//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`：数据模型（DownloadProgress / DownloadTask / DownloadOutcome）
//! - `progress`：进度上报与 CLI 进度条
//! - `downloader`：镜像下载器
//! - `pipeline`：列表获取、翻页校验、下载与引用

pub mod downloader;
pub mod models;
pub mod pipeline;
pub mod progress;
