//! HTML 解析模块入口。
//!
//! 把列表页/详情页解析为结构化记录：
//! - `rows`：列表页 → `RowRecord`
//! - `detail`：详情页 → `BookRecord`（行角色表驱动）
//! - `pagination`：最大页码
//! - `book`：`BookRecord` 本身（字段填充、BibTeX、文件名）

pub mod book;
pub mod detail;
pub(crate) mod html_utils;
pub mod pagination;
pub mod rows;
