//! 交互层入口。
//!
//! 包含 TUI 与无 UI（纯命令行）两套交互实现。

pub mod noui;
pub mod tui;
