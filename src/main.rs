//! downbook：在书籍搜索站点上检索、浏览并下载电子书的终端工具。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/文件名等基础设施
//! - `repo`：仓库抽象（查询字段、HTTP 方法、镜像策略）与 LibGen 实现
//! - `network_parser`：单次 HTTP 请求
//! - `book_parser`：列表页/详情页/分页解析，`BookRecord` 与 BibTeX
//! - `download`：列表抓取、镜像下载、引用写入与下载后命令
//! - `ui`：TUI 与无 UI（纯命令行）两套交互

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{error, info};

mod base_system;
mod book_parser;
mod download;
mod network_parser;
mod repo;
mod ui;

use base_system::config::load_or_create;
use base_system::context::{Config, default_data_dir};
use base_system::logging::{LogOptions, LogSystem};
use download::pipeline::fetch_listing;
use repo::query::{SearchQuery, SortMode};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "downbook")]
#[command(about = "Search, browse and download books from online repositories")]
struct Cli {
    /// 搜索关键词
    #[arg(short = 's', long = "search", required_unless_present = "version")]
    search: Option<String>,

    /// 仓库（覆盖配置中的 default_repo）
    #[arg(short = 'r', long = "repo")]
    repo: Option<String>,

    /// 配置文件路径（.yml / .yaml / .json）
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// 数据目录（存放配置与 logs，默认为用户配置目录下的 downbook）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 排序字段
    #[arg(long)]
    sort: Option<String>,

    /// 降序排序（配合 --sort）
    #[arg(long, default_value_t = false)]
    desc: bool,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("downbook v{VERSION}");
        return Ok(());
    }

    let data_dir = cli.data_dir.clone().or_else(default_data_dir);
    let config = load_or_create::<Config>(cli.config.as_deref(), data_dir.as_deref())
        .context("加载配置失败")?;

    let log = init_logging(cli.debug, !config.term_ui, data_dir.as_deref())?;
    log.add_exit_hook(|| info!(target: "startup", "程序退出"));
    info!(target: "startup", "downbook v{VERSION}");

    let repo_key = cli.repo.as_deref().unwrap_or(&config.default_repo);
    let repo = repo::resolve_repository(repo_key).map_err(|err| {
        error!(target: "startup", "{err}");
        anyhow!(err)
    })?;
    info!(target: "startup", repo = repo.name(), "仓库就绪");

    let term = cli
        .search
        .ok_or_else(|| anyhow!("缺少搜索关键词（-s/--search）"))?;
    let mut query = SearchQuery::new(term);
    if let Some(field) = cli.sort {
        let mode = cli.desc.then_some(SortMode::Desc);
        query = query.with_sort(field, mode);
    }

    // 首次列表失败直接退出
    let first = fetch_listing(repo.as_ref(), &query)
        .with_context(|| format!("搜索失败: {}", query.term()))?;
    info!(
        target: "startup",
        rows = first.rows.len(),
        max_page = first.max_page,
        "首页加载完成"
    );

    let config = Arc::new(config);
    let result = if config.term_ui {
        ui::tui::run(repo, config, query, first)
    } else {
        ui::noui::run(repo, config, query, first)
    };
    log.safe_exit();
    result
}

fn init_logging(debug: bool, console: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console,
        broadcast_to_ui: !console,
        logs_dir: base_dir.map_or_else(|| PathBuf::from("logs"), |dir| dir.join("logs")),
    };
    LogSystem::init(opts).map_err(|e| anyhow!(e))
}
