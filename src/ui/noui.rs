//! 无 UI（纯命令行）交互入口。
//!
//! 打印编号列表，从标准输入读取命令：`<n>` 查看详情、`p <n>` 翻页、`n`/`N` 前后翻页、`q` 退出。
//! 详情之后选择镜像并下载，进度用 `indicatif` 进度条显示。

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossterm::event::DisableMouseCapture;
use crossterm::execute;
use crossterm::terminal::{LeaveAlternateScreen, disable_raw_mode};
use tracing::{info, warn};

use crate::base_system::context::Config;
use crate::book_parser::book::BookRecord;
use crate::download::models::{DownloadProgress, DownloadTask};
use crate::download::pipeline::{ListingPage, PageCache, load_page, run_download};
use crate::download::progress::CliProgress;
use crate::repo::query::SearchQuery;
use crate::repo::{Repository, RowRecord};

pub fn run(
    repo: Arc<dyn Repository>,
    config: Arc<Config>,
    query: SearchQuery,
    first: ListingPage,
) -> Result<()> {
    // 上次可能停在 raw mode，尽量恢复终端让行输入可用
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), DisableMouseCapture, LeaveAlternateScreen);

    let stdin = io::stdin();
    let mut session = Session::new(repo, config, query, first, stdin.lock(), io::stdout());
    session.run()
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Show(usize),
    Page(u32),
    Next,
    Prev,
    List,
    Quit,
    Invalid,
}

fn parse_command(input: &str) -> Command {
    let text = input.trim();
    match text {
        "" | "l" => return Command::List,
        "q" | "Q" => return Command::Quit,
        "n" | "]" => return Command::Next,
        "N" | "[" => return Command::Prev,
        _ => {}
    }
    if let Some(rest) = text.strip_prefix('p') {
        return rest
            .trim()
            .parse::<u32>()
            .map(Command::Page)
            .unwrap_or(Command::Invalid);
    }
    text.parse::<usize>()
        .map(Command::Show)
        .unwrap_or(Command::Invalid)
}

struct Session<R, W> {
    repo: Arc<dyn Repository>,
    config: Arc<Config>,
    query: SearchQuery,
    cache: PageCache,
    listing: Arc<ListingPage>,
    input: R,
    out: W,
}

impl<R: BufRead, W: Write> Session<R, W> {
    fn new(
        repo: Arc<dyn Repository>,
        config: Arc<Config>,
        query: SearchQuery,
        first: ListingPage,
        input: R,
        out: W,
    ) -> Self {
        let mut cache = PageCache::new();
        let listing = cache.insert(first);
        Self {
            repo,
            config,
            query,
            cache,
            listing,
            input,
            out,
        }
    }

    fn run(&mut self) -> Result<()> {
        self.print_listing()?;
        loop {
            let Some(line) = self.prompt(&format!(
                "请输入编号查看详情（p <页码> 翻页 / n 下一页 / N 上一页 / q 退出，第 {}/{} 页）：",
                self.listing.page, self.listing.max_page
            ))?
            else {
                break;
            };
            match parse_command(&line) {
                Command::Quit => break,
                Command::List => self.print_listing()?,
                Command::Show(n) => self.show(n)?,
                Command::Page(page) => self.goto(page)?,
                Command::Next => self.goto(self.listing.page.saturating_add(1))?,
                Command::Prev => self.goto(self.listing.page.saturating_sub(1))?,
                Command::Invalid => writeln!(self.out, "输入无效\n")?,
            }
        }
        writeln!(self.out, "已退出。")?;
        Ok(())
    }

    /// 读一行；输入结束（EOF）时返回 `None`。
    fn prompt(&mut self, text: &str) -> Result<Option<String>> {
        write!(self.out, "{text}")?;
        self.out.flush().ok();
        let mut line = String::new();
        let n = self.input.read_line(&mut line).context("读取输入失败")?;
        Ok((n > 0).then_some(line))
    }

    fn print_listing(&mut self) -> Result<()> {
        writeln!(
            self.out,
            "\n===== 搜索: {} （第 {}/{} 页）=====",
            self.query.term(),
            self.listing.page,
            self.listing.max_page
        )?;
        for (i, row) in self.listing.rows.iter().enumerate() {
            let key = row.key(self.repo.as_ref(), &self.config.key_delimiter);
            writeln!(self.out, "{:>2}. {key}", i + 1)?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn goto(&mut self, page: u32) -> Result<()> {
        if let Some(listing) = self.cache.get(page) {
            self.listing = listing;
            return self.print_listing();
        }
        match load_page(
            self.repo.as_ref(),
            &self.query,
            page,
            self.listing.max_page,
        ) {
            Ok(listing) => {
                self.listing = self.cache.insert(listing);
                self.print_listing()
            }
            Err(err) => {
                warn!(target: "ui", page, "翻页失败: {err}");
                writeln!(self.out, "翻页失败: {err}\n")?;
                Ok(())
            }
        }
    }

    fn show(&mut self, n: usize) -> Result<()> {
        let Some(row) = n
            .checked_sub(1)
            .and_then(|i| self.listing.rows.get(i))
            .cloned()
        else {
            writeln!(self.out, "编号超出范围 (1-{})\n", self.listing.rows.len())?;
            return Ok(());
        };
        let book = match self.repo.book_info(&row) {
            Ok(book) => book,
            Err(err) => {
                warn!(target: "ui", "详情加载失败: {err}");
                writeln!(self.out, "详情加载失败: {err}\n")?;
                return Ok(());
            }
        };
        self.print_book(&row, &book)?;

        let mirrors = book.mirror_names();
        let Some(mirror) = self.pick_mirror(&mirrors)? else {
            writeln!(self.out, "已取消下载\n")?;
            return Ok(());
        };
        self.download(&book, &mirror)
    }

    fn print_book(&mut self, row: &RowRecord, book: &BookRecord) -> Result<()> {
        writeln!(self.out, "\n书名: {}", book.title)?;
        for (label, value) in [
            ("作者", &book.author),
            ("出版社", &book.publisher),
            ("年份", &book.year),
            ("语言", &book.language),
            ("页数", &book.pages),
            ("大小", &book.size),
            ("格式", &book.extension),
            ("ISBN", &book.isbn),
        ] {
            if !value.is_empty() {
                writeln!(self.out, "{label}: {value}")?;
            }
        }
        for detail in row.details(self.repo.as_ref()) {
            writeln!(self.out, "  - {detail}")?;
        }
        if !book.synopsis.is_empty() {
            let mut short: String = book.synopsis.chars().take(120).collect();
            if book.synopsis.chars().count() > 120 {
                short.push_str("...");
            }
            writeln!(self.out, "简介: {short}")?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    /// 输入编号或镜像名；空行或 0 取消。
    fn pick_mirror(&mut self, mirrors: &[String]) -> Result<Option<String>> {
        for (i, name) in mirrors.iter().enumerate() {
            writeln!(self.out, "{}. {name}", i + 1)?;
        }
        writeln!(self.out, "0. 取消")?;
        let Some(line) = self.prompt("请选择镜像：")? else {
            return Ok(None);
        };
        let choice = line.trim();
        if choice.is_empty() || choice == "0" {
            return Ok(None);
        }
        if let Ok(idx) = choice.parse::<usize>() {
            return Ok(idx.checked_sub(1).and_then(|i| mirrors.get(i)).cloned());
        }
        Ok(mirrors
            .iter()
            .find(|m| m.eq_ignore_ascii_case(choice))
            .cloned())
    }

    fn download(&mut self, book: &BookRecord, mirror: &str) -> Result<()> {
        let task = match DownloadTask::for_mirror(book, mirror, &self.config.out_dir()) {
            Ok(task) => task,
            Err(err) => {
                writeln!(self.out, "下载失败: {err}\n")?;
                return Ok(());
            }
        };
        info!(target: "download", mirror, dest = %task.dest.display(), "开始下载");
        let bar = CliProgress::new(&book.title);
        let result = run_download(
            self.repo.as_ref(),
            &task,
            &self.config,
            &mut |progress: DownloadProgress| bar.update(progress),
        );
        bar.finish();
        match result {
            Ok(outcome) => {
                writeln!(
                    self.out,
                    "下载完成: {} ({} 字节)\n引用: {}\n",
                    outcome.file.display(),
                    outcome.bytes,
                    outcome.citation.display()
                )?;
            }
            Err(err) => {
                warn!(target: "download", "下载失败: {err}");
                writeln!(self.out, "下载失败: {err}\n")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Cursor;

    use super::*;
    use crate::book_parser::detail::fixtures::detail_page;
    use crate::book_parser::rows::fixtures::listing_page;
    use crate::download::downloader::MirrorStrategy;
    use crate::download::pipeline::fetch_listing;
    use crate::network_parser::network::test_server::{Route, TestServer};
    use crate::repo::libgen::LibGen;

    fn session(
        server: &TestServer,
        dir: &std::path::Path,
        input: &str,
    ) -> Session<Cursor<Vec<u8>>, Vec<u8>> {
        let repo = LibGen::new()
            .unwrap()
            .with_search_url(format!("{}/search.php", server.base_url))
            .with_mirror("MirrorA", MirrorStrategy::default());
        let query = SearchQuery::new("foo");
        let first = fetch_listing(&repo, &query).unwrap();
        let config = Config {
            out_dir: dir.display().to_string(),
            out_dir_bib: dir.display().to_string(),
            ..Config::default()
        };
        Session::new(
            Arc::new(repo),
            Arc::new(config),
            query,
            first,
            Cursor::new(input.as_bytes().to_vec()),
            Vec::new(),
        )
    }

    fn server() -> TestServer {
        TestServer::spawn(HashMap::from([
            ("/search.php".to_string(), Route::html(listing_page(25, Some(4)))),
            (
                "/book/index.php".to_string(),
                Route::html(detail_page(
                    "Book Title 2",
                    &[("MirrorA", "/files/b.pdf"), ("Libgen.lc", "/ads.php?md5=2")],
                )),
            ),
            ("/files/b.pdf".to_string(), Route::bytes(vec![1u8; 4096])),
        ]))
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("3\n"), Command::Show(3));
        assert_eq!(parse_command("p 2"), Command::Page(2));
        assert_eq!(parse_command("p7"), Command::Page(7));
        assert_eq!(parse_command("n"), Command::Next);
        assert_eq!(parse_command("["), Command::Prev);
        assert_eq!(parse_command("q"), Command::Quit);
        assert_eq!(parse_command(""), Command::List);
        assert_eq!(parse_command("x"), Command::Invalid);
        assert_eq!(parse_command("p abc"), Command::Invalid);
    }

    #[test]
    fn detail_then_download_by_mirror_name() {
        let server = server();
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(&server, dir.path(), "2\nmirrora\nq\n");
        s.run().unwrap();
        let out = String::from_utf8(s.out).unwrap();
        assert!(out.contains(" 1. "));
        assert!(out.contains("书名: Book Title 2"));
        assert!(out.contains("下载完成"));

        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(files.iter().any(|f| f.ends_with(".pdf")));
        assert!(files.iter().any(|f| f.ends_with(".bib")));
    }

    #[test]
    fn out_of_range_page_does_not_fetch() {
        let server = server();
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(&server, dir.path(), "p 9\n");
        let hits = server.hits();
        s.run().unwrap();
        let out = String::from_utf8(s.out).unwrap();
        assert!(out.contains("翻页失败"));
        assert_eq!(server.hits(), hits);
    }

    #[test]
    fn next_page_fetches_once_then_uses_cache() {
        let server = server();
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(&server, dir.path(), "n\nN\nn\n");
        let hits = server.hits();
        s.run().unwrap();
        assert_eq!(server.hits(), hits + 1);
        assert_eq!(s.listing.page, 2);
        assert_eq!(s.cache.len(), 2);
    }

    #[test]
    fn cancelled_mirror_choice_downloads_nothing() {
        let server = server();
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(&server, dir.path(), "1\n0\n");
        s.run().unwrap();
        let out = String::from_utf8(s.out).unwrap();
        assert!(out.contains("已取消下载"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn invalid_row_number_is_reported() {
        let server = server();
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(&server, dir.path(), "99\nq\n");
        s.run().unwrap();
        let out = String::from_utf8(s.out).unwrap();
        assert!(out.contains("编号超出范围"));
    }
}
