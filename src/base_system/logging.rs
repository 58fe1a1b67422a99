//! 日志：控制台、`logs/latest.log`、TUI 日志框三路输出；退出时或超过 10 MB 时打成 zip。

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::{io, panic, thread, time::Duration};

use crossterm::event::DisableMouseCapture;
use crossterm::execute;
use crossterm::terminal::{LeaveAlternateScreen, disable_raw_mode};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::{Layer, Registry};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::{self, MakeWriter, writer::BoxMakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const LATEST_LOG: &str = "latest.log";
const ARCHIVE_PREFIX: &str = "log_";
const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_ARCHIVES: usize = 20;
// non-blocking writer 落盘
const FLUSH_WAIT: Duration = Duration::from_millis(300);

/// 日志框只显示这些 target；`fetch` 的请求细节只进文件。
const UI_TARGETS: &[&str] = &["startup", "repo", "download", "ui"];

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("log io: {0}")]
    Io(#[from] io::Error),
    #[error("log archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("timestamp: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Debug)]
pub struct LogOptions {
    pub debug: bool,
    pub use_color: bool,
    pub archive_on_exit: bool,
    /// TUI 占用屏幕时关掉
    pub console: bool,
    pub broadcast_to_ui: bool,
    pub logs_dir: PathBuf,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            archive_on_exit: true,
            console: true,
            broadcast_to_ui: true,
            logs_dir: PathBuf::from("logs"),
        }
    }
}

type LineChannel = (
    crossbeam_channel::Sender<String>,
    crossbeam_channel::Receiver<String>,
);

static UI_LINES: OnceLock<LineChannel> = OnceLock::new();

/// TUI 订阅日志行；没开广播时为 `None`。
pub fn take_broadcast_rx() -> Option<crossbeam_channel::Receiver<String>> {
    UI_LINES.get().map(|(_, rx)| rx.clone())
}

/// 每条事件格式化后作为一行发给界面。
#[derive(Clone)]
struct UiLineWriter {
    tx: crossbeam_channel::Sender<String>,
}

impl io::Write for UiLineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = String::from_utf8_lossy(buf).trim_end().to_string();
        if !line.is_empty() {
            let _ = self.tx.send(line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for UiLineWriter {
    type Writer = UiLineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn ui_targets() -> Targets {
    UI_TARGETS
        .iter()
        .fold(Targets::new().with_default(LevelFilter::WARN), |t, name| {
            t.with_target(*name, LevelFilter::INFO)
        })
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_layer(options: &LogOptions) -> BoxedLayer {
    let writer = if options.console {
        BoxMakeWriter::new(io::stdout)
    } else {
        BoxMakeWriter::new(io::sink)
    };
    let level = if options.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    fmt::layer()
        .with_target(false)
        .with_ansi(options.use_color)
        .with_writer(writer)
        .with_filter(level)
        .boxed()
}

fn file_layer(writer: NonBlocking) -> BoxedLayer {
    fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(LevelFilter::DEBUG)
        .boxed()
}

fn ui_layer() -> BoxedLayer {
    let (tx, _) = UI_LINES.get_or_init(crossbeam_channel::unbounded).clone();
    fmt::layer()
        .with_target(false)
        .without_time()
        .with_ansi(false)
        .with_writer(UiLineWriter { tx })
        .with_filter(ui_targets())
        .boxed()
}

/// `logs/` 目录：当前日志、zip 归档与旧归档清理。
#[derive(Debug, Clone)]
struct LogArchive {
    dir: PathBuf,
    max_bytes: u64,
    keep: usize,
}

impl LogArchive {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            max_bytes: MAX_LOG_BYTES,
            keep: KEEP_ARCHIVES,
        }
    }

    fn latest(&self) -> PathBuf {
        self.dir.join(LATEST_LOG)
    }

    fn rotate_if_oversized(&self) -> Result<Option<PathBuf>, LogError> {
        match fs::metadata(self.latest()) {
            Ok(meta) if meta.len() >= self.max_bytes => self.archive(),
            _ => Ok(None),
        }
    }

    /// 把 `latest.log` 压成 `log_<时间>.zip` 并删除原文件；空日志直接删。
    fn archive(&self) -> Result<Option<PathBuf>, LogError> {
        let latest = self.latest();
        let Ok(meta) = fs::metadata(&latest) else {
            return Ok(None);
        };
        if meta.len() == 0 {
            let _ = fs::remove_file(&latest);
            return Ok(None);
        }

        let stamp = OffsetDateTime::now_utc().format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))?;
        let path = self.free_archive_path(&stamp);

        let mut zip = zip::ZipWriter::new(File::create(&path)?);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(format!("{stamp}.log"), options)?;
        io::copy(&mut File::open(&latest)?, &mut zip)?;
        zip.finish()?;
        let _ = fs::remove_file(&latest);

        self.prune()?;
        Ok(Some(path))
    }

    fn free_archive_path(&self, stamp: &str) -> PathBuf {
        let mut path = self.dir.join(format!("{ARCHIVE_PREFIX}{stamp}.zip"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{ARCHIVE_PREFIX}{stamp}_{n}.zip"));
            n += 1;
        }
        path
    }

    /// 只保留最新的 `keep` 个归档，返回删除数量。
    fn prune(&self) -> Result<usize, LogError> {
        let mut archives: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(ARCHIVE_PREFIX) && n.ends_with(".zip"))
            })
            .collect();
        if archives.len() <= self.keep {
            return Ok(0);
        }
        // 文件名里的时间戳保证字典序即时间序
        archives.sort();
        let stale = archives.len() - self.keep;
        for path in &archives[..stale] {
            let _ = fs::remove_file(path);
        }
        Ok(stale)
    }
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), DisableMouseCapture, LeaveAlternateScreen);
}

/// 退出流程只执行一次：跑退出钩子、刷写文件日志、归档。
struct Shutdown {
    archive: Option<LogArchive>,
    guard: Mutex<Option<WorkerGuard>>,
    hooks: Mutex<Vec<Box<dyn FnOnce() + Send + 'static>>>,
    done: AtomicBool,
}

impl Shutdown {
    fn run(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut hooks) = self.hooks.lock() {
            while let Some(hook) = hooks.pop() {
                hook();
            }
        }
        if let Ok(mut guard) = self.guard.lock() {
            guard.take();
        }
        if let Some(archive) = &self.archive {
            thread::sleep(FLUSH_WAIT);
            if let Err(err) = archive.archive() {
                eprintln!("日志归档失败: {err}");
            }
        }
    }
}

pub struct LogSystem {
    shutdown: Arc<Shutdown>,
}

impl LogSystem {
    pub fn init(options: LogOptions) -> Result<Self, LogError> {
        fs::create_dir_all(&options.logs_dir)?;
        let archive = LogArchive::new(options.logs_dir.clone());
        let rotated = archive.rotate_if_oversized()?;

        let (file_writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&archive.dir, LATEST_LOG));

        let mut layers = vec![console_layer(&options), file_layer(file_writer)];
        if options.broadcast_to_ui {
            layers.push(ui_layer());
        }
        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .map_err(|e| {
                if e.to_string().contains("already") {
                    LogError::AlreadyInitialized
                } else {
                    LogError::SubscriberInit(e)
                }
            })?;

        if let Some(path) = rotated {
            info!(target: "startup", "上次日志过大，已归档到 {}", path.display());
        }

        let shutdown = Arc::new(Shutdown {
            archive: options.archive_on_exit.then_some(archive),
            guard: Mutex::new(Some(guard)),
            hooks: Mutex::new(Vec::new()),
            done: AtomicBool::new(false),
        });
        install_ctrlc(&shutdown);
        install_panic_hook(&shutdown);

        Ok(Self { shutdown })
    }

    pub fn add_exit_hook<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Ok(mut hooks) = self.shutdown.hooks.lock() {
            hooks.push(Box::new(hook));
        }
    }

    pub fn safe_exit(&self) {
        self.shutdown.run();
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.shutdown.run();
    }
}

fn install_ctrlc(shutdown: &Arc<Shutdown>) {
    let shutdown = Arc::clone(shutdown);
    let _ = ctrlc::set_handler(move || {
        restore_terminal();
        shutdown.run();
        std::process::exit(130);
    });
}

fn install_panic_hook(shutdown: &Arc<Shutdown>) {
    let shutdown = Arc::clone(shutdown);
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        restore_terminal();
        let thread = thread::current();
        let name = thread.name().unwrap_or("unnamed");
        match info.location() {
            Some(loc) => error!(target: "startup", "线程 {name} panic ({}:{}): {info}", loc.file(), loc.line()),
            None => error!(target: "startup", "线程 {name} panic: {info}"),
        }
        shutdown.run();
        previous(info);
    }));
}
