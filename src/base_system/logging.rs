//! 日志：`logs/latest.log` 记录完整的下载过程，终端输出只在 `--debug` 时打开
//! （进度条同样画在 stderr 上）。
//!
//! 只有本程序自己的 target 按所选级别记录，reqwest / hyper / rustls 等依赖一律 WARN 起。
//! 进程结束（正常返回、Ctrl+C、panic）时依次执行退出钩子、落盘剩余日志、把 latest.log 打包为 zip。

use std::fs::{self, File};
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, warn};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use zip::CompressionMethod;
use zip::write::FileOptions;

const LATEST_LOG: &str = "latest.log";
/// 启动时超过该大小的 latest.log 先归档
const ROTATE_BYTES: u64 = 10 * 1024 * 1024;
const OWN_TARGETS: [&str; 3] = ["startup", "download", "link_store"];

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("初始化日志订阅器失败: {0}")]
    Init(#[from] TryInitError),
    #[error("日志文件读写失败: {0}")]
    Io(#[from] io::Error),
    #[error("打包日志失败: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("格式化时间失败: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    /// `startup` / `download` / `link_store` 的记录级别
    pub level: LevelFilter,
    /// 同时输出到终端
    pub console: bool,
}

impl LogOptions {
    pub fn from_debug(debug: bool) -> Self {
        Self {
            level: if debug {
                LevelFilter::DEBUG
            } else {
                LevelFilter::INFO
            },
            console: debug,
        }
    }
}

type ExitHook = Box<dyn FnOnce() + Send + 'static>;

/// 持有日志后台线程与退出流程；drop 时执行一次退出流程。
pub struct LogSystem {
    exit: Arc<ExitState>,
}

impl LogSystem {
    /// 日志写到 `<base_dir>/logs`（未指定时为当前目录下的 `logs`）。
    pub fn init(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        let files = LogFiles::new(base_dir);
        fs::create_dir_all(&files.dir)?;
        if let Some(archived) = files.rotate_if_large()? {
            eprintln!("旧日志过大，已归档到 {}", archived.display());
        }

        let (file_writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&files.dir, LATEST_LOG));

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(file_writer)
            .with_filter(own_targets(options.level));

        let console_layer = options.console.then(|| {
            fmt::layer()
                .with_target(false)
                .with_thread_names(true)
                .with_writer(io::stderr)
                .with_filter(own_targets(options.level))
        });

        tracing_subscriber::registry()
            .with(file_layer)
            .with(console_layer)
            .try_init()?;

        let exit = Arc::new(ExitState {
            files,
            guard: Mutex::new(Some(guard)),
            hooks: Mutex::new(Vec::new()),
            done: AtomicBool::new(false),
        });
        install_ctrlc(&exit);
        install_panic_hook(&exit);

        Ok(Self { exit })
    }

    /// 注册退出钩子；退出时按注册的逆序执行，且只执行一次。
    pub fn add_exit_hook<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.exit.hooks.lock() {
            Ok(mut hooks) => hooks.push(Box::new(hook)),
            Err(poisoned) => poisoned.into_inner().push(Box::new(hook)),
        }
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.exit.run();
    }
}

/// 本程序的 target 按 `level` 记录，其余 target 只保留 WARN 及以上。
fn own_targets(level: LevelFilter) -> Targets {
    OWN_TARGETS
        .iter()
        .fold(Targets::new().with_default(LevelFilter::WARN), |t, name| {
            t.with_target(*name, level)
        })
}

fn install_ctrlc(exit: &Arc<ExitState>) {
    let exit = Arc::clone(exit);
    let installed = ctrlc::set_handler(move || {
        warn!(target: "startup", "收到 Ctrl+C，停止下载并退出");
        exit.run();
        std::process::exit(130);
    });
    if let Err(err) = installed {
        warn!(target: "startup", "无法注册 Ctrl+C 处理: {err}");
    }
}

fn install_panic_hook(exit: &Arc<ExitState>) {
    let exit = Arc::clone(exit);
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let thread = std::thread::current();
        error!(
            target: "startup",
            thread = thread.name().unwrap_or("<unnamed>"),
            "panic: {info}"
        );
        exit.run();
        previous(info);
    }));
}

struct ExitState {
    files: LogFiles,
    guard: Mutex<Option<WorkerGuard>>,
    hooks: Mutex<Vec<ExitHook>>,
    done: AtomicBool,
}

impl ExitState {
    fn run(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }

        let hooks = match self.hooks.lock() {
            Ok(mut hooks) => std::mem::take(&mut *hooks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for hook in hooks.into_iter().rev() {
            hook();
        }

        // drop 守卫会等待后台线程写完缓冲的日志
        let guard = match self.guard.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(guard);

        if let Err(err) = self.files.archive() {
            eprintln!("归档日志失败: {err}");
        }
    }
}

/// 日志目录布局：`latest.log` 与归档出的 `log_<时间>.zip`。
#[derive(Debug, Clone)]
struct LogFiles {
    dir: PathBuf,
}

impl LogFiles {
    fn new(base_dir: Option<&Path>) -> Self {
        let dir = base_dir
            .map(|b| b.join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"));
        Self { dir }
    }

    fn latest(&self) -> PathBuf {
        self.dir.join(LATEST_LOG)
    }

    fn rotate_if_large(&self) -> Result<Option<PathBuf>, LogError> {
        match fs::metadata(self.latest()) {
            Ok(meta) if meta.len() >= ROTATE_BYTES => self.archive(),
            _ => Ok(None),
        }
    }

    /// 压缩 latest.log 并删除原文件；不存在或为空时不产生归档。
    fn archive(&self) -> Result<Option<PathBuf>, LogError> {
        let latest = self.latest();
        let len = match fs::metadata(&latest) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        if len == 0 {
            fs::remove_file(&latest)?;
            return Ok(None);
        }

        let stamp = OffsetDateTime::now_utc().format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))?;
        let target = self.next_archive_path(&stamp);

        let mut zip = zip::ZipWriter::new(File::create(&target)?);
        zip.start_file(
            format!("{stamp}.log"),
            FileOptions::default().compression_method(CompressionMethod::Deflated),
        )?;
        io::copy(&mut File::open(&latest)?, &mut zip)?;
        zip.finish()?;

        fs::remove_file(&latest)?;
        Ok(Some(target))
    }

    fn next_archive_path(&self, stamp: &str) -> PathBuf {
        std::iter::once(self.dir.join(format!("log_{stamp}.zip")))
            .chain((1u32..).map(|n| self.dir.join(format!("log_{stamp}_{n}.zip"))))
            .find(|p| !p.exists())
            .unwrap_or_else(|| self.dir.join(format!("log_{stamp}.zip")))
    }
}
