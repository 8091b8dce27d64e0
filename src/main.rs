//! 后台链接下载器。
//!
//! 生产者把链接投入共享的链接仓库，若干下载线程从中取链接、流式写盘，
//! 并通过监听器上报进度。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置 / 日志等基础设施
//! - `download`：链接仓库、下载 worker 与线程池
//! - `ui`：终端进度展示与链接来源

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{error, info, warn};

mod base_system;
mod download;
mod ui;

use base_system::config::load_or_create_with_base;
use base_system::context::Config;
use base_system::logging::{LogOptions, LogSystem};
use download::{LinkStore, WorkerOptions, WorkerPool, build_client};
use ui::console::ConsoleListener;
use ui::noui;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "link-downloader")]
#[command(about = "Background download manager: a shared link queue drained by worker threads")]
struct Cli {
    /// 要下载的链接；不提供链接且未指定 --input 时从标准输入读取
    links: Vec<String>,

    /// 链接文件（每行一个，# 开头为注释）
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// 下载线程数（覆盖配置文件中的 max_workers）
    #[arg(short, long)]
    workers: Option<usize>,

    /// 保存目录（覆盖配置文件中的 save_path）
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// 数据目录路径（用于存放 config.yml 和 logs）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 启用调试日志输出（同时输出到终端）
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 显示版本信息后退出
    #[arg(long, default_value_t = false)]
    version: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("link-downloader v{}", VERSION);
        return Ok(());
    }

    let data_dir = cli.data_dir.as_deref();
    let log = init_logging(cli.debug, data_dir)?;
    info!(target: "startup", "当前版本: v{}", VERSION);

    let mut config =
        load_or_create_with_base::<Config>(None, data_dir).context("加载配置文件失败")?;
    if let Some(dir) = cli.save_dir.as_ref() {
        config.save_path = dir.to_string_lossy().into_owned();
    }
    if let Some(n) = cli.workers {
        config.max_workers = n;
    }

    let store = Arc::new(LinkStore::new());
    let console = Arc::new(ConsoleListener::new());
    store.set_listener(console.clone());

    let client = build_client(&config).context("初始化 HTTP 客户端失败")?;
    let pool = WorkerPool::spawn(
        Arc::clone(&store),
        client,
        WorkerOptions::from_config(&config),
        config.worker_count(),
    )
    .context("启动下载线程失败")?;

    // Ctrl+C / panic：丢弃未开始的链接并停止所有 worker
    {
        let store = Arc::clone(pool.store());
        let controls = pool.controls();
        log.add_exit_hook(move || {
            store.abort();
            for control in &controls {
                let position = control.stop();
                if position > 0 {
                    warn!(target: "download", bytes = position, "下载被中断");
                }
            }
        });
    }

    let interactive = cli.links.is_empty() && cli.input.is_none();
    let mut queued = noui::enqueue_all(&store, cli.links);
    if let Some(path) = cli.input.as_deref() {
        match noui::read_link_file(path) {
            Ok(links) => queued += noui::enqueue_all(&store, links),
            Err(err) => error!(target: "startup", "{err:#}"),
        }
    }
    if interactive {
        queued += noui::run_stdin(&store)?;
    }

    info!(target: "startup", queued, workers = pool.size(), "链接已全部入队，等待下载完成");
    pool.finish();

    let result = console.result();
    println!(
        "下载结束：成功 {} 个，失败 {} 个（共 {} 个链接）",
        result.success, result.failed, queued
    );
    for (link, reason) in &result.failures {
        println!("  {link}: {reason}");
    }
    Ok(())
}

fn init_logging(debug: bool, base_dir: Option<&std::path::Path>) -> Result<LogSystem> {
    LogSystem::init(LogOptions::from_debug(debug), base_dir).map_err(|e| anyhow!(e))
}
