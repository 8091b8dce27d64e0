//! 下载 worker：阻塞等待链接 → 流式写盘 → 回到等待。
//!
//! 单个链接的任何错误都只影响这一条：记录日志、通知监听器后继续取下一条。
//! 只有仓库关闭或收到停止请求才会结束循环。

use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT_ENCODING, HeaderMap, HeaderValue};
use tracing::{debug, error, info, warn};

use super::descriptor::ProgressDescriptor;
use super::error::DownloadError;
use super::link_store::{Dequeued, LinkStore};
use super::listener::ProgressListener;
use super::naming::{create_destination, file_name_from_url, generated_file_name};
use super::progress::ProgressThrottle;
use crate::base_system::context::{Config, NameCollision};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub save_dir: PathBuf,
    pub chunk_size: usize,
    pub progress_fallback_chunks: u32,
    pub sync_each_chunk: bool,
    pub on_name_collision: NameCollision,
    /// 等待链接时检查停止标志的间隔；`None` 时一直阻塞，只有关闭仓库才能让 worker 退出
    pub poll_interval: Option<Duration>,
}

impl WorkerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            save_dir: config.default_save_dir(),
            chunk_size: config.chunk_size.max(1),
            progress_fallback_chunks: config.progress_fallback_chunks.max(1),
            sync_each_chunk: config.sync_each_chunk,
            on_name_collision: config.on_name_collision,
            poll_interval: Some(DEFAULT_POLL_INTERVAL),
        }
    }
}

pub fn build_client(config: &Config) -> reqwest::Result<Client> {
    // 不带解压特性，要求原样字节，Content-Length 才与落盘大小一致
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .default_headers(headers)
        .user_agent(config.user_agent.as_str())
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
        .build()
}

/// worker 的外部控制：停止标志与当前下载的字节位置。
#[derive(Debug, Clone, Default)]
pub struct WorkerControl {
    stop: Arc<AtomicBool>,
    position: Arc<AtomicU64>,
}

impl WorkerControl {
    /// 请求停止并返回当前下载已写入的字节数（空闲时为 0）。
    ///
    /// 正在进行的下载会在下一块之前中断，已写入的部分文件保留在磁盘上。
    pub fn stop(&self) -> u64 {
        self.stop.store(true, Ordering::SeqCst);
        self.position()
    }

    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn set_position(&self, bytes: u64) {
        self.position.store(bytes, Ordering::Relaxed);
    }
}

pub struct DownloadWorker {
    name: String,
    store: Arc<LinkStore>,
    client: Client,
    options: WorkerOptions,
    control: WorkerControl,
}

impl DownloadWorker {
    pub fn new(
        name: impl Into<String>,
        store: Arc<LinkStore>,
        client: Client,
        options: WorkerOptions,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            client,
            options,
            control: WorkerControl::default(),
        }
    }

    pub fn control(&self) -> WorkerControl {
        self.control.clone()
    }

    /// Waiting → Downloading → Waiting … 直到仓库关闭或被停止。
    pub fn run(&self) {
        debug!(target: "download", worker = %self.name, "worker 启动");
        loop {
            if self.control.stop_requested() {
                info!(target: "download", worker = %self.name, "收到停止信号，worker 退出");
                break;
            }
            let next = match self.options.poll_interval {
                Some(interval) => self.store.dequeue_timeout(interval),
                None => self.store.dequeue_blocking(),
            };
            let link = match next {
                Dequeued::Link(link) => link,
                Dequeued::Timeout => continue,
                Dequeued::Closed => {
                    debug!(target: "download", worker = %self.name, "链接仓库已关闭，worker 退出");
                    break;
                }
            };
            if let Err(err) = self.process(&link)
                && err.is_interrupted()
            {
                break;
            }
        }
    }

    /// 完整处理一条链接，并驱动监听器回调。
    pub fn process(&self, link: &str) -> Result<ProgressDescriptor, DownloadError> {
        let listener = self.store.listener();

        let (response, mut descriptor, file) = match self.open(link) {
            Ok(opened) => opened,
            Err(err) => {
                error!(target: "download", worker = %self.name, %link, "无法开始下载: {err}");
                listener.download_failed(link, None, &err);
                return Err(err);
            }
        };

        info!(
            target: "download",
            worker = %self.name,
            link = %descriptor.source(),
            total = ?descriptor.total(),
            "开始下载 {}",
            descriptor.target().display()
        );
        listener.download_begin(&descriptor);

        let result = write_stream(
            response,
            file,
            &mut descriptor,
            listener.as_ref(),
            &self.control,
            &self.options,
        );
        self.control.set_position(0);

        match result {
            Ok(()) => {
                listener.download_progress(&descriptor);
                listener.download_complete(&descriptor);
                info!(
                    target: "download",
                    worker = %self.name,
                    bytes = descriptor.downloaded(),
                    "下载完成 {}",
                    descriptor.filename()
                );
                Ok(descriptor)
            }
            Err(err) => {
                if err.is_interrupted() {
                    warn!(
                        target: "download",
                        worker = %self.name,
                        bytes = descriptor.downloaded(),
                        "下载被中断 {}",
                        descriptor.filename()
                    );
                } else {
                    error!(
                        target: "download",
                        worker = %self.name,
                        bytes = descriptor.downloaded(),
                        "下载失败 {}: {err}",
                        descriptor.filename()
                    );
                }
                if err.leaves_partial_file() {
                    debug!(
                        target: "download",
                        worker = %self.name,
                        "部分文件保留在 {}",
                        descriptor.target().display()
                    );
                }
                listener.download_failed(link, Some(&descriptor), &err);
                Err(err)
            }
        }
    }

    /// 解析链接、建立连接并创建目标文件。
    fn open(&self, link: &str) -> Result<(Response, ProgressDescriptor, File), DownloadError> {
        let url = Url::parse(link.trim()).map_err(|e| DownloadError::InvalidLink {
            link: link.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DownloadError::InvalidLink {
                link: link.to_string(),
                reason: format!("不支持的协议 {}", url.scheme()),
            });
        }

        let response = self
            .client
            .get(url)
            .send()
            .and_then(Response::error_for_status)
            .map_err(|source| DownloadError::Connection {
                link: link.to_string(),
                source,
            })?;

        let total = response.content_length();
        // 重定向后的最终地址才是真正的文件
        let filename = file_name_from_url(response.url()).unwrap_or_else(generated_file_name);

        fs::create_dir_all(&self.options.save_dir).map_err(|source| {
            DownloadError::CreateFile {
                path: self.options.save_dir.clone(),
                source,
            }
        })?;
        let (target, file) = create_destination(
            &self.options.save_dir,
            &filename,
            self.options.on_name_collision,
        )
        .map_err(|source| DownloadError::CreateFile {
            path: self.options.save_dir.join(&filename),
            source,
        })?;

        Ok((
            response,
            ProgressDescriptor::new(link, target, filename, total),
            file,
        ))
    }
}

/// 把 `reader` 按块写入 `file`（即 `descriptor.target()` 处已创建的文件）。
///
/// 每块写完才累加进度，进度按 [`ProgressThrottle`] 节流上报。
/// 写入只保证交给了操作系统；开启 `sync_each_chunk` 时每块再 `sync_data` 落到磁盘。
/// 出错时已写入的部分保留在磁盘上。函数返回时文件已关闭。
pub(crate) fn write_stream<R: Read>(
    mut reader: R,
    mut file: File,
    descriptor: &mut ProgressDescriptor,
    listener: &dyn ProgressListener,
    control: &WorkerControl,
    options: &WorkerOptions,
) -> Result<(), DownloadError> {
    let path = descriptor.target().to_path_buf();

    let mut throttle = ProgressThrottle::new(descriptor.total(), options.progress_fallback_chunks);
    let mut buf = vec![0u8; options.chunk_size.max(1)];
    let mut overrun_reported = false;

    loop {
        if control.stop_requested() {
            return Err(DownloadError::Interrupted);
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(DownloadError::Read(e)),
        };

        let chunk = &buf[..n];
        file.write_all(chunk)
            .and_then(|()| {
                if options.sync_each_chunk {
                    file.sync_data()
                } else {
                    Ok(())
                }
            })
            .map_err(|source| DownloadError::Write {
                path: path.clone(),
                source,
            })?;

        descriptor.increase(n as u64);
        control.set_position(descriptor.downloaded());

        if !overrun_reported && descriptor.exceeds_total() {
            overrun_reported = true;
            warn!(
                target: "download",
                declared = ?descriptor.total(),
                "服务器发送的数据超过声明长度: {}",
                descriptor.filename()
            );
        }

        if throttle.record(n as u64) {
            listener.download_progress(descriptor);
        }
    }

    Ok(())
}
