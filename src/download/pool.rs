//! 下载线程池：N 个共享同一链接仓库的 worker 线程。

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use reqwest::blocking::Client;
use tracing::{info, warn};

use super::link_store::LinkStore;
use super::worker::{DownloadWorker, WorkerControl, WorkerOptions};

pub struct WorkerPool {
    store: Arc<LinkStore>,
    workers: Vec<(WorkerControl, JoinHandle<()>)>,
}

impl WorkerPool {
    /// 启动 `size` 个（至少 1 个）名为 `download-worker-<i>` 的线程。
    pub fn spawn(
        store: Arc<LinkStore>,
        client: Client,
        options: WorkerOptions,
        size: usize,
    ) -> std::io::Result<Self> {
        let size = size.max(1);
        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let name = format!("download-worker-{i}");
            // Client 内部共享连接池，clone 很便宜
            let worker = DownloadWorker::new(
                name.clone(),
                Arc::clone(&store),
                client.clone(),
                options.clone(),
            );
            let control = worker.control();
            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || worker.run())?;
            workers.push((control, handle));
        }
        info!(target: "download", workers = size, dir = %options.save_dir.display(), "下载线程池已启动");
        Ok(Self { store, workers })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn store(&self) -> &Arc<LinkStore> {
        &self.store
    }

    pub fn controls(&self) -> Vec<WorkerControl> {
        self.workers.iter().map(|(c, _)| c.clone()).collect()
    }

    /// 停止全部 worker，返回各自当前下载的字节位置。
    ///
    /// 不会关闭仓库，未取走的链接保留在队列里。
    pub fn stop(&self) -> Vec<u64> {
        self.workers.iter().map(|(c, _)| c.stop()).collect()
    }

    /// 关闭仓库并等待所有 worker 处理完剩余链接后退出。
    pub fn finish(self) {
        self.store.close();
        self.join();
    }

    pub fn join(self) {
        for (_, handle) in self.workers {
            let name = handle.thread().name().unwrap_or("download-worker").to_string();
            if handle.join().is_err() {
                warn!(target: "download", worker = %name, "worker 线程异常退出");
            }
        }
    }
}
