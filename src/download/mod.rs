//! 下载子系统入口。
//!
//! 子模块：
//! - `link_store`  — 共享链接队列（生产者 / worker 协调）
//! - `worker`      — 单线程下载循环与流式写盘
//! - `pool`        — worker 线程池
//! - `descriptor`  — 单个下载的进度描述
//! - `listener`    — 进度回调接口
//! - `progress`    — 进度上报节流
//! - `naming`      — 文件名解析与冲突处理
//! - `error`       — 错误类型

pub mod descriptor;
pub mod error;
pub mod link_store;
pub mod listener;
pub mod naming;
pub mod pool;
pub(crate) mod progress;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use descriptor::ProgressDescriptor;
pub use error::DownloadError;
pub use link_store::LinkStore;
pub use listener::ProgressListener;
pub use pool::WorkerPool;
pub use worker::{WorkerOptions, build_client};
