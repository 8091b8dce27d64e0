use super::descriptor::ProgressDescriptor;
use super::error::DownloadError;

/// 下载生命周期回调，由正在处理该下载的 worker 线程同步调用。
///
/// 同一个描述的回调严格有序：`download_begin` → `download_progress`* →
/// `download_complete`（或 `download_failed`）。多个 worker 会并发调用同一个
/// 监听器，因此实现必须 `Send + Sync`，且不要在回调里做耗时操作。
pub trait ProgressListener: Send + Sync {
    fn download_begin(&self, _descriptor: &ProgressDescriptor) {}

    fn download_progress(&self, _descriptor: &ProgressDescriptor) {}

    fn download_complete(&self, _descriptor: &ProgressDescriptor) {}

    /// 链接被放弃。`descriptor` 为 `None` 表示失败发生在开始下载之前。
    fn download_failed(
        &self,
        _link: &str,
        _descriptor: Option<&ProgressDescriptor>,
        _error: &DownloadError,
    ) {
    }
}

/// 默认监听器：什么都不做。
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ProgressListener for NoopListener {}
