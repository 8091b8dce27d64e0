//! 单个下载的进度描述。

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// 一次下载的身份与字节进度。
///
/// 由处理该链接的 worker 独占写入；监听器只拿到不可变借用，需要保留时自行 `clone`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressDescriptor {
    id: u64,
    source: String,
    target: PathBuf,
    filename: String,
    /// 服务器声明的长度；未提供 Content-Length 时为 `None`
    total: Option<u64>,
    downloaded: u64,
}

impl ProgressDescriptor {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<PathBuf>,
        filename: impl Into<String>,
        total: Option<u64>,
    ) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            source: source.into(),
            target: target.into(),
            filename: filename.into(),
            total,
            downloaded: 0,
        }
    }

    /// 进程内唯一，便于 UI 按下载维度保存状态。
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub fn increase(&mut self, bytes: u64) {
        self.downloaded = self.downloaded.saturating_add(bytes);
    }

    /// 已下载超过声明长度（服务器谎报 Content-Length）。
    pub fn exceeds_total(&self) -> bool {
        self.total.is_some_and(|t| self.downloaded > t)
    }

    /// 百分比（整数除法）；总大小未知或为 0 时返回 `None`。
    pub fn percent(&self) -> Option<u64> {
        self.total
            .filter(|&t| t > 0)
            .map(|t| (self.downloaded as u128 * 100 / t as u128) as u64)
    }
}

impl fmt::Display for ProgressDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent() {
            Some(pct) => write!(f, "[ {:>3}% ] {}", pct.min(100), self.filename),
            None => write!(f, "[ ---% ] {}", self.filename),
        }
    }
}
