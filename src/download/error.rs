//! 下载相关错误类型。

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// 链接无法解析或协议不受支持。
    #[error("无效链接 {link}: {reason}")]
    InvalidLink { link: String, reason: String },

    /// 建立连接失败或服务器返回错误状态。
    #[error("连接失败 {link}: {source}")]
    Connection {
        link: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("创建文件失败 {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("读取远程数据失败: {0}")]
    Read(#[source] io::Error),

    #[error("写入文件失败 {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// worker 收到停止请求。
    #[error("下载被中断")]
    Interrupted,
}

impl DownloadError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// 目标文件可能已留下部分内容。
    pub fn leaves_partial_file(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Write { .. } | Self::Interrupted)
    }
}

/// 向已关闭的链接仓库投递链接。
#[derive(Debug, Clone, Error)]
#[error("链接仓库已关闭，拒绝链接: {0}")]
pub struct StoreClosed(pub String);
