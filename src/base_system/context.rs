//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, ConfigSpec, FieldMeta};

/// 目标文件已存在时的处理方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameCollision {
    /// 直接覆盖（后写入者生效）
    #[default]
    Overwrite,
    /// 在扩展名前追加 ` (n)`
    Rename,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 路径配置
    #[serde(default)]
    pub save_path: String,

    // 网络配置
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default)]
    pub request_timeout: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // 写盘配置
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_progress_fallback_chunks")]
    pub progress_fallback_chunks: u32,
    #[serde(default)]
    pub sync_each_chunk: bool,
    #[serde(default)]
    pub on_name_collision: NameCollision,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_path: String::new(),
            max_workers: default_max_workers(),
            request_timeout: 0,
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
            chunk_size: default_chunk_size(),
            progress_fallback_chunks: default_progress_fallback_chunks(),
            sync_each_chunk: false,
            on_name_collision: NameCollision::default(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 9] = [
            FieldMeta {
                name: "save_path",
                description: "保存路径（留空则为当前目录下的 downloads）",
            },
            FieldMeta {
                name: "max_workers",
                description: "下载线程数（同时进行的下载数）",
            },
            FieldMeta {
                name: "request_timeout",
                description: "单次下载总超时（秒），0 表示不限制",
            },
            FieldMeta {
                name: "connect_timeout",
                description: "连接超时（秒）",
            },
            FieldMeta {
                name: "user_agent",
                description: "请求使用的 User-Agent",
            },
            FieldMeta {
                name: "chunk_size",
                description: "每次读取/写入的块大小（字节）",
            },
            FieldMeta {
                name: "progress_fallback_chunks",
                description: "总大小未知时，每隔多少块上报一次进度",
            },
            FieldMeta {
                name: "sync_each_chunk",
                description: "每块写入后是否强制落盘（fsync），较慢",
            },
            FieldMeta {
                name: "on_name_collision",
                description: "文件名冲突处理：overwrite 覆盖 / rename 自动改名",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Validation("chunk_size 必须大于 0".into()));
        }
        if self.progress_fallback_chunks == 0 {
            return Err(ConfigError::Validation(
                "progress_fallback_chunks 必须大于 0".into(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn default_save_dir(&self) -> PathBuf {
        if self.save_path.trim().is_empty() {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("downloads")
        } else {
            PathBuf::from(&self.save_path)
        }
    }

    pub fn worker_count(&self) -> usize {
        self.max_workers.clamp(1, 64)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout > 0).then(|| Duration::from_secs(self.request_timeout))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout.max(1))
    }
}

fn default_max_workers() -> usize {
    2
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("link-downloader/{}", env!("CARGO_PKG_VERSION"))
}

fn default_chunk_size() -> usize {
    8 * 1024
}

fn default_progress_fallback_chunks() -> u32 {
    128
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_system::config::load_or_create;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.chunk_size, 8192);
        assert_eq!(cfg.worker_count(), 2);
        assert_eq!(cfg.request_timeout(), None);
        assert_eq!(cfg.on_name_collision, NameCollision::Overwrite);
        assert!(cfg.default_save_dir().ends_with("downloads"));
    }

    #[test]
    fn collision_policy_parses_lowercase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "on_name_collision: rename\nmax_workers: 0\n").unwrap();

        let cfg: Config = load_or_create(Some(&path)).unwrap();
        assert_eq!(cfg.on_name_collision, NameCollision::Rename);
        assert_eq!(cfg.worker_count(), 1);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "chunk_size: 0\n").unwrap();

        assert!(load_or_create::<Config>(Some(&path)).is_err());
    }
}
