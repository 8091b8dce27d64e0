//! 文件名解析：从最终 URL 推出保存用的文件名与目标路径。

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use percent_encoding::percent_decode_str;
use reqwest::Url;
use time::OffsetDateTime;
use time::macros::format_description;

use crate::base_system::context::NameCollision;

const MAX_NAME_LEN: usize = 200;

static GENERATED: AtomicU64 = AtomicU64::new(0);

/// 取 URL 路径最后一个非空段，百分号解码并清理为可用文件名。
///
/// 路径里没有可用名字（如 `https://host/`）时返回 `None`。
pub fn file_name_from_url(url: &Url) -> Option<String> {
    let segment = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()?;
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    let cleaned = safe_fs_name(&decoded, "_", MAX_NAME_LEN);
    (!cleaned.is_empty()).then_some(cleaned)
}

/// 无法从 URL 得到名字时使用：`download_<UTC 时间>_<序号>`。
pub fn generated_file_name() -> String {
    let seq = GENERATED.fetch_add(1, Ordering::Relaxed);
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_else(|_| "unknown".to_string());
    format!("download_{stamp}_{seq}")
}

/// 在存储目录里创建目标文件，返回实际路径与已打开的文件。
///
/// `Overwrite` 直接截断同名文件。`Rename` 用 `create_new` 依次尝试
/// `name`、`name (1)`、`name (2)`……，检查与创建是同一次系统调用，
/// 同时下载同名文件的 worker 各自拿到不同的路径。
pub fn create_destination(
    dir: &Path,
    file_name: &str,
    policy: NameCollision,
) -> io::Result<(PathBuf, File)> {
    let first = dir.join(file_name);
    if policy == NameCollision::Overwrite {
        let file = File::create(&first)?;
        return Ok((first, file));
    }

    let (stem, ext) = split_extension(file_name);
    let candidates = std::iter::once(first)
        .chain((1u32..).map(|n| dir.join(format!("{stem} ({n}){ext}"))));
    for candidate in candidates {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(ErrorKind::AlreadyExists, file_name.to_string()))
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// 把名字清理成各平台都能落盘的文件名。
pub fn safe_fs_name(name: &str, replacement: &str, max_len: usize) -> String {
    let fallback = replacement.chars().next().unwrap_or('_');
    let mut cleaned: String = name
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '"' | '<' | '>' | '|' | '?' | '*' => fallback,
            c if (c as u32) < 32 => fallback,
            _ => ch,
        })
        .collect();

    while cleaned.ends_with(' ') || cleaned.ends_with('.') {
        cleaned.pop();
    }
    if cleaned.trim_start_matches('.').is_empty() {
        return String::new();
    }

    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let upper = cleaned.to_uppercase();
    let stem = upper.split('.').next().unwrap_or("");
    if RESERVED.contains(&stem) {
        cleaned = format!("_{cleaned}");
    }

    if cleaned.len() > max_len {
        // 避免在多字节 UTF-8 字符中间截断
        let mut end = max_len;
        while !cleaned.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        cleaned.truncate(end);
        while cleaned.ends_with(' ') || cleaned.ends_with('.') {
            cleaned.pop();
        }
    }

    cleaned
}
