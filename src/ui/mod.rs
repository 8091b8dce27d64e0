//! 交互层入口。
//!
//! - `console` — 监听器的终端实现（indicatif 进度条）
//! - `noui`    — 链接来源（参数 / 文件 / 标准输入）

pub mod console;
pub mod noui;
