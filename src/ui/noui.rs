//! 无 UI 的链接来源：命令行参数、链接文件、标准输入。

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::download::LinkStore;

/// 每行一个链接；忽略空行与 `#` 开头的注释。
pub fn parse_links(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn read_link_file(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("读取链接文件失败: {}", path.display()))?;
    Ok(parse_links(&raw))
}

/// 逐条投递，返回成功入队的数量。
pub fn enqueue_all<I, S>(store: &LinkStore, links: I) -> usize
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut accepted = 0;
    for link in links {
        match store.enqueue(link) {
            Ok(()) => accepted += 1,
            Err(err) => warn!(target: "link_store", "{err}"),
        }
    }
    accepted
}

/// 交互模式：从 `input` 逐行读取链接，直到 EOF 或输入 `q`。
pub fn run_interactive<R: BufRead, W: Write>(
    store: &LinkStore,
    mut input: R,
    mut out: W,
) -> Result<usize> {
    writeln!(out, "请输入下载链接（每行一个，q 退出）：")?;
    let mut accepted = 0;
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();
        if text.eq_ignore_ascii_case("q") {
            break;
        }
        accepted += enqueue_all(store, parse_links(text));
        if store.is_closed() {
            // Ctrl+C 已中止仓库，后续输入不会再被处理
            break;
        }
    }
    Ok(accepted)
}

pub fn run_stdin(store: &LinkStore) -> Result<usize> {
    let stdin = io::stdin();
    run_interactive(store, stdin.lock(), io::stderr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::link_store::Dequeued;
    use std::io::Cursor;

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let links = parse_links("  http://a/1 \n\n# note\nhttp://a/2\n");
        assert_eq!(links, ["http://a/1", "http://a/2"]);
    }

    #[test]
    fn link_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.txt");
        fs::write(&path, "http://a/1\n#x\nhttp://a/2\n").unwrap();
        assert_eq!(read_link_file(&path).unwrap().len(), 2);
        assert!(read_link_file(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn interactive_stops_at_q() {
        let store = LinkStore::new();
        let input = Cursor::new("http://a/1\n\nhttp://a/2\nq\nhttp://a/3\n");
        let mut out = Vec::new();

        let n = run_interactive(&store, input, &mut out).unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.pending(), 2);
        assert_eq!(store.dequeue_blocking(), Dequeued::Link("http://a/1".into()));
    }

    #[test]
    fn closed_store_counts_nothing() {
        let store = LinkStore::new();
        store.close();
        assert_eq!(enqueue_all(&store, ["http://a/1"]), 0);
    }

    #[test]
    fn interactive_stops_reading_once_store_is_closed() {
        let store = LinkStore::new();
        store.abort();
        let mut input = Cursor::new("http://a/1\nhttp://a/2\n");

        let n = run_interactive(&store, &mut input, Vec::new()).unwrap();
        assert_eq!(n, 0);
        assert_eq!(input.position(), "http://a/1\n".len() as u64);
    }
}
