//! 终端进度展示：每个进行中的下载一根进度条，结束后打印一行结果。

use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::download::{DownloadError, ProgressDescriptor, ProgressListener};

#[derive(Debug, Default, Clone)]
pub struct DownloadResult {
    pub success: u32,
    pub failed: u32,
    /// (链接, 原因)
    pub failures: Vec<(String, String)>,
}

pub struct ConsoleListener {
    mp: MultiProgress,
    bars: Mutex<HashMap<u64, ProgressBar>>,
    result: Mutex<DownloadResult>,
}

impl Default for ConsoleListener {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleListener {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    pub fn with_draw_target(target: ProgressDrawTarget) -> Self {
        Self {
            mp: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
            result: Mutex::new(DownloadResult::default()),
        }
    }

    pub fn result(&self) -> DownloadResult {
        self.result.lock().map(|r| r.clone()).unwrap_or_default()
    }

    #[cfg(test)]
    pub fn active(&self) -> usize {
        self.bars.lock().map(|b| b.len()).unwrap_or(0)
    }

    fn make_bar(descriptor: &ProgressDescriptor) -> ProgressBar {
        match descriptor.total().filter(|&t| t > 0) {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::with_template(
                        "[{elapsed_precise}] {wide_bar} {bytes}/{total_bytes} ({eta}) {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("##-"),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bytes} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        }
    }

    fn take_bar(&self, id: u64) -> Option<ProgressBar> {
        self.bars.lock().ok().and_then(|mut bars| bars.remove(&id))
    }
}

impl ProgressListener for ConsoleListener {
    fn download_begin(&self, descriptor: &ProgressDescriptor) {
        let bar = self.mp.add(Self::make_bar(descriptor));
        bar.set_message(descriptor.to_string());
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(descriptor.id(), bar);
        }
    }

    fn download_progress(&self, descriptor: &ProgressDescriptor) {
        let Ok(bars) = self.bars.lock() else {
            return;
        };
        if let Some(bar) = bars.get(&descriptor.id()) {
            bar.set_position(descriptor.downloaded());
            bar.set_message(descriptor.to_string());
        }
    }

    fn download_complete(&self, descriptor: &ProgressDescriptor) {
        if let Some(bar) = self.take_bar(descriptor.id()) {
            bar.finish_and_clear();
            self.mp.remove(&bar);
        }
        let _ = self.mp.println(format!(
            "完成 {} -> {}",
            descriptor.filename(),
            descriptor.target().display()
        ));
        if let Ok(mut r) = self.result.lock() {
            r.success += 1;
        }
    }

    fn download_failed(
        &self,
        link: &str,
        descriptor: Option<&ProgressDescriptor>,
        error: &DownloadError,
    ) {
        if let Some(bar) = descriptor.and_then(|d| self.take_bar(d.id())) {
            bar.abandon();
            self.mp.remove(&bar);
        }
        let _ = self.mp.println(format!("失败 {link}: {error}"));
        if let Ok(mut r) = self.result.lock() {
            r.failed += 1;
            r.failures.push((link.to_string(), error.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden() -> ConsoleListener {
        ConsoleListener::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn lifecycle_updates_tally_and_clears_bar() {
        let listener = hidden();
        let mut d = ProgressDescriptor::new("http://h/a", "/tmp/a", "a", Some(10));

        listener.download_begin(&d);
        assert_eq!(listener.active(), 1);
        d.increase(10);
        listener.download_progress(&d);
        listener.download_complete(&d);

        assert_eq!(listener.active(), 0);
        assert_eq!(listener.result().success, 1);
    }

    #[test]
    fn failures_are_recorded_with_link() {
        let listener = hidden();
        let d = ProgressDescriptor::new("http://h/b", "/tmp/b", "b", None);
        listener.download_begin(&d);
        listener.download_failed("http://h/b", Some(&d), &DownloadError::Interrupted);
        listener.download_failed(
            "bad",
            None,
            &DownloadError::InvalidLink {
                link: "bad".into(),
                reason: "relative URL without a base".into(),
            },
        );

        let r = listener.result();
        assert_eq!(listener.active(), 0);
        assert_eq!(r.failed, 2);
        assert_eq!(r.failures[1].0, "bad");
    }
}
