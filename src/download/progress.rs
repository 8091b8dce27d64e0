//! 进度上报节流。
//!
//! 已知总大小时，累计字节达到 `total >> 20`（约总量的 1/1048576，至少 1 字节）
//! 就上报一次；总大小未知或为 0 时改为每 `fallback_chunks` 块上报一次。

#[derive(Debug, Clone)]
pub(crate) struct ProgressThrottle {
    cadence: Cadence,
    accumulated: u64,
    chunks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cadence {
    Bytes(u64),
    Chunks(u32),
}

impl ProgressThrottle {
    pub(crate) fn new(total: Option<u64>, fallback_chunks: u32) -> Self {
        let cadence = match total {
            Some(t) if t > 0 => Cadence::Bytes((t >> 20).max(1)),
            _ => Cadence::Chunks(fallback_chunks.max(1)),
        };
        Self {
            cadence,
            accumulated: 0,
            chunks: 0,
        }
    }

    /// 记录一块数据；返回 `true` 表示此时应上报进度。
    pub(crate) fn record(&mut self, bytes: u64) -> bool {
        if bytes == 0 {
            return false;
        }
        match self.cadence {
            Cadence::Bytes(threshold) => {
                self.accumulated += bytes;
                if self.accumulated >= threshold {
                    self.accumulated = 0;
                    return true;
                }
            }
            Cadence::Chunks(every) => {
                self.chunks += 1;
                if self.chunks >= every {
                    self.chunks = 0;
                    return true;
                }
            }
        }
        false
    }
}
