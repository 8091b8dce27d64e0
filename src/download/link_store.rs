//! 链接仓库：生产者与下载 worker 之间唯一的协调点。
//!
//! 待下载链接放在一条无界 FIFO 通道里；投递即唤醒一个阻塞中的 worker，
//! 每条链接只会交给一个 worker。关闭仓库后，剩余链接仍会被取完，
//! 之后所有（包括正在阻塞的）取链接调用都返回 [`Dequeued::Closed`]。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crossbeam_channel as channel;
use tracing::{debug, info, warn};

use super::error::StoreClosed;
use super::listener::{NoopListener, ProgressListener};

/// 一次取链接的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeued {
    Link(String),
    /// 仅 [`LinkStore::dequeue_timeout`] 会返回
    Timeout,
    /// 仓库已关闭且没有剩余链接
    Closed,
}

pub struct LinkStore {
    tx: Mutex<Option<channel::Sender<String>>>,
    rx: channel::Receiver<String>,
    listener: RwLock<Arc<dyn ProgressListener>>,
    aborted: AtomicBool,
}

impl Default for LinkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStore {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded::<String>();
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            listener: RwLock::new(Arc::new(NoopListener)),
            aborted: AtomicBool::new(false),
        }
    }

    /// 追加链接并唤醒一个等待中的 worker，从不阻塞。
    ///
    /// 链接本身不做校验，由取到它的 worker 判定。
    pub fn enqueue(&self, link: impl Into<String>) -> Result<(), StoreClosed> {
        let link = link.into();
        let guard = match self.tx.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(tx) = guard.as_ref() else {
            return Err(StoreClosed(link));
        };
        debug!(target: "link_store", %link, "链接入队");
        // 接收端由 self 持有，发送不会因断开而失败
        tx.send(link).map_err(|e| StoreClosed(e.into_inner()))
    }

    /// 阻塞直到取到一条链接，或仓库关闭且已取空。
    pub fn dequeue_blocking(&self) -> Dequeued {
        if self.is_aborted() {
            return Dequeued::Closed;
        }
        match self.rx.recv() {
            Ok(link) => self.deliver(link),
            Err(channel::RecvError) => Dequeued::Closed,
        }
    }

    /// 与 [`Self::dequeue_blocking`] 相同，但最多等待 `timeout`。
    pub fn dequeue_timeout(&self, timeout: Duration) -> Dequeued {
        if self.is_aborted() {
            return Dequeued::Closed;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(link) => self.deliver(link),
            Err(channel::RecvTimeoutError::Timeout) => Dequeued::Timeout,
            Err(channel::RecvTimeoutError::Disconnected) => Dequeued::Closed,
        }
    }

    fn deliver(&self, link: String) -> Dequeued {
        if self.is_aborted() {
            debug!(target: "link_store", %link, "仓库已中止，丢弃链接");
            return Dequeued::Closed;
        }
        Dequeued::Link(link)
    }

    /// 安装所有 worker 共用的监听器；对之后开始的下载生效。
    pub fn set_listener(&self, listener: Arc<dyn ProgressListener>) {
        match self.listener.write() {
            Ok(mut slot) => *slot = listener,
            Err(poisoned) => *poisoned.into_inner() = listener,
        }
    }

    pub fn listener(&self) -> Arc<dyn ProgressListener> {
        match self.listener.read() {
            Ok(slot) => Arc::clone(&slot),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// 优雅关闭：不再接受新链接，已排队的链接仍会被取走。
    pub fn close(&self) {
        let taken = match self.tx.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if taken.is_some() {
            info!(target: "link_store", pending = self.pending(), "链接仓库已关闭");
        }
    }

    /// 立即关闭并丢弃所有待处理链接。
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.close();
        let dropped = self.rx.try_iter().count();
        if dropped > 0 {
            warn!(target: "link_store", dropped, "链接仓库已中止，丢弃未处理链接");
        }
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn is_closed(&self) -> bool {
        match self.tx.lock() {
            Ok(g) => g.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn single_consumer_sees_fifo_order() {
        let store = LinkStore::new();
        for i in 0..5 {
            store.enqueue(format!("http://h/{i}")).unwrap();
        }
        store.close();

        let mut seen = Vec::new();
        while let Dequeued::Link(link) = store.dequeue_blocking() {
            seen.push(link);
        }
        let expected: Vec<String> = (0..5).map(|i| format!("http://h/{i}")).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn concurrent_producers_and_consumers_deliver_exactly_once() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;
        const CONSUMERS: usize = 3;

        let store = Arc::new(LinkStore::new());

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Dequeued::Link(link) = store.dequeue_blocking() {
                        got.push(link);
                    }
                    got
                })
            })
            .collect();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        store.enqueue(format!("http://h/{p}/{i}")).unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        store.close();

        let all: Vec<String> = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect();
        let unique: HashSet<&String> = all.iter().collect();
        assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
        assert_eq!(unique.len(), all.len());
        assert_eq!(store.pending(), 0);
    }

    #[test]
    fn close_wakes_blocked_worker() {
        let store = Arc::new(LinkStore::new());
        let waiter = {
            let store = Arc::clone(&store);
            thread::spawn(move || store.dequeue_blocking())
        };
        thread::sleep(Duration::from_millis(50));
        store.close();
        assert_eq!(waiter.join().unwrap(), Dequeued::Closed);
    }

    #[test]
    fn close_still_drains_pending_links() {
        let store = LinkStore::new();
        store.enqueue("http://h/a").unwrap();
        store.close();

        assert!(store.is_closed());
        assert_eq!(store.dequeue_blocking(), Dequeued::Link("http://h/a".into()));
        assert_eq!(store.dequeue_blocking(), Dequeued::Closed);
        assert_eq!(store.dequeue_blocking(), Dequeued::Closed);
    }

    #[test]
    fn abort_discards_pending_links() {
        let store = LinkStore::new();
        store.enqueue("http://h/a").unwrap();
        store.enqueue("http://h/b").unwrap();
        store.abort();

        assert_eq!(store.pending(), 0);
        assert_eq!(store.dequeue_blocking(), Dequeued::Closed);
    }

    #[test]
    fn enqueue_after_close_is_refused() {
        let store = LinkStore::new();
        store.close();
        let err = store.enqueue("http://h/late").unwrap_err();
        assert_eq!(err.0, "http://h/late");
    }

    #[test]
    fn timeout_then_link() {
        let store = LinkStore::new();
        assert_eq!(
            store.dequeue_timeout(Duration::from_millis(10)),
            Dequeued::Timeout
        );
        store.enqueue("http://h/x").unwrap();
        assert_eq!(
            store.dequeue_timeout(Duration::from_millis(10)),
            Dequeued::Link("http://h/x".into())
        );
    }

    #[test]
    fn drained_store_blocks_until_next_enqueue() {
        let store = Arc::new(LinkStore::new());
        store.enqueue("http://h/1").unwrap();
        assert_eq!(store.dequeue_blocking(), Dequeued::Link("http://h/1".into()));
        assert_eq!(
            store.dequeue_timeout(Duration::from_millis(20)),
            Dequeued::Timeout
        );

        let waiter = {
            let store = Arc::clone(&store);
            thread::spawn(move || store.dequeue_blocking())
        };
        thread::sleep(Duration::from_millis(20));
        store.enqueue("http://h/2").unwrap();
        assert_eq!(waiter.join().unwrap(), Dequeued::Link("http://h/2".into()));
    }

    #[test]
    fn listener_can_be_replaced() {
        struct Marker;
        impl ProgressListener for Marker {}

        let store = LinkStore::new();
        let marker: Arc<dyn ProgressListener> = Arc::new(Marker);
        store.set_listener(Arc::clone(&marker));
        assert!(Arc::ptr_eq(&store.listener(), &marker));
    }
}
