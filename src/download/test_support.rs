//! 测试用监听器与本地 HTTP 源。

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use tokio::runtime::Runtime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::descriptor::ProgressDescriptor;
use super::error::DownloadError;
use super::listener::ProgressListener;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Begin {
        id: u64,
        total: Option<u64>,
        thread: Option<String>,
    },
    Progress {
        id: u64,
        downloaded: u64,
    },
    Complete {
        id: u64,
        downloaded: u64,
    },
    Failed {
        link: String,
        id: Option<u64>,
    },
}

impl Event {
    pub(crate) fn id(&self) -> Option<u64> {
        match self {
            Event::Begin { id, .. } | Event::Progress { id, .. } | Event::Complete { id, .. } => {
                Some(*id)
            }
            Event::Failed { id, .. } => *id,
        }
    }
}

/// `download_begin` 记录事件后在此等待，直到 `parties` 个下载都已开始（最多 5 秒）。
#[derive(Debug)]
struct Rendezvous {
    parties: usize,
    arrived: Mutex<usize>,
    all_arrived: Condvar,
}

impl Rendezvous {
    fn arrive(&self) {
        let mut arrived = self.arrived.lock().unwrap();
        *arrived += 1;
        self.all_arrived.notify_all();
        let _ = self
            .all_arrived
            .wait_timeout_while(arrived, Duration::from_secs(5), |n| *n < self.parties)
            .unwrap();
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingListener {
    events: Mutex<Vec<Event>>,
    rendezvous: Option<Rendezvous>,
}

impl RecordingListener {
    /// 前 `parties` 个下载在开始后互相等待，保证它们同时处于下载中。
    pub(crate) fn meeting_at_begin(parties: usize) -> Self {
        Self {
            events: Mutex::default(),
            rendezvous: Some(Rendezvous {
                parties,
                arrived: Mutex::new(0),
                all_arrived: Condvar::new(),
            }),
        }
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn progress_count(&self, id: u64) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Progress { id: i, .. } if *i == id))
            .count()
    }

    pub(crate) fn complete_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Complete { .. }))
            .count()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProgressListener for RecordingListener {
    fn download_begin(&self, d: &ProgressDescriptor) {
        self.push(Event::Begin {
            id: d.id(),
            total: d.total(),
            thread: std::thread::current().name().map(str::to_string),
        });
        if let Some(rendezvous) = &self.rendezvous {
            rendezvous.arrive();
        }
    }

    fn download_progress(&self, d: &ProgressDescriptor) {
        self.push(Event::Progress {
            id: d.id(),
            downloaded: d.downloaded(),
        });
    }

    fn download_complete(&self, d: &ProgressDescriptor) {
        self.push(Event::Complete {
            id: d.id(),
            downloaded: d.downloaded(),
        });
    }

    fn download_failed(&self, link: &str, d: Option<&ProgressDescriptor>, _error: &DownloadError) {
        self.push(Event::Failed {
            link: link.to_string(),
            id: d.map(ProgressDescriptor::id),
        });
    }
}

/// 启动一个只响应给定 GET 路径的本地服务器。
///
/// 返回的运行时必须与服务器一起存活；按 `let (_rt, server)` 绑定即可保证先释放服务器。
pub(crate) fn serve(routes: Vec<(&'static str, ResponseTemplate)>) -> (Runtime, MockServer) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let server = rt.block_on(async {
        let server = MockServer::start().await;
        for (route, response) in routes {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(response)
                .mount(&server)
                .await;
        }
        server
    });
    (rt, server)
}
