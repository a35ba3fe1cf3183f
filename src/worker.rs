//! Extraction runs on dedicated OS threads, each with its own current-thread
//! runtime, so blocking or crashing back-ends never touch the caller's
//! scheduler. Requests go over a channel; answers come back on a oneshot.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::errors::{AppError, ExtractError, Result};
use crate::extractor::{ExtractOptions, Extractor, InfoDict, Query};

enum Job {
    Extract {
        id: Uuid,
        query: Query,
        extractor: Arc<dyn Extractor>,
        reply: oneshot::Sender<Option<InfoDict>>,
    },
    Ping(oneshot::Sender<()>),
}

/// One lock per back-end identity, created the first time it is asked for.
#[derive(Default)]
struct BackendLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BackendLocks {
    fn lock_for(&self, backend: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(backend.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

pub struct ExtractionWorker {
    sender: Sender<Job>,
    locks: Arc<BackendLocks>,
    threads: Vec<JoinHandle<()>>,
}

impl ExtractionWorker {
    /// Spawns `threads` worker threads and waits until every one of them
    /// has its runtime up, so the first real request pays no startup cost.
    pub fn start(threads: usize, options: ExtractOptions) -> Result<Self> {
        let threads = threads.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let locks = Arc::new(BackendLocks::default());
        let options = Arc::new(options);

        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let (ready_tx, ready_rx) = mpsc::channel();
            let receiver = receiver.clone();
            let locks = locks.clone();
            let options = options.clone();

            let handle = thread::Builder::new()
                .name(format!("extraction-worker-{}", index))
                .spawn(move || run_worker(receiver, locks, options, ready_tx))?;

            match ready_rx.recv() {
                Ok(Ok(())) => handles.push(handle),
                Ok(Err(e)) => return Err(AppError::Io(e)),
                Err(_) => {
                    return Err(AppError::Worker(format!(
                        "extraction worker {} died during startup",
                        index
                    )))
                }
            }
        }

        log::info!("✅ [WORKER] Extraction worker started with {} thread(s)", threads);
        Ok(Self {
            sender,
            locks,
            threads: handles,
        })
    }

    /// Runs one extraction on the worker. Any failure on the worker side,
    /// including a panic or a dead worker, comes back as `None`.
    pub async fn extract(&self, query: Query, extractor: Arc<dyn Extractor>) -> Option<InfoDict> {
        let id = Uuid::new_v4();
        let (reply, answer) = oneshot::channel();
        log::debug!("📤 [WORKER] Job {} -> {} ({})", id, extractor.id(), query);

        if self
            .sender
            .send(Job::Extract {
                id,
                query,
                extractor,
                reply,
            })
            .is_err()
        {
            log::error!("❌ [WORKER] Extraction worker is gone, job {} dropped", id);
            return None;
        }

        answer.await.unwrap_or_else(|_| {
            log::error!("❌ [WORKER] Job {} was abandoned by the worker", id);
            None
        })
    }

    /// Round trip through the worker without doing any work.
    pub async fn ping(&self) -> bool {
        let (reply, answer) = oneshot::channel();
        self.sender.send(Job::Ping(reply)).is_ok() && answer.await.is_ok()
    }

    #[cfg(test)]
    fn locks(&self) -> &BackendLocks {
        &self.locks
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }
}

fn run_worker(
    receiver: Arc<Mutex<Receiver<Job>>>,
    locks: Arc<BackendLocks>,
    options: Arc<ExtractOptions>,
    ready: Sender<std::io::Result<()>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => {
            let _ = ready.send(Ok(()));
            runtime
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    loop {
        let job = {
            let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            receiver.recv()
        };

        match job {
            Ok(Job::Extract {
                id,
                query,
                extractor,
                reply,
            }) => {
                let data = run_job(&runtime, &locks, &options, id, &query, extractor.as_ref());
                if reply.send(data).is_err() {
                    log::debug!("[WORKER] Job {} finished after its caller left", id);
                }
            }
            Ok(Job::Ping(reply)) => {
                let _ = reply.send(());
            }
            Err(_) => break,
        }
    }

    log::debug!("[WORKER] {:?} shutting down", thread::current().name());
}

fn run_job(
    runtime: &tokio::runtime::Runtime,
    locks: &BackendLocks,
    options: &ExtractOptions,
    id: Uuid,
    query: &Query,
    extractor: &dyn Extractor,
) -> Option<InfoDict> {
    let lock = locks.lock_for(extractor.backend());
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    let started = std::time::Instant::now();
    let outcome =
        runtime.block_on(AssertUnwindSafe(extractor.extract(query, options)).catch_unwind());
    let elapsed = started.elapsed().as_secs_f64();

    match outcome {
        Ok(Ok(data)) => {
            log::info!("✅ [WORKER] Job {} via {} done in {:.2}s", id, extractor.id(), elapsed);
            Some(data)
        }
        Ok(Err(ExtractError::Empty)) => {
            log::info!("🔍 [WORKER] Job {} via {}: nothing found", id, extractor.id());
            None
        }
        Ok(Err(e)) => {
            log::warn!("⚠️ [WORKER] Job {} via {} failed: {}", id, extractor.id(), e);
            None
        }
        Err(payload) => {
            log::error!(
                "❌ [WORKER] Job {} via {} panicked: {}",
                id,
                extractor.id(),
                panic_message(payload.as_ref())
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Gauge {
        id: &'static str,
        backend: &'static str,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Extractor for Gauge {
        fn id(&self) -> &str {
            self.id
        }

        fn backend(&self) -> &str {
            self.backend
        }

        fn suitable(&self, _url: &str) -> bool {
            true
        }

        async fn extract(
            &self,
            query: &Query,
            _options: &ExtractOptions,
        ) -> std::result::Result<InfoDict, ExtractError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(40));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(InfoDict {
                title: Some(query.to_string()),
                ..InfoDict::default()
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl Extractor for Broken {
        fn id(&self) -> &str {
            "broken"
        }

        fn suitable(&self, _url: &str) -> bool {
            true
        }

        async fn extract(
            &self,
            query: &Query,
            _options: &ExtractOptions,
        ) -> std::result::Result<InfoDict, ExtractError> {
            match query {
                Query::Url(url) if url == "panic" => panic!("back-end blew up"),
                Query::Url(url) if url == "empty" => Err(ExtractError::Empty),
                _ => Err(ExtractError::Process("exit status 1".to_string())),
            }
        }
    }

    fn gauge(
        id: &'static str,
        backend: &'static str,
        active: &Arc<AtomicUsize>,
        peak: &Arc<AtomicUsize>,
    ) -> Arc<dyn Extractor> {
        Arc::new(Gauge {
            id,
            backend,
            active: active.clone(),
            peak: peak.clone(),
        })
    }

    #[tokio::test]
    async fn starts_eagerly_and_answers_pings() {
        let worker = ExtractionWorker::start(1, ExtractOptions::default()).expect("worker");
        assert_eq!(worker.thread_count(), 1);
        assert!(worker.ping().await);
    }

    #[tokio::test]
    async fn failures_become_no_data_and_worker_survives() {
        let worker = ExtractionWorker::start(1, ExtractOptions::default()).expect("worker");
        let broken: Arc<dyn Extractor> = Arc::new(Broken);

        assert!(worker.extract(Query::url("panic"), broken.clone()).await.is_none());
        assert!(worker.extract(Query::url("empty"), broken.clone()).await.is_none());
        assert!(worker.extract(Query::url("other"), broken).await.is_none());

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let data = worker
            .extract(Query::url("still alive"), gauge("gauge", "gauge", &active, &peak))
            .await
            .expect("data");
        assert_eq!(data.title.as_deref(), Some("still alive"));
    }

    #[tokio::test]
    async fn same_backend_is_serialised_across_threads() {
        let worker = ExtractionWorker::start(4, ExtractOptions::default()).expect("worker");
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let video = gauge("video", "shared", &active, &peak);
        let tab = gauge("tab", "shared", &active, &peak);

        let jobs = (0..4).map(|i| {
            let extractor = if i % 2 == 0 { video.clone() } else { tab.clone() };
            worker.extract(Query::url(format!("job-{}", i)), extractor)
        });
        let results = futures::future::join_all(jobs).await;

        assert!(results.iter().all(Option::is_some));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(worker.locks().len(), 1);
    }

    #[tokio::test]
    async fn different_backends_run_in_parallel() {
        let worker = ExtractionWorker::start(2, ExtractOptions::default()).expect("worker");
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let a = gauge("a", "backend-a", &active, &peak);
        let b = gauge("b", "backend-b", &active, &peak);

        // A few rounds so both threads get to hold a job at the same time.
        for round in 0..5 {
            let (left, right) = tokio::join!(
                worker.extract(Query::url(format!("a-{}", round)), a.clone()),
                worker.extract(Query::url(format!("b-{}", round)), b.clone()),
            );
            assert!(left.is_some() && right.is_some());
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(worker.locks().len(), 2);
    }
}
