use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

use crate::analysis::analyzer::Analyzer;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::stats::Telemetry;
use crate::core::types::FileId;
use crate::projection::Projection;
use crate::repository::FileRepository;
use crate::storage::Storage;

/// A unit of indexing work: "make the projection for this id agree with
/// its authoritative row" (spec §4.7).
#[derive(Debug, Clone, Copy)]
pub struct IndexDocument {
    pub id: FileId,
}

/// Cooperative cancellation, checked by workers at iteration boundaries
/// (spec §5). Cloning shares the same underlying flag.
#[derive(Clone, Default)]
pub struct RunToken(Arc<AtomicBool>);

impl RunToken {
    pub fn new() -> Self {
        RunToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cooperative pause, checked by workers at iteration boundaries. Unlike
/// `RunToken`, pausing never aborts in-flight work (spec §9 "Lifecycle").
#[derive(Clone, Default)]
pub struct PauseToken(Arc<AtomicBool>);

impl PauseToken {
    pub fn new() -> Self {
        PauseToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drains a bounded queue of `IndexDocument` with up to `max_parallelism`
/// worker threads, each leasing its own connection from `storage` (spec
/// §4.7). Workers are plain OS threads coordinated with a
/// `crossbeam::channel`, mirroring the teacher's `ParallelWriter`
/// worker-pool shape rather than an async task pool.
pub struct IndexingCoordinator {
    sender: Sender<IndexDocument>,
    run_token: RunToken,
    pause_token: PauseToken,
    target_schema_version: Arc<AtomicU32>,
    schema_upgrade_barrier: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl IndexingCoordinator {
    pub fn start(storage: Storage, analyzer: Arc<Analyzer>, config: &Config, telemetry: Arc<Telemetry>) -> Self {
        let (sender, receiver) = bounded::<IndexDocument>(1024);
        let run_token = RunToken::new();
        let pause_token = PauseToken::new();
        let target_schema_version = Arc::new(AtomicU32::new(0));
        let schema_upgrade_barrier = Arc::new(AtomicBool::new(false));

        let workers = (0..config.max_parallelism.max(1))
            .map(|_| {
                spawn_worker(
                    receiver.clone(),
                    storage.clone(),
                    analyzer.clone(),
                    run_token.clone(),
                    pause_token.clone(),
                    target_schema_version.clone(),
                    telemetry.clone(),
                )
            })
            .collect();

        IndexingCoordinator {
            sender,
            run_token,
            pause_token,
            target_schema_version,
            schema_upgrade_barrier,
            workers,
        }
    }

    /// Enqueues a document for (re)indexing. Rejects new work with
    /// `SchemaUnavailable` while a schema upgrade barrier is active and
    /// the coordinator hasn't drained the backlog below the new target
    /// version yet — callers doing reindex work during an upgrade should
    /// call `enqueue_during_upgrade` instead.
    pub fn enqueue(&self, doc: IndexDocument) -> Result<()> {
        if self.schema_upgrade_barrier.load(Ordering::SeqCst) {
            return Err(Error::schema_unavailable(
                "schema upgrade in progress; new writes are barriered until backlog drains",
            ));
        }
        self.enqueue_during_upgrade(doc)
    }

    /// Enqueues unconditionally, bypassing the upgrade barrier. Used by
    /// the upgrade driver itself to push the backlog of below-target-version
    /// documents, and by the integrity auditor's `repair()`.
    pub fn enqueue_during_upgrade(&self, doc: IndexDocument) -> Result<()> {
        match self.sender.try_send(doc) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::new(
                crate::core::error::ErrorKind::Transient,
                "indexing queue is full",
            )),
            Err(TrySendError::Disconnected(_)) => Err(Error::new(
                crate::core::error::ErrorKind::Fatal,
                "indexing coordinator workers have all exited",
            )),
        }
    }

    /// Raises the schema-version target and activates the upgrade
    /// barrier; `enqueue` rejects new-document work until
    /// `complete_schema_upgrade` is called once the backlog has drained.
    pub fn begin_schema_upgrade(&self, new_version: u32) {
        self.target_schema_version.store(new_version, Ordering::SeqCst);
        self.schema_upgrade_barrier.store(true, Ordering::SeqCst);
    }

    pub fn complete_schema_upgrade(&self) {
        self.schema_upgrade_barrier.store(false, Ordering::SeqCst);
    }

    pub fn is_upgrade_barrier_active(&self) -> bool {
        self.schema_upgrade_barrier.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.pause_token.pause();
    }

    pub fn resume(&self) {
        self.pause_token.resume();
    }

    pub fn pause_token(&self) -> PauseToken {
        self.pause_token.clone()
    }

    pub fn run_token(&self) -> RunToken {
        self.run_token.clone()
    }

    /// Cancels the run token and blocks until every worker thread exits.
    pub fn shutdown(mut self) {
        self.run_token.cancel();
        drop(self.sender);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn spawn_worker(
    receiver: Receiver<IndexDocument>,
    storage: Storage,
    analyzer: Arc<Analyzer>,
    run_token: RunToken,
    pause_token: PauseToken,
    target_schema_version: Arc<AtomicU32>,
    telemetry: Arc<Telemetry>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while !run_token.is_cancelled() {
            if pause_token.is_paused() {
                thread::sleep(std::time::Duration::from_millis(50));
                continue;
            }

            let doc = match receiver.recv_timeout(std::time::Duration::from_millis(200)) {
                Ok(doc) => doc,
                Err(crossbeam::channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam::channel::RecvTimeoutError::Disconnected) => break,
            };

            if let Err(err) = process_one(&storage, &analyzer, target_schema_version.load(Ordering::SeqCst), doc) {
                tracing::warn!(file_id = %doc.id, error = %err, "indexing worker failed to process document");
            }
        }
        telemetry.set_write_ahead_depth(0);
    })
}

fn process_one(storage: &Storage, analyzer: &Analyzer, schema_version: u32, doc: IndexDocument) -> Result<()> {
    let conn = storage.lease()?;
    let file = FileRepository::get(&conn, doc.id)?;

    if !file.search_index_state.is_stale && !Projection::needs_reindex(&file, schema_version, analyzer) {
        return Ok(());
    }

    match Projection::upsert(&conn, &file, analyzer, schema_version) {
        Ok(_) => Ok(()),
        Err(err) if err.kind == crate::core::error::ErrorKind::ConcurrencyDrift => {
            Projection::force_replace(&conn, &file, analyzer, schema_version).map(|_| ())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{AnalyzerProfileConfig, Config};
    use crate::core::types::{File, FileSystemMetadata, FileValidity, SearchIndexState};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::time::Duration;

    fn sample_file(name: &str, content_hash: &str) -> File {
        let now = Utc::now();
        File {
            id: FileId::new(),
            name: name.to_string(),
            extension: "docx".to_string(),
            mime: "application/vnd.openxmlformats".to_string(),
            author: "alice".to_string(),
            size_bytes: 2048,
            content_hash: content_hash.to_string(),
            created_utc: now,
            modified_utc: now,
            is_read_only: false,
            validity: FileValidity::default(),
            fs_metadata: FileSystemMetadata::default(),
            extended_metadata: HashMap::new(),
            search_index_state: SearchIndexState::default(),
        }
    }

    #[test]
    fn enqueued_document_gets_indexed() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.lease().unwrap();
        let file = sample_file("Report.docx", "hash-coord-1");
        FileRepository::insert(&conn, &file).unwrap();
        drop(conn);

        let analyzer = Arc::new(Analyzer::from_profile(&AnalyzerProfileConfig::cs_default()));
        let mut config = Config::default();
        config.max_parallelism = 2;
        let telemetry = Arc::new(Telemetry::new());

        let coordinator = IndexingCoordinator::start(storage.clone(), analyzer, &config, telemetry);
        coordinator.enqueue(IndexDocument { id: file.id }).unwrap();

        let mut indexed = false;
        for _ in 0..50 {
            thread::sleep(Duration::from_millis(20));
            let conn = storage.lease().unwrap();
            let reloaded = FileRepository::get(&conn, file.id).unwrap();
            if !reloaded.search_index_state.is_stale {
                indexed = true;
                break;
            }
        }
        assert!(indexed, "document was not indexed within the timeout");
        coordinator.shutdown();
    }

    #[test]
    fn enqueue_is_rejected_during_schema_upgrade_barrier() {
        let storage = Storage::open_in_memory().unwrap();
        let analyzer = Arc::new(Analyzer::from_profile(&AnalyzerProfileConfig::cs_default()));
        let config = Config::default();
        let telemetry = Arc::new(Telemetry::new());

        let coordinator = IndexingCoordinator::start(storage, analyzer, &config, telemetry);
        coordinator.begin_schema_upgrade(2);
        assert!(coordinator.is_upgrade_barrier_active());

        let err = coordinator.enqueue(IndexDocument { id: FileId::new() }).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::SchemaUnavailable);

        coordinator
            .enqueue_during_upgrade(IndexDocument { id: FileId::new() })
            .unwrap();

        coordinator.complete_schema_upgrade();
        assert!(!coordinator.is_upgrade_barrier_active());
        coordinator.shutdown();
    }
}
