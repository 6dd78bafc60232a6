//! Concurrent batch download-upload pipeline
//!
//! [`BatchPipeline`] owns a run end to end: it seeds the pending queue
//! from parsed input, races a bounded pool of download workers over it,
//! and feeds an upload sequencer that sends finished items in strict
//! original order. Item failures never abort a batch; only input parsing
//! or an escaped panic does.

mod progress;
mod sequencer;
mod worker;


use crate::config::{BatchRequest, Config};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::input::{check_start_index, parse_batch_lines};
use crate::mirror::LogMirror;
use crate::store::Store;
use crate::transform::UrlTransformer;
use crate::types::{
    BatchStats, BatchSummary, DownloadItem, Event, ItemIndex,
};
use crate::upload::{ChatTarget, Notifier, Uploader};
use crate::utils::derive_display_name;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, Mutex};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Message from workers to the sequencer
#[derive(Clone, Copy, Debug)]
pub(crate) enum SequencerSignal {
    /// An item reached a terminal download state (success or failure)
    Settled(ItemIndex),
    /// All workers have exited; drain the backlog and stop
    Flush,
}

/// Shared state for one batch run
pub(crate) struct BatchRun {
    pub(crate) config: Config,
    pub(crate) request: BatchRequest,
    pub(crate) transformer: UrlTransformer,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) uploader: Arc<dyn Uploader>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) mirror: Option<Arc<LogMirror>>,
    pub(crate) store: Option<Store>,
    pub(crate) target: ChatTarget,
    /// FIFO of items not yet picked up by a worker
    pub(crate) pending: Mutex<VecDeque<DownloadItem>>,
    /// Downloaded items parked until their turn to upload, by index
    pub(crate) completed: Mutex<HashMap<u32, DownloadItem>>,
    pub(crate) settled_tx: mpsc::UnboundedSender<SequencerSignal>,
    pub(crate) stats: Mutex<BatchStats>,
    pub(crate) events: broadcast::Sender<Event>,
    pub(crate) started: Instant,
}

impl BatchRun {
    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// The batch pipeline with its injected collaborators
pub struct BatchPipeline {
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    uploader: Arc<dyn Uploader>,
    notifier: Arc<dyn Notifier>,
    mirror: Option<Arc<LogMirror>>,
    store: Option<Store>,
    target: ChatTarget,
    events: broadcast::Sender<Event>,
}

impl BatchPipeline {
    /// Build a pipeline sending uploads to `target`
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        uploader: Arc<dyn Uploader>,
        notifier: Arc<dyn Notifier>,
        target: ChatTarget,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            fetcher,
            uploader,
            notifier,
            mirror: None,
            store: None,
            target,
            events,
        }
    }

    /// Attach a log-channel mirror
    pub fn with_mirror(mut self, mirror: Arc<LogMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Attach a persistence store for per-item history
    pub fn with_store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Run one batch to completion
    ///
    /// Parses `lines`, processes every item from `request.start_index` to
    /// the end of the list, and returns the final summary. Per-item
    /// failures are reflected in the stats, not in the result.
    pub async fn run_batch(&self, lines: &str, request: &BatchRequest) -> Result<BatchSummary> {
        request.validate()?;
        let (entries, census) = parse_batch_lines(lines)?;
        check_start_index(request.start_index, entries.len())?;

        tracing::info!(
            batch = %request.batch_name,
            total_links = census.total(),
            pdf = census.pdf,
            image = census.image,
            zip = census.zip,
            start_index = request.start_index,
            "starting batch"
        );

        let mut pending = VecDeque::new();
        for (i, raw) in entries.into_iter().enumerate() {
            let index = i as u32 + 1;
            if index < request.start_index {
                continue;
            }
            let display_name = derive_display_name(&raw.label, index);
            pending.push_back(DownloadItem::new(ItemIndex::new(index), raw, display_name));
        }
        let total = pending.len() as u32;

        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let run = Arc::new(BatchRun {
            transformer: UrlTransformer::new(&self.config),
            config: self.config.clone(),
            request: request.clone(),
            fetcher: self.fetcher.clone(),
            uploader: self.uploader.clone(),
            notifier: self.notifier.clone(),
            mirror: self.mirror.clone(),
            store: self.store.clone(),
            target: self.target,
            pending: Mutex::new(pending),
            completed: Mutex::new(HashMap::new()),
            settled_tx,
            stats: Mutex::new(BatchStats {
                total,
                ..Default::default()
            }),
            events: self.events.clone(),
            started: Instant::now(),
        });

        let worker_count = self
            .config
            .max_concurrent_downloads()
            .min(total as usize)
            .max(1);
        let workers: Vec<_> = (0..worker_count)
            .map(|id| tokio::spawn(worker::run(run.clone(), id)))
            .collect();
        let sequencer = tokio::spawn(sequencer::run(
            run.clone(),
            settled_rx,
            request.start_index,
        ));

        for joined in futures::future::join_all(workers).await {
            joined.map_err(|e| Error::Other(format!("download worker panicked: {e}")))?;
        }
        // All workers are done; let the sequencer drain what remains
        let _ = run.settled_tx.send(SequencerSignal::Flush);
        sequencer
            .await
            .map_err(|e| Error::Other(format!("upload sequencer panicked: {e}")))?;

        let stats = run.stats.lock().await.clone();
        let summary = BatchSummary {
            batch_name: request.batch_name.clone(),
            stats,
            elapsed: run.started.elapsed(),
            completed_at: chrono::Utc::now(),
        };

        tracing::info!(
            batch = %summary.batch_name,
            total = summary.stats.total,
            downloaded = summary.stats.downloaded,
            uploaded = summary.stats.uploaded,
            failed = summary.stats.failed,
            success_percent = format!("{:.1}", summary.success_percent()),
            "batch completed"
        );

        if let Some(mirror) = &run.mirror {
            mirror.mirror_batch_summary(&summary).await;
        }
        run.emit(Event::BatchCompleted(summary.clone()));

        Ok(summary)
    }
}
