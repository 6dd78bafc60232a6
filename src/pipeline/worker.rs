//! Download workers
//!
//! Workers race to drain the shared pending queue. Each popped item is
//! transformed, planned, fetched through the retry wrapper, and handed
//! to the sequencer as settled, whether it succeeded or failed.

use super::{BatchRun, SequencerSignal};
use crate::error::FetchError;
use crate::retry::fetch_with_retry;
use crate::strategy::{select_strategy, FetchStrategy};
use crate::transform::classify;
use crate::types::{DownloadItem, Event, ItemState};
use std::sync::Arc;

/// Worker loop: pop items until the queue is empty
pub(crate) async fn run(run: Arc<BatchRun>, worker_id: usize) {
    loop {
        let item = run.pending.lock().await.pop_front();
        let Some(item) = item else {
            tracing::debug!(worker_id, "queue empty, worker exiting");
            break;
        };
        process_item(&run, item, worker_id).await;
    }
}

async fn process_item(run: &Arc<BatchRun>, mut item: DownloadItem, worker_id: usize) {
    let index = item.index;
    item.state = ItemState::Downloading;
    item.source = classify(&item.raw.https_url());
    {
        let mut stats = run.stats.lock().await;
        stats.active_downloads += 1;
        *stats.by_source.entry(item.source).or_insert(0) += 1;
    }
    run.emit(Event::ItemStarted {
        index,
        name: item.display_name.clone(),
    });
    tracing::info!(worker_id, index = index.get(), name = %item.display_name, "item started");

    match run
        .transformer
        .transform(&item.raw.https_url(), &run.request)
        .await
    {
        Ok(url) => item.resolved_url = url,
        Err(e) => {
            fail_item(run, item, e.to_string()).await;
            return;
        }
    }

    let plan = select_strategy(
        &item.resolved_url,
        &item.display_name,
        &run.request,
        &run.config,
    );
    item.content = plan.content;
    {
        let mut stats = run.stats.lock().await;
        *stats.by_content.entry(item.content).or_insert(0) += 1;
    }

    // Zip items carry the URL itself as payload; nothing to fetch
    if plan.strategy == FetchStrategy::ZipLink {
        complete_item(run, item, None, 0).await;
        return;
    }

    let outcome = fetch_with_retry(&run.config.retry, |attempt| {
        let fetcher = run.fetcher.clone();
        let plan = plan.clone();
        async move {
            tracing::debug!(index = index.get(), attempt, "fetch attempt");
            fetcher.fetch(&plan).await
        }
    })
    .await;

    match outcome {
        Ok(outcome) => {
            complete_item(run, item, Some(outcome.value), outcome.retries).await;
        }
        Err(exhausted) => {
            let error = FetchError::RetriesExhausted {
                attempts: exhausted.attempts,
                last_error: exhausted.last_error.to_string(),
            };
            fail_item(run, item, error.to_string()).await;
        }
    }
}

/// Record a successful download and hand the item to the sequencer
async fn complete_item(
    run: &Arc<BatchRun>,
    mut item: DownloadItem,
    local_path: Option<std::path::PathBuf>,
    retries: u32,
) {
    let index = item.index;
    item.local_path = local_path;
    item.retry_count = retries;
    item.state = ItemState::Downloaded;

    {
        let mut stats = run.stats.lock().await;
        stats.downloaded += 1;
        stats.active_downloads -= 1;
    }
    run.completed.lock().await.insert(index.get(), item);

    run.emit(Event::ItemDownloaded { index, retries });
    super::progress::emit(run).await;
    tracing::info!(index = index.get(), retries, "item downloaded");

    let _ = run.settled_tx.send(SequencerSignal::Settled(index));
}

/// Record a permanent failure, notify the surface, and settle the index
async fn fail_item(run: &Arc<BatchRun>, mut item: DownloadItem, error: String) {
    let index = item.index;
    item.state = ItemState::Failed;
    item.last_error = Some(error.clone());

    {
        let mut stats = run.stats.lock().await;
        stats.failed += 1;
        stats.active_downloads -= 1;
    }

    run.emit(Event::ItemFailed {
        index,
        error: error.clone(),
    });
    super::progress::emit(run).await;
    tracing::warn!(index = index.get(), name = %item.display_name, error = %error, "item failed");

    run.notifier
        .notify(&format!(
            "Download failed: {:03} {}\nUrl: {}\nReason: {}",
            index.get(),
            item.display_name,
            item.original_url(),
            error,
        ))
        .await;

    if let Some(store) = &run.store {
        if let Err(e) = store.record_item(&run.request.batch_name, &item).await {
            tracing::warn!(index = index.get(), error = %e, "history write failed");
        }
    }

    let _ = run.settled_tx.send(SequencerSignal::Settled(index));
}
