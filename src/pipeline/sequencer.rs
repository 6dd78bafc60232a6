//! Ordered upload sequencer
//!
//! Uploads downloaded items in strictly ascending index order, however
//! far out of order downloads finish. Settled indices accumulate in a
//! set; whenever `next_expected` is settled the sequencer consumes it,
//! uploading if an artifact is parked for it and skipping if the
//! download failed. No re-queue spinning is involved.

use super::{BatchRun, SequencerSignal};
use crate::types::{DownloadItem, Event, ItemState};
use crate::upload::{build_caption, payload_for};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sequencer loop: consume settled indices until flushed, in order
pub(crate) async fn run(
    run: Arc<BatchRun>,
    mut rx: mpsc::UnboundedReceiver<SequencerSignal>,
    start_index: u32,
) {
    let mut next_expected = start_index;
    let mut settled: BTreeSet<u32> = BTreeSet::new();

    loop {
        match rx.recv().await {
            Some(SequencerSignal::Settled(index)) => {
                settled.insert(index.get());
                drain_in_order(&run, &mut next_expected, &mut settled).await;
            }
            Some(SequencerSignal::Flush) | None => break,
        }
    }

    // Workers are done; whatever settled while we were uploading is final
    while let Ok(signal) = rx.try_recv() {
        if let SequencerSignal::Settled(index) = signal {
            settled.insert(index.get());
        }
    }
    drain_in_order(&run, &mut next_expected, &mut settled).await;
    tracing::debug!(next_expected, "sequencer finished");
}

/// Consume every settled index from `next_expected` upward
async fn drain_in_order(
    run: &Arc<BatchRun>,
    next_expected: &mut u32,
    settled: &mut BTreeSet<u32>,
) {
    while settled.remove(next_expected) {
        let parked = run.completed.lock().await.remove(next_expected);
        if let Some(item) = parked {
            upload_item(run, item).await;
        }
        // A settled index with no parked artifact failed downloading
        *next_expected += 1;
    }
}

/// Upload one item, clean up its artifact, and mirror the send
async fn upload_item(run: &Arc<BatchRun>, mut item: DownloadItem) {
    let index = item.index;
    item.state = ItemState::Uploading;

    let payload = match payload_for(&item, &run.request) {
        Ok(payload) => payload,
        Err(e) => {
            upload_failed(run, item, e.to_string()).await;
            return;
        }
    };
    let caption = build_caption(&item, &run.request);

    match run.uploader.upload(run.target, payload, &caption).await {
        Ok(handle) => {
            if let Some(path) = &item.local_path {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    tracing::warn!(index = index.get(), path = %path.display(), error = %e, "artifact cleanup failed");
                }
            }
            item.state = ItemState::Uploaded;
            {
                let mut stats = run.stats.lock().await;
                stats.uploaded += 1;
            }
            run.emit(Event::ItemUploaded { index });
            tracing::info!(index = index.get(), name = %item.display_name, "item uploaded");

            if let Some(mirror) = &run.mirror {
                mirror.mirror_upload(handle, &item, &run.request).await;
            }
            if let Some(store) = &run.store {
                if let Err(e) = store.record_item(&run.request.batch_name, &item).await {
                    tracing::warn!(index = index.get(), error = %e, "history write failed");
                }
            }
        }
        Err(e) => {
            upload_failed(run, item, e.to_string()).await;
        }
    }
}

/// Mark an upload rejection; uploads are never retried
async fn upload_failed(run: &Arc<BatchRun>, mut item: DownloadItem, error: String) {
    let index = item.index;
    item.state = ItemState::UploadFailed;
    item.last_error = Some(error.clone());

    run.emit(Event::ItemUploadFailed {
        index,
        error: error.clone(),
    });
    tracing::warn!(index = index.get(), name = %item.display_name, error = %error, "upload failed");

    run.notifier
        .notify(&format!(
            "Upload failed: {:03} {}\nReason: {}",
            index.get(),
            item.display_name,
            error,
        ))
        .await;

    if let Some(store) = &run.store {
        if let Err(e) = store.record_item(&run.request.batch_name, &item).await {
            tracing::warn!(index = index.get(), error = %e, "history write failed");
        }
    }
}
