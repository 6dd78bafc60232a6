//! Progress reporting
//!
//! One `Progress` event per settled item, driven by completions rather
//! than a timer.

use super::BatchRun;
use crate::types::Event;

/// Emit a progress snapshot from the current stats
pub(crate) async fn emit(run: &BatchRun) {
    let (done, total) = {
        let stats = run.stats.lock().await;
        (stats.settled(), stats.total)
    };
    let percent = if total == 0 {
        0.0
    } else {
        f64::from(done) / f64::from(total) * 100.0
    };
    run.emit(Event::Progress {
        done,
        total,
        percent,
        elapsed: run.started.elapsed(),
    });
}
