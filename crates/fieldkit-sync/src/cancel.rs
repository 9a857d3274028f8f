//! Cancellation via `watch::Receiver<bool>`

use std::future::Future;

use tokio::sync::watch;

/// Resolves once `cancel` reads `true`; never resolves if the sender is gone
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Run `fut` unless `cancel` fires first
pub(crate) async fn unless_cancelled<F: Future>(
    cancel: &mut watch::Receiver<bool>,
    fut: F,
) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancelled(cancel) => None,
        output = fut => Some(output),
    }
}
