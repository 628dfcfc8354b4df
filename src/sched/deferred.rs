//! Fire-and-forget deferred actions.
//!
//! Deferrals ride on the tokio timer and are lost on restart. A chat message
//! that outlives its delete timer by one process restart is acceptable; a
//! durable job queue is not worth the moving parts here.

use crate::transport::ChatTransport;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Run `action` after `delay`. Failures are logged at debug and dropped —
/// the target may legitimately be gone by the time the timer fires.
pub fn defer<F>(delay: Duration, action: F)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = action.await {
            debug!("Deferred action failed: {e:#}");
        }
    });
}

/// Schedule a chat message for deletion. `secs == 0` disables deferred
/// cleanup for the tenant and is a no-op.
pub fn delete_after(transport: Arc<dyn ChatTransport>, chat_id: String, message_id: String, secs: u64) {
    if secs == 0 {
        return;
    }
    defer(Duration::from_secs(secs), async move {
        transport.delete_message(&chat_id, &message_id).await
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn defer_runs_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        defer(Duration::from_secs(30), async move {
            fired2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_swallowed() {
        defer(Duration::from_secs(1), async move {
            Err(anyhow::anyhow!("target already gone"))
        });
        tokio::time::sleep(Duration::from_secs(2)).await;
        // nothing to assert beyond "did not panic the runtime"
    }
}
