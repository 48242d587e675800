//! Per-file completion tracking.
//!
//! A [`Completion`] counts outstanding work items. Each item holds a
//! [`Ticket`]; dropping the ticket releases it exactly once, whichever
//! path the item took (indexed, rejected by the store, failed to encode,
//! discarded on shutdown).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    pending: AtomicUsize,
    drained: Notify,
}

#[derive(Debug, Clone, Default)]
pub struct Completion {
    inner: Arc<Inner>,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more outstanding item.
    pub fn ticket(&self) -> Ticket {
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        Ticket {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Resolve once no tickets are outstanding.
    ///
    /// Only meaningful after every item has been handed a ticket; a
    /// ticket issued after `wait` returns is not waited for.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Outstanding work item; released on drop.
#[derive(Debug)]
pub struct Ticket {
    inner: Arc<Inner>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.inner.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_without_tickets_returns() {
        Completion::new().wait().await;
    }

    #[tokio::test]
    async fn test_wait_drains_after_last_ticket() {
        let completion = Completion::new();
        let tickets: Vec<_> = (0..50).map(|_| completion.ticket()).collect();
        assert_eq!(completion.pending(), 50);

        for (i, ticket) in tickets.into_iter().enumerate() {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis((i % 7) as u64)).await;
                drop(ticket);
            });
        }

        tokio::time::timeout(Duration::from_secs(5), completion.wait())
            .await
            .unwrap();
        assert_eq!(completion.pending(), 0);
    }

    #[tokio::test]
    async fn test_wait_blocks_while_pending() {
        let completion = Completion::new();
        let ticket = completion.ticket();

        let waited = tokio::time::timeout(Duration::from_millis(50), completion.wait()).await;
        assert!(waited.is_err());

        drop(ticket);
        completion.wait().await;
    }
}
