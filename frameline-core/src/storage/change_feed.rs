//! Per-document change notifications

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

use super::{DocPath, DocumentChange};

const CHANNEL_CAPACITY: usize = 64;

/// Broadcast channels keyed by document path
///
/// Channels are created on first subscription and dropped once the last
/// receiver is gone.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    channels: DashMap<DocPath, broadcast::Sender<DocumentChange>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, path: &DocPath) -> broadcast::Receiver<DocumentChange> {
        self.channels
            .entry(path.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver committed changes to current watchers
    pub fn publish(&self, changes: &[DocumentChange]) {
        for change in changes {
            let stale = match self.channels.get(&change.path) {
                Some(sender) => {
                    trace!("Publishing change for {}", change.path);
                    sender.send(change.clone()).is_err()
                }
                None => false,
            };

            if stale {
                self.channels
                    .remove_if(&change.path, |_, sender| sender.receiver_count() == 0);
            }
        }
    }

    /// Paths with at least one live watcher
    pub fn watched_paths(&self) -> usize {
        self.channels
            .iter()
            .filter(|entry| entry.value().receiver_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(p: &str) -> DocumentChange {
        DocumentChange {
            path: DocPath::parse(p).unwrap(),
            document: None,
        }
    }

    #[tokio::test]
    async fn test_only_matching_path_is_delivered() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe(&DocPath::parse("a/1").unwrap());

        feed.publish(&[change("a/2"), change("a/1")]);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.path.as_str(), "a/1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_channel_dropped_without_receivers() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe(&DocPath::parse("a/1").unwrap());
        assert_eq!(feed.watched_paths(), 1);

        drop(rx);
        feed.publish(&[change("a/1")]);
        assert_eq!(feed.watched_paths(), 0);
        assert!(feed.channels.is_empty());
    }
}
