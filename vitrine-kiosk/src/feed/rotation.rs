//! Headline rotation for a dynamic slot
//!
//! Rotates on its own timer, independent of how long the slot lasts. The
//! rotation task stops when the [`FeedRotation`] is dropped.

use super::provider::fallback_items;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vitrine_common::models::NewsItem;

pub struct FeedRotation {
    current: watch::Receiver<NewsItem>,
    task: Option<JoinHandle<()>>,
    len: usize,
}

impl FeedRotation {
    /// Start rotating through `items`; an empty list rotates the fallback
    pub fn start(items: Vec<NewsItem>, interval: Duration) -> Self {
        let items = if items.is_empty() { fallback_items() } else { items };
        let len = items.len();
        let (tx, current) = watch::channel(items[0].clone());

        let task = (len > 1).then(|| {
            tokio::spawn(async move {
                let mut position = 0;
                loop {
                    tokio::time::sleep(interval).await;
                    position = (position + 1) % items.len();
                    if tx.send(items[position].clone()).is_err() {
                        break;
                    }
                }
            })
        });

        Self { current, task, len }
    }

    /// Headline on screen right now
    pub fn current(&self) -> NewsItem {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NewsItem> {
        self.current.clone()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for FeedRotation {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rotates_and_wraps() {
        let items = vec![NewsItem::headline("one"), NewsItem::headline("two")];
        let rotation = FeedRotation::start(items, Duration::from_millis(10));
        let mut rx = rotation.subscribe();
        assert_eq!(rotation.current().title, "one");

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().title, "two");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().title, "one");
    }

    #[tokio::test]
    async fn test_empty_list_uses_fallback() {
        let rotation = FeedRotation::start(Vec::new(), Duration::from_secs(3));
        assert_eq!(rotation.len(), fallback_items().len());
        assert_eq!(rotation.current(), fallback_items()[0]);
    }
}
