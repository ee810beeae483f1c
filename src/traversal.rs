use crate::pagination::{self, PaginationState};
use crate::storage::{self, Store};
use scraper::Html;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// What the caller should do after one traversal step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Navigate the browsing context to this href; the next invocation runs
    /// in the freshly loaded page
    Navigate {
        /// Destination of the next pagination entry
        href: String,
    },
    /// The entry list is exhausted (or the next entry has no destination);
    /// the active-run flag has been cleared
    Done,
    /// No pagination was ever captured for this origin
    NoPagination,
}

/// Stateless page-to-page traversal.
///
/// Every invocation corresponds to a fresh process instance after a full
/// navigation: nothing is carried in memory, everything is rehydrated from
/// the store. The only ordering guarantee that matters is persist-then-
/// navigate - the checkpoint for the next page is written before the extract
/// callback runs and before the caller is handed the href.
#[derive(Debug, Clone)]
pub struct Traversal {
    /// Fixed delay to let the freshly loaded page finish rendering before
    /// extracting. Heuristic; there is no load-complete signal to consult.
    pub settle_delay: Duration,
}

impl Default for Traversal {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(10),
        }
    }
}

impl Traversal {
    /// Create a traversal with a custom settle delay
    pub fn with_settle_delay(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    /// Runs one traversal step against the current page.
    ///
    /// Rebuilds the pagination entries from the persisted container path,
    /// locates the checkpoint among them (falling back to the first entry
    /// when it is missing or stale), and advances one entry. If the list is
    /// exhausted the run flag is cleared and `Step::Done` is returned without
    /// invoking the callback. Otherwise the new checkpoint is persisted
    /// first, then after the settle delay the `extract` callback is invoked
    /// to append the current page's records, and the next href is returned.
    pub async fn advance<F, Fut>(
        &self,
        doc: &Html,
        store: &dyn Store,
        origin: &str,
        extract: F,
    ) -> Step
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut state = PaginationState::load(store, origin).await;
        let Some(container_path) = state.container_path.clone() else {
            ::log::warn!("No pagination captured for {}", origin);
            return Step::NoPagination;
        };

        let Some(model) = pagination::rebuild(doc, &container_path) else {
            ::log::warn!(
                "Pagination container '{}' not found on the current page",
                container_path
            );
            return Step::NoPagination;
        };

        let current = state
            .checkpoint
            .as_deref()
            .and_then(|label| model.entries.iter().position(|e| e.label == label))
            .unwrap_or(0);
        let next = current + 1;

        if next >= model.entries.len() {
            ::log::info!(
                "Traversal done for {}: {} entries visited",
                origin,
                model.entries.len()
            );
            store
                .set(
                    &storage::scraping_key(origin),
                    Value::String(storage::RUN_INACTIVE.to_string()),
                )
                .await;
            return Step::Done;
        }

        let entry = model.entries[next].clone();
        // Persist before anything can navigate away, so a reload of the next
        // page is never re-counted.
        state.checkpoint = Some(entry.label.clone());
        state.save(store, origin).await;

        tokio::time::sleep(self.settle_delay).await;
        extract().await;

        match entry.href {
            Some(href) => Step::Navigate { href },
            None => {
                ::log::warn!("Pagination entry '{}' has no destination", entry.label);
                store
                    .set(
                        &storage::scraping_key(origin),
                        Value::String(storage::RUN_INACTIVE.to_string()),
                    )
                    .await;
                Step::Done
            }
        }
    }
}
