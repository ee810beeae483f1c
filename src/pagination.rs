use crate::locator;
use crate::storage::{self, Store};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn numeric_label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]+$").expect("valid label pattern"))
}

/// One entry of a pagination control: where it leads and the page number
/// it is labelled with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    /// Destination of the entry's anchor, if it has one
    pub href: Option<String>,
    /// Page label; always a plain non-negative integer string once admitted
    pub label: String,
}

/// A detected pagination control.
///
/// Only the container path is persisted; the entries are rebuilt from the
/// live tree on every page load.
#[derive(Debug, Clone)]
pub struct PaginationModel {
    /// Locator path of the container the entries were extracted from
    pub container_path: String,
    /// Admitted page entries in document order
    pub entries: Vec<PageEntry>,
}

/// The pagination facts that survive a navigation: the container path and
/// the label of the last page the traversal visited
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginationState {
    /// Locator path of the captured container, if pagination was captured
    pub container_path: Option<String>,
    /// Traversal checkpoint: label of the last visited entry
    pub checkpoint: Option<String>,
}

impl PaginationState {
    /// Load the state persisted for an origin, or an empty one
    pub async fn load(store: &dyn Store, origin: &str) -> Self {
        match store.get(&storage::pagination_key(origin)).await {
            Some(value) => match serde_json::from_value(value) {
                Ok(state) => state,
                Err(e) => {
                    ::log::error!("Ignoring unreadable saved pagination for {}: {}", origin, e);
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }

    /// Persist the state for an origin
    pub async fn save(&self, store: &dyn Store, origin: &str) {
        match serde_json::to_value(self) {
            Ok(value) => store.set(&storage::pagination_key(origin), value).await,
            Err(e) => ::log::error!("Failed to serialize pagination for {}: {}", origin, e),
        }
    }

    /// Drop the captured container and checkpoint
    pub fn reset(&mut self) {
        self.container_path = None;
        self.checkpoint = None;
    }
}

fn anchor_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("a").unwrap())
}

fn count_anchors(el: ElementRef) -> usize {
    el.select(anchor_selector()).count()
}

fn collapsed_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Drops entries whose label is not a plain page number ("Next", "Prev", "…")
fn admit_numeric(entries: Vec<PageEntry>) -> Vec<PageEntry> {
    entries
        .into_iter()
        .filter(|entry| numeric_label_pattern().is_match(&entry.label))
        .collect()
}

/// One entry per list item: href from the nearest descendant anchor, label
/// from the item text
fn entries_from_list(list: ElementRef) -> Vec<PageEntry> {
    let item_selector = Selector::parse("li").unwrap();
    let entries = list
        .select(&item_selector)
        .map(|item| PageEntry {
            href: item
                .select(anchor_selector())
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::to_string),
            label: collapsed_text(item),
        })
        .collect();
    admit_numeric(entries)
}

/// One entry per anchor, for containers that are a flat anchor group
fn entries_from_anchors(container: ElementRef) -> Vec<PageEntry> {
    let entries = container
        .select(anchor_selector())
        .map(|a| PageEntry {
            href: a.value().attr("href").map(str::to_string),
            label: collapsed_text(a),
        })
        .collect();
    admit_numeric(entries)
}

/// Finds the page-list element for a clicked node: a descendant ul, then a
/// descendant ol, then the nearest ul ancestor (the node itself included).
/// A list only qualifies when it holds more than one anchor.
fn find_list(el: ElementRef) -> Option<ElementRef> {
    let ul = Selector::parse("ul").unwrap();
    let ol = Selector::parse("ol").unwrap();

    let candidate = el
        .select(&ul)
        .next()
        .or_else(|| el.select(&ol).next())
        .or_else(|| {
            let mut current = Some(el);
            while let Some(node) = current {
                if node.value().name() == "ul" {
                    return Some(node);
                }
                current = node.parent().and_then(ElementRef::wrap);
            }
            None
        })?;

    (count_anchors(candidate) > 1).then_some(candidate)
}

/// Detects a pagination control around a clicked element.
///
/// Prefers a qualifying list; falls back to treating the element itself as a
/// flat collection of anchors when it holds more than one. Returns None when
/// no usable container is found or every entry is filtered out.
pub fn detect(el: ElementRef) -> Option<PaginationModel> {
    let (container, entries) = match find_list(el) {
        Some(list) => (list, entries_from_list(list)),
        None if count_anchors(el) > 1 => (el, entries_from_anchors(el)),
        None => return None,
    };

    if entries.is_empty() {
        return None;
    }
    Some(PaginationModel {
        container_path: locator::resolve(container),
        entries,
    })
}

/// Rebuilds the entry list from a persisted container path against the live
/// tree. The detection rules are re-applied to the already-known container.
pub fn rebuild(doc: &Html, container_path: &str) -> Option<PaginationModel> {
    let container = locator::apply(doc, container_path).into_iter().next()?;
    detect(container)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first<'a>(doc: &'a Html, selector: &str) -> ElementRef<'a> {
        let sel = Selector::parse(selector).unwrap();
        doc.select(&sel).next().unwrap()
    }

    const PAGED: &str = r#"<html><body>
        <div id="wrap">
          <ul class="pager">
            <li><a href="/page/1">1</a></li>
            <li><a href="/page/2">2</a></li>
            <li><a href="/page/next">Next</a></li>
            <li><a href="/page/3">3</a></li>
          </ul>
        </div>
    </body></html>"#;

    #[test]
    fn test_non_numeric_labels_are_filtered() {
        let doc = Html::parse_document(PAGED);
        let model = detect(first(&doc, "#wrap")).unwrap();
        let labels: Vec<&str> = model.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["1", "2", "3"]);
        assert_eq!(model.entries[1].href.as_deref(), Some("/page/2"));
    }

    #[test]
    fn test_click_inside_list_walks_up_to_it() {
        let doc = Html::parse_document(PAGED);
        let model = detect(first(&doc, "li a")).unwrap();
        assert_eq!(model.container_path, "body > #wrap > .pager");
        assert_eq!(model.entries.len(), 3);
    }

    #[test]
    fn test_flat_anchor_group_fallback() {
        let doc = Html::parse_document(
            r#"<html><body>
                <div class="pages">
                  <a href="/p/1">1</a>
                  <a href="/p/2">2</a>
                  <a href="/p/all">All</a>
                </div>
            </body></html>"#,
        );
        let model = detect(first(&doc, ".pages")).unwrap();
        let labels: Vec<&str> = model.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["1", "2"]);
        assert_eq!(model.container_path, "body > .pages");
    }

    #[test]
    fn test_single_anchor_container_is_rejected() {
        let doc = Html::parse_document(
            r#"<html><body><div class="lonely"><a href="/p/1">1</a></div></body></html>"#,
        );
        assert!(detect(first(&doc, ".lonely")).is_none());
    }

    #[test]
    fn test_all_labels_filtered_is_a_failed_capture() {
        let doc = Html::parse_document(
            r#"<html><body>
                <ul class="nav"><li><a href="/a">Home</a></li><li><a href="/b">About</a></li></ul>
            </body></html>"#,
        );
        assert!(detect(first(&doc, ".nav")).is_none());
    }

    #[test]
    fn test_rebuild_from_persisted_path() {
        let doc = Html::parse_document(PAGED);
        let captured = detect(first(&doc, "#wrap")).unwrap();

        // A later page load only knows the container path.
        let rebuilt = rebuild(&doc, &captured.container_path).unwrap();
        assert_eq!(rebuilt.entries, captured.entries);
        assert!(rebuild(&doc, ".does-not-exist").is_none());
    }

    #[tokio::test]
    async fn test_state_roundtrip() {
        let store = crate::storage::MemoryStore::new();
        let state = PaginationState {
            container_path: Some("body > .pager".to_string()),
            checkpoint: Some("2".to_string()),
        };
        state.save(&store, "https://example.com").await;

        let loaded = PaginationState::load(&store, "https://example.com").await;
        assert_eq!(loaded.container_path.as_deref(), Some("body > .pager"));
        assert_eq!(loaded.checkpoint.as_deref(), Some("2"));

        let missing = PaginationState::load(&store, "https://other.com").await;
        assert!(missing.container_path.is_none());
        assert!(missing.checkpoint.is_none());
    }
}
