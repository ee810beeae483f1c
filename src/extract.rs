use crate::locator;
use crate::storage::{self, Store};
use crate::targets::{TargetKind, TargetRegistry};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::OnceLock;

/// One extracted row: identifier (or table column) mapped to its value.
/// Key order is insertion order thanks to serde_json's preserve_order.
pub type ExtractedRecord = serde_json::Map<String, Value>;

/// Append-only sequence of extracted records across one scraping run
pub type ResultSet = Vec<ExtractedRecord>;

fn image_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("img").unwrap())
}

fn anchor_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("a").unwrap())
}

/// The element's rendered text with whitespace collapsed
fn rendered_text(el: ElementRef) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First-match depth-first search for an element of the wanted tag,
/// the starting element itself included
fn self_or_first_descendant<'a>(
    el: ElementRef<'a>,
    tag: &str,
    selector: &Selector,
) -> Option<ElementRef<'a>> {
    if el.value().name() == tag {
        return Some(el);
    }
    el.select(selector).next()
}

/// Extracts a single value from a matched element according to the target
/// kind. Image targets with no image in the subtree (or no source attribute)
/// yield None; link targets with no anchor anywhere in the subtree yield an
/// empty string, matching a link element with an empty href.
pub fn extract_value(el: ElementRef, kind: TargetKind) -> Option<String> {
    match kind {
        TargetKind::Text => Some(rendered_text(el)),
        TargetKind::Image => self_or_first_descendant(el, "img", image_selector())
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string),
        TargetKind::Link => match self_or_first_descendant(el, "a", anchor_selector()) {
            Some(a) => a.value().attr("href").map(str::to_string),
            None => Some(String::new()),
        },
    }
}

/// Applies every target in the registry against the live tree and aligns the
/// matches positionally: the i-th match of each target lands in the i-th
/// record. Records are created lazily per index; after the positional pass,
/// records missing an identifier (because that target matched fewer nodes)
/// are padded with null.
pub fn extract_from_targets(doc: &Html, registry: &TargetRegistry) -> ResultSet {
    let mut records: ResultSet = Vec::new();

    for spec in registry.iter() {
        let matched = locator::apply(doc, &spec.path);
        ::log::debug!("Target '{}' matched {} nodes", spec.identifier, matched.len());
        for (idx, el) in matched.into_iter().enumerate() {
            while records.len() <= idx {
                records.push(ExtractedRecord::new());
            }
            let value = extract_value(el, spec.kind)
                .map(Value::String)
                .unwrap_or(Value::Null);
            records[idx].insert(spec.identifier.clone(), value);
        }
    }

    for record in &mut records {
        for spec in registry.iter() {
            if !record.contains_key(&spec.identifier) {
                record.insert(spec.identifier.clone(), Value::Null);
            }
        }
    }

    records
}

/// The first table element of the document, if any
pub fn find_table(doc: &Html) -> Option<ElementRef> {
    let selector = Selector::parse("table").unwrap();
    doc.select(&selector).next()
}

/// Extracts a table into records: header-cell text in document order as
/// column keys, every row zipped cell-by-cell against them. Rows that yield
/// no keys (the header row itself, separator rows) are dropped. Duplicate
/// header text is not deduplicated - the later cell wins.
pub fn extract_table(table: ElementRef) -> Vec<ExtractedRecord> {
    let header_selector = Selector::parse("th").unwrap();
    let row_selector = Selector::parse("tr").unwrap();
    let cell_selector = Selector::parse("td").unwrap();

    let headers: Vec<String> = table.select(&header_selector).map(rendered_text).collect();

    table
        .select(&row_selector)
        .filter_map(|row| {
            let mut record = ExtractedRecord::new();
            for (idx, cell) in row.select(&cell_selector).enumerate() {
                if let Some(header) = headers.get(idx) {
                    record.insert(header.clone(), Value::String(rendered_text(cell)));
                }
            }
            (!record.is_empty()).then_some(record)
        })
        .collect()
}

/// Load the result set accumulated so far for an origin
pub async fn load_results(store: &dyn Store, origin: &str) -> ResultSet {
    match store.get(&storage::data_key(origin)).await {
        Some(value) => match serde_json::from_value(value) {
            Ok(results) => results,
            Err(e) => {
                ::log::error!("Ignoring unreadable saved results for {}: {}", origin, e);
                Vec::new()
            }
        },
        None => Vec::new(),
    }
}

/// Append a page's records to whatever was previously persisted.
/// The stored sequence is never deduplicated or reordered.
pub async fn append_results(store: &dyn Store, origin: &str, records: ResultSet) {
    let mut all = load_results(store, origin).await;
    all.extend(records);
    match serde_json::to_value(&all) {
        Ok(value) => store.set(&storage::data_key(origin), value).await,
        Err(e) => ::log::error!("Failed to serialize results for {}: {}", origin, e),
    }
}
