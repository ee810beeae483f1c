use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

/// Pattern for id/class tokens that are safe to embed in a selector verbatim.
fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][\w\-:.]*$").expect("valid identifier pattern"))
}

/// Checks whether an id or class token can be used as a selector fragment
pub fn is_identifier_valid(identifier: &str) -> bool {
    identifier_pattern().is_match(identifier)
}

/// Picks the most specific selector fragment for a single element:
/// a valid `#id`, then a valid first class token, then a `[role="…"]`
/// attribute fragment. Returns None when only the tag name is usable.
fn unique_identifier(el: ElementRef) -> Option<String> {
    if let Some(id) = el.value().id() {
        if is_identifier_valid(id) {
            return Some(format!("#{}", id));
        }
    }
    if let Some(class) = el.value().classes().next() {
        if is_identifier_valid(class) {
            return Some(format!(".{}", class));
        }
    }
    el.value().attr("role").map(|role| format!("[role=\"{}\"]", role))
}

/// Checks whether an element is a table cell or sits inside one
fn is_table_cell_content(el: ElementRef) -> bool {
    let mut current = Some(el);
    while let Some(node) = current {
        if matches!(node.value().name(), "td" | "th") {
            return true;
        }
        current = node.parent().and_then(ElementRef::wrap);
    }
    false
}

/// Computes a selector path for the given element that survives a re-render
/// of the same tree shape.
///
/// The path is built from per-ancestor fragments joined with the child
/// combinator, walking up to (but excluding) the document root element.
/// Table cells are special-cased: a `td` target contributes a trailing
/// `:nth-child(col)` fragment so the path addresses "column N of each
/// matching row" instead of one specific cell, and the cell chain itself
/// contributes no fragments - only rows and non-cell ancestors do.
pub fn resolve(el: ElementRef) -> String {
    let mut segments: Vec<String> = Vec::new();
    let mut column = 0usize;

    let mut current = Some(el);
    while let Some(node) = current {
        let parent = node.parent().and_then(ElementRef::wrap);
        if parent.is_none() {
            // Reached the root element; it contributes no fragment.
            break;
        }

        let tag = node.value().name();
        if tag == "td" {
            if let Some(row) = parent {
                column = row
                    .children()
                    .filter_map(ElementRef::wrap)
                    .position(|sibling| sibling.id() == node.id())
                    .map(|idx| idx + 1)
                    .unwrap_or(0);
            }
        }

        if tag == "tr" || !is_table_cell_content(node) {
            let fragment = unique_identifier(node).unwrap_or_else(|| tag.to_string());
            segments.push(fragment);
        }

        current = parent;
    }

    segments.reverse();
    if column != 0 {
        segments.push(format!(":nth-child({})", column));
    }
    segments.join(" > ")
}

/// Applies a locator path to the document, returning every matching element
/// in document order. Unparseable paths yield no matches rather than an
/// error, so stale locators degrade to zero extracted rows.
pub fn apply<'a>(doc: &'a Html, path: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(path) {
        Ok(selector) => doc.select(&selector).collect(),
        Err(_) => {
            ::log::warn!("Unparseable locator path: {}", path);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first<'a>(doc: &'a Html, selector: &str) -> ElementRef<'a> {
        let sel = Selector::parse(selector).unwrap();
        doc.select(&sel).next().unwrap()
    }

    #[test]
    fn test_identifier_validity() {
        assert!(is_identifier_valid("results"));
        assert!(is_identifier_valid("a1-b:c.d"));
        assert!(!is_identifier_valid("9lives"));
        assert!(!is_identifier_valid("-leading"));
        assert!(!is_identifier_valid(""));
    }

    #[test]
    fn test_resolve_prefers_id_then_class_then_role() {
        let doc = Html::parse_document(
            r#"<html><body>
                <div id="main"><section class="listing wide"><span role="note">x</span></section></div>
            </body></html>"#,
        );
        let span = first(&doc, "span");
        assert_eq!(resolve(span), "body > #main > .listing > [role=\"note\"]");
    }

    #[test]
    fn test_resolve_falls_back_to_tag_name() {
        let doc = Html::parse_document(
            // "9col" is not a valid class token, so the tag name is used
            r#"<html><body><div class="9col"><p>x</p></div></body></html>"#,
        );
        let p = first(&doc, "p");
        assert_eq!(resolve(p), "body > div > p");
    }

    #[test]
    fn test_resolve_table_cell_addresses_column() {
        let doc = Html::parse_document(
            r#"<html><body>
                <table id="prices">
                  <tr><td>a</td><td>b</td><td>c</td></tr>
                  <tr><td>d</td><td>e</td><td>f</td></tr>
                </table>
            </body></html>"#,
        );
        let sel = Selector::parse("td").unwrap();
        let second_cell = doc.select(&sel).nth(1).unwrap();
        let path = resolve(second_cell);
        assert_eq!(path, "body > #prices > tbody > tr > :nth-child(2)");

        // The column path matches the cell in every row, not just the clicked one.
        let matched = apply(&doc, &path);
        assert_eq!(matched.len(), 2);
        let texts: Vec<String> = matched
            .iter()
            .map(|el| el.text().collect::<String>())
            .collect();
        assert_eq!(texts, vec!["b", "e"]);
    }

    #[test]
    fn test_nested_content_inside_cell_is_skipped() {
        let doc = Html::parse_document(
            r#"<html><body>
                <table><tr><td><span class="price">9</span></td><td>x</td></tr></table>
            </body></html>"#,
        );
        // A node inside a td contributes no fragment of its own, but the
        // enclosing cell still supplies the column index.
        let span = first(&doc, "span");
        assert_eq!(resolve(span), "body > table > tbody > tr > :nth-child(1)");
    }

    #[test]
    fn test_apply_contains_resolved_node() {
        let doc = Html::parse_document(
            r#"<html><body><ul id="menu"><li class="item">one</li><li class="item">two</li></ul></body></html>"#,
        );
        let li = first(&doc, "li.item");
        let path = resolve(li);
        let matched = apply(&doc, &path);
        assert!(matched.iter().any(|el| el.id() == li.id()));
    }

    #[test]
    fn test_apply_bad_path_yields_no_matches() {
        let doc = Html::parse_document("<html><body></body></html>");
        assert!(apply(&doc, ">>> not a selector").is_empty());
    }
}
