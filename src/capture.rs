use crate::targets::{self, TargetKind, TargetRegistry};
use scraper::ElementRef;
use std::collections::HashSet;

/// Class carried by every element of the user-prompt surface. Clicks inside
/// it belong to the prompt, not to the page being captured.
pub const PROMPT_SURFACE_CLASS: &str = "mp-prompt";

/// Which capture click-listener is currently installed. At most one of the
/// two capture modes is active at a time; entering one stops the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// No capture listener installed
    #[default]
    Idle,
    /// Clicks capture extraction targets
    Targets,
    /// Clicks capture the pagination control
    Pagination,
}

/// Settings the user supplies for a freshly clicked target
#[derive(Debug, Clone)]
pub struct TargetSettings {
    /// Column name for the extracted value
    pub identifier: String,
    /// Value kind to extract
    pub kind: TargetKind,
}

/// The modal-dialog collaborator that asks the user for target settings.
/// Returning None means the dialog was dismissed without input.
pub trait TargetPrompt {
    /// Ask the user for an identifier and kind for a new target
    fn target_settings(&self) -> Option<TargetSettings>;
}

/// Asks the prompt until it yields a usable identifier. Empty or already
/// used identifiers are re-prompted; a dismissal falls back to a random
/// identifier with the Text kind.
pub fn request_settings(prompt: &dyn TargetPrompt, registry: &TargetRegistry) -> TargetSettings {
    loop {
        match prompt.target_settings() {
            Some(settings)
                if settings.identifier.is_empty()
                    || !registry.is_identifier_free(&settings.identifier) =>
            {
                ::log::debug!("Rejected identifier '{}', re-prompting", settings.identifier);
            }
            Some(settings) => return settings,
            None => {
                return TargetSettings {
                    identifier: targets::random_identifier(),
                    kind: TargetKind::Text,
                }
            }
        }
    }
}

/// Whether a click landed on the prompt surface and should be left to the
/// prompt instead of being treated as a capture
pub fn is_prompt_click(el: ElementRef) -> bool {
    let mut current = Some(el);
    while let Some(node) = current {
        if node
            .value()
            .classes()
            .any(|class| class == PROMPT_SURFACE_CLASS)
        {
            return true;
        }
        current = node.parent().and_then(ElementRef::wrap);
    }
    false
}

/// The set of locator paths currently carrying a visual mark. Rendering is
/// out of scope; this only tracks which paths are marked.
#[derive(Debug, Clone, Default)]
pub struct Marks {
    paths: HashSet<String>,
}

impl Marks {
    /// Mark every element matched by the path
    pub fn mark(&mut self, path: &str) {
        self.paths.insert(path.to_string());
    }

    /// Clear the mark from the path
    pub fn unmark(&mut self, path: &str) {
        self.paths.remove(path);
    }

    /// Whether the path is currently marked
    pub fn is_marked(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Drop every mark
    pub fn clear(&mut self) {
        self.paths.clear();
    }

    /// Number of marked paths
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no path is marked
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::TargetSpec;
    use scraper::{Html, Selector};
    use std::cell::RefCell;

    /// Prompt scripted with a fixed sequence of answers
    pub struct ScriptedPrompt {
        answers: RefCell<Vec<Option<TargetSettings>>>,
    }

    impl ScriptedPrompt {
        pub fn new(mut answers: Vec<Option<TargetSettings>>) -> Self {
            answers.reverse();
            Self {
                answers: RefCell::new(answers),
            }
        }
    }

    impl TargetPrompt for ScriptedPrompt {
        fn target_settings(&self) -> Option<TargetSettings> {
            self.answers.borrow_mut().pop().flatten()
        }
    }

    fn settings(identifier: &str) -> Option<TargetSettings> {
        Some(TargetSettings {
            identifier: identifier.to_string(),
            kind: TargetKind::Text,
        })
    }

    #[test]
    fn test_duplicate_identifier_is_reprompted() {
        let mut registry = TargetRegistry::new();
        registry
            .add(TargetSpec {
                path: ".a".to_string(),
                identifier: "taken".to_string(),
                kind: TargetKind::Text,
            })
            .unwrap();

        let prompt = ScriptedPrompt::new(vec![settings("taken"), settings(""), settings("free")]);
        let chosen = request_settings(&prompt, &registry);
        assert_eq!(chosen.identifier, "free");
    }

    #[test]
    fn test_dismissal_falls_back_to_random_identifier() {
        let registry = TargetRegistry::new();
        let prompt = ScriptedPrompt::new(vec![None]);
        let chosen = request_settings(&prompt, &registry);
        assert_eq!(chosen.identifier.len(), 5);
        assert_eq!(chosen.kind, TargetKind::Text);
    }

    #[test]
    fn test_prompt_surface_click_detection() {
        let doc = Html::parse_document(
            r#"<html><body>
                <div class="mp-prompt"><button class="ok">Save</button></div>
                <p class="page-content">x</p>
            </body></html>"#,
        );
        let button = doc
            .select(&Selector::parse(".ok").unwrap())
            .next()
            .unwrap();
        let content = doc
            .select(&Selector::parse(".page-content").unwrap())
            .next()
            .unwrap();
        assert!(is_prompt_click(button));
        assert!(!is_prompt_click(content));
    }

    #[test]
    fn test_marks_track_paths() {
        let mut marks = Marks::default();
        marks.mark(".a");
        marks.mark(".b");
        assert!(marks.is_marked(".a"));
        marks.unmark(".a");
        assert!(!marks.is_marked(".a"));
        assert_eq!(marks.len(), 1);
        marks.clear();
        assert!(marks.is_empty());
    }
}
