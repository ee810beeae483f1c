use crate::capture::{self, CaptureMode, Marks, TargetPrompt};
use crate::export;
use crate::extract;
use crate::locator;
use crate::pagination::{self, PaginationState};
use crate::storage::{self, Store};
use crate::targets::{TargetRegistry, TargetSpec};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Commands the control surface can send to the in-page agent.
/// Each command yields exactly one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start capturing extraction targets from clicks
    BeginTargetCapture,
    /// Start capturing the pagination control from clicks
    BeginPaginationCapture,
    /// Does the current page contain a table?
    HasTable,
    /// Arm the traversal run
    StartRun,
    /// Disarm the traversal run and stop capturing
    StopRun,
    /// Write the accumulated (or current-page) records as a CSV artifact
    DownloadResults,
    /// Write the page's first table as a CSV artifact
    DownloadTable,
    /// Clear all saved state for this origin
    Reset,
    /// Does this origin have saved targets or pagination?
    HasSavedState,
    /// Liveness check for the in-page agent
    Ready,
}

/// Single response to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The command was handled
    Ack,
    /// The page has a table
    TableFound,
    /// The requested thing does not exist on this page
    NotFound,
    /// An artifact was written to this path
    Saved(PathBuf),
    /// Which state is saved for this origin
    SavedState {
        /// At least one target is captured
        targets: bool,
        /// A pagination container is captured
        pagination: bool,
    },
    /// The command failed in a recoverable way
    Failed(String),
}

/// What a capture click did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The click was not a capture (idle mode, or it hit the prompt surface)
    Ignored,
    /// A new target was appended under this identifier
    TargetAdded(String),
    /// The target at this path was toggled off
    TargetRemoved(String),
    /// Pagination was captured with this many entries; capture mode exited
    PaginationCaptured(usize),
    /// No usable pagination container was found; capture mode stays active
    PaginationRejected,
}

/// Per-origin agent session.
///
/// Owns the target registry, pagination state, capture mode and marks for
/// one document origin. A session is rehydrated from the store at the start
/// of every process instance; nothing here survives a navigation on its own.
pub struct Session {
    origin: String,
    /// Captured extraction targets, in output column order
    pub registry: TargetRegistry,
    /// Captured pagination container and traversal checkpoint
    pub pagination: PaginationState,
    mode: CaptureMode,
    /// Locator paths currently carrying a visual mark
    pub marks: Marks,
}

impl Session {
    /// Rehydrate the session persisted for an origin
    pub async fn load(store: &dyn Store, origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            registry: TargetRegistry::load(store, origin).await,
            pagination: PaginationState::load(store, origin).await,
            mode: CaptureMode::Idle,
            marks: Marks::default(),
        }
    }

    /// The origin this session is scoped to
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The capture mode currently active
    pub fn capture_mode(&self) -> CaptureMode {
        self.mode
    }

    /// Install the target-capture listener, stopping pagination capture.
    /// Marks are re-applied to every saved target path.
    pub fn begin_target_capture(&mut self) {
        self.mode = CaptureMode::Targets;
        for spec in self.registry.iter() {
            self.marks.mark(&spec.path);
        }
    }

    /// Install the pagination-capture listener, stopping target capture
    pub fn begin_pagination_capture(&mut self) {
        self.mode = CaptureMode::Pagination;
    }

    /// Remove any capture listener
    pub fn stop_capture(&mut self) {
        self.mode = CaptureMode::Idle;
    }

    /// Turn a user click into a registry or pagination mutation, depending
    /// on the active capture mode
    pub async fn handle_click(
        &mut self,
        el: ElementRef<'_>,
        prompt: &dyn TargetPrompt,
        store: &dyn Store,
    ) -> ClickOutcome {
        if capture::is_prompt_click(el) {
            return ClickOutcome::Ignored;
        }
        match self.mode {
            CaptureMode::Idle => ClickOutcome::Ignored,
            CaptureMode::Targets => self.capture_target(el, prompt, store).await,
            CaptureMode::Pagination => self.capture_pagination(el, store).await,
        }
    }

    async fn capture_target(
        &mut self,
        el: ElementRef<'_>,
        prompt: &dyn TargetPrompt,
        store: &dyn Store,
    ) -> ClickOutcome {
        let path = locator::resolve(el);

        if self.registry.contains_path(&path) {
            self.registry.remove_path(&path);
            self.marks.unmark(&path);
            self.registry.save(store, &self.origin).await;
            return ClickOutcome::TargetRemoved(path);
        }

        let settings = capture::request_settings(prompt, &self.registry);
        let identifier = settings.identifier.clone();
        let spec = TargetSpec {
            path: path.clone(),
            identifier: identifier.clone(),
            kind: settings.kind,
        };
        if let Err(e) = self.registry.add(spec) {
            ::log::error!("Dropping captured target '{}': {}", identifier, e);
            return ClickOutcome::Ignored;
        }
        self.marks.mark(&path);
        self.registry.save(store, &self.origin).await;
        ClickOutcome::TargetAdded(identifier)
    }

    async fn capture_pagination(&mut self, el: ElementRef<'_>, store: &dyn Store) -> ClickOutcome {
        match pagination::detect(el) {
            Some(model) => {
                ::log::info!(
                    "Captured pagination '{}' with {} entries",
                    model.container_path,
                    model.entries.len()
                );
                self.pagination.container_path = Some(model.container_path);
                // A new capture starts a fresh traversal.
                self.pagination.checkpoint = None;
                self.pagination.save(store, &self.origin).await;
                self.stop_capture();
                ClickOutcome::PaginationCaptured(model.entries.len())
            }
            None => {
                ::log::warn!("No usable pagination container at the clicked element");
                ClickOutcome::PaginationRejected
            }
        }
    }

    /// Dispatch one command against the current page
    pub async fn handle_command(
        &mut self,
        doc: &Html,
        store: &dyn Store,
        out_dir: &Path,
        command: Command,
    ) -> Response {
        match command {
            Command::HasTable => match extract::find_table(doc) {
                Some(_) => Response::TableFound,
                None => Response::NotFound,
            },
            Command::BeginTargetCapture => {
                self.stop_capture();
                self.begin_target_capture();
                Response::Ack
            }
            Command::BeginPaginationCapture => {
                self.stop_capture();
                self.begin_pagination_capture();
                Response::Ack
            }
            Command::StartRun => {
                store
                    .set(
                        &storage::scraping_key(&self.origin),
                        Value::String(storage::RUN_ACTIVE.to_string()),
                    )
                    .await;
                Response::Ack
            }
            Command::StopRun => {
                store
                    .set(
                        &storage::scraping_key(&self.origin),
                        Value::String(storage::RUN_INACTIVE.to_string()),
                    )
                    .await;
                self.stop_capture();
                Response::Ack
            }
            Command::DownloadResults => {
                let saved = extract::load_results(store, &self.origin).await;
                let from_storage = !saved.is_empty();
                let records = if from_storage {
                    saved
                } else {
                    // Nothing accumulated: fall back to the current page.
                    extract::extract_from_targets(doc, &self.registry)
                };
                let name = export::artifact_name(&page_title(doc), "Scraper");
                self.stop_capture();
                match export::write_csv(&records, out_dir, &name) {
                    Ok(path) => {
                        if from_storage {
                            store.remove(&storage::data_key(&self.origin)).await;
                        }
                        Response::Saved(path)
                    }
                    Err(e) => Response::Failed(e.to_string()),
                }
            }
            Command::DownloadTable => match extract::find_table(doc) {
                Some(table) => {
                    let records = extract::extract_table(table);
                    let name = export::artifact_name(&page_title(doc), "Table");
                    match export::write_csv(&records, out_dir, &name) {
                        Ok(path) => Response::Saved(path),
                        Err(e) => Response::Failed(e.to_string()),
                    }
                }
                None => Response::NotFound,
            },
            Command::Reset => {
                self.registry.reset();
                self.pagination.reset();
                self.marks.clear();
                self.stop_capture();
                store.remove(&storage::targets_key(&self.origin)).await;
                store.remove(&storage::pagination_key(&self.origin)).await;
                store.remove(&storage::scraping_key(&self.origin)).await;
                Response::Ack
            }
            Command::HasSavedState => Response::SavedState {
                targets: !self.registry.is_empty(),
                pagination: self.pagination.container_path.is_some(),
            },
            Command::Ready => Response::Ack,
        }
    }
}

/// The document title, used to name download artifacts
pub fn page_title(doc: &Html) -> String {
    let selector = Selector::parse("title").unwrap();
    let title = doc
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();
    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title
    }
}
