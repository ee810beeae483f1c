// Re-export modules
pub mod capture;
pub mod export;
pub mod extract;
pub mod locator;
pub mod pagination;
pub mod runner;
pub mod session;
pub mod storage;
pub mod targets;
pub mod traversal;
pub mod utils;

// Re-export commonly used types for convenience
pub use capture::{CaptureMode, TargetPrompt, TargetSettings};
pub use extract::{ExtractedRecord, ResultSet};
pub use pagination::{PageEntry, PaginationModel, PaginationState};
pub use session::{ClickOutcome, Command, Response, Session};
pub use storage::{FileStore, MemoryStore, Store};
pub use targets::{TargetKind, TargetRegistry, TargetSpec};
pub use traversal::{Step, Traversal};
