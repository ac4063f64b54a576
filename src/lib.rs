// newslabel - ticker resolution and model labeling for news events
// Resolves each cleaned news record to a single ticker (explicit notation first,
// company names as a fallback) and labels resolved records with a local model.

#![deny(clippy::unwrap_used)]

pub mod config;
pub mod data;
pub mod errors;
pub mod export;
pub mod labeling;
pub mod llm;
pub mod registry;
pub mod resolve;

// Re-export commonly used items
pub use config::Config;
pub use data::{CleanedRecord, ResolutionResult, ResolvedRecord};
pub use errors::{BackendError, LabelFault, LabelingAborted, RegistryLoadError};
pub use labeling::{LabelResult, LabelingEngine};
pub use registry::Registry;
pub use resolve::{resolve_batch, resolve_record, ResolutionReport};
