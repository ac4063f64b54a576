//! Event labeling with a language model
//! Prompt, invoke, parse, validate; bad output is retried and then degraded to a
//! needs-review placeholder, backend failures abort the run

pub mod engine;
pub mod machine;
pub mod prompts;
pub mod schema;

pub use engine::LabelingEngine;
pub use machine::{LabelMachine, LabelState, RetryPolicy, Step};
pub use prompts::{build_prompt, sanitize_text};
pub use schema::{Category, Direction, LabelResult, ValidatedLabel};
