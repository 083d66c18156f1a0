pub mod config;
pub mod deterministic; // Layer 1: sections, grounding, contradictions
pub mod gate;
pub mod judge; // Layer 2: LLM judge over an Anthropic-style endpoint
pub mod meta_eval;
pub mod models;
pub mod pipeline;
pub mod scoring;

pub use models::{BatchReport, EvalReport, GateDecision, NoteInput};
pub use pipeline::runner::{BatchOptions, BatchOutcome, BatchStatus};
pub use pipeline::Pipeline;
