//! Injection text and request-body rewriting for driftguard.
//!
//! The static channel (team memory in the system prompt), the dynamic
//! channel (per-turn context in the last user message) and the summaries
//! used by CLEAR.

pub mod body;
pub mod builder;
pub mod injection;
pub mod report;
pub mod truncation;

pub use builder::{DynamicContext, MemorySnippet, StaticContextBuilder};
pub use report::{SectionReport, StaticReport};
