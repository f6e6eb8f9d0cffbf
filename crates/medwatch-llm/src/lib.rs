//! Text-analysis client for clinical side-effect and interaction judgments.
//!
//! Wraps an OpenAI-compatible chat-completions service behind the
//! [`TextAnalysisClient`] trait. The service is treated as unreliable: every
//! call has a bounded timeout, responses are parsed strictly, and each
//! operation has a documented deterministic fallback the caller applies on
//! failure.

pub mod analysis;
pub mod client;
pub mod prompts;

pub use analysis::*;
pub use client::*;
