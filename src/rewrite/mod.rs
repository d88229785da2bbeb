//! Stylistic rewrite collaborator
//!
//! A rewriter gets the final say on each candidate. Callers treat any
//! error as "keep the candidate as generated".

mod openai;

pub use openai::OpenAiRewriter;

use anyhow::Result;

use crate::engine::Turn;

/// Restyles a generated candidate
pub trait Rewriter: Send + Sync {
    /// Rewrite `candidate`, the answer to `input`, in the voice of `persona`
    fn rewrite(
        &self,
        input: &str,
        candidate: &str,
        persona: &str,
        context: &str,
        history: &[Turn],
    ) -> Result<String>;
}

/// Rewriter that keeps every candidate unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Rewriter for Passthrough {
    fn rewrite(
        &self,
        _input: &str,
        candidate: &str,
        _persona: &str,
        _context: &str,
        _history: &[Turn],
    ) -> Result<String> {
        Ok(candidate.to_string())
    }
}
