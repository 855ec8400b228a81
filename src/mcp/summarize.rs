//! Summarization of raw command output.
//!
//! The fleet hands package-manager output to a [`Summarizer`] before it is
//! returned. Provider failures never fail the call; they are recorded in the
//! host's result slot.

use async_trait::async_trait;
use thiserror::Error;

pub(crate) const UPGRADABLE_INSTRUCTION: &str =
    "Summarize the output of the 'apt list --upgradable' command.";
pub(crate) const UPGRADE_INSTRUCTION: &str =
    "Summarize the output of the 'apt-get upgrade' command.";

/// Opaque failure reported by a summarization provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to summarize output: {0}")]
pub struct SummarizeError(pub String);

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, instruction: &str, raw_output: &str) -> Result<String, SummarizeError>;
}

/// Returns the raw output, trimmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSummarizer;

#[async_trait]
impl Summarizer for PassthroughSummarizer {
    async fn summarize(&self, _instruction: &str, raw_output: &str) -> Result<String, SummarizeError> {
        let trimmed = raw_output.trim();
        if trimmed.is_empty() {
            return Ok("(no output)".to_string());
        }
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough_trims() {
        let summary = PassthroughSummarizer
            .summarize(UPGRADABLE_INSTRUCTION, "\nListing...\ncurl/jammy 8.0\n\n")
            .await
            .unwrap();
        assert_eq!(summary, "Listing...\ncurl/jammy 8.0");
    }

    #[tokio::test]
    async fn test_passthrough_marks_empty_output() {
        let summary = PassthroughSummarizer
            .summarize(UPGRADE_INSTRUCTION, "  \n")
            .await
            .unwrap();
        assert_eq!(summary, "(no output)");
    }

    #[test]
    fn test_error_message() {
        let err = SummarizeError("rate limited".into());
        assert_eq!(err.to_string(), "failed to summarize output: rate limited");
    }
}
