//! Contract with the generative-response provider.
//!
//! The real provider runs server-side; [`PlaceholderProvider`] stands in for
//! it with deterministic output so the chat flow can be exercised end to end.

use crate::types::AnimeEntry;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Context lines beyond this are dropped from the prompt.
pub const MAX_CONTEXT_ENTRIES: usize = 50;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider returned no content")]
    Empty,
}

#[async_trait]
pub trait ResponseProvider: Send + Sync {
    /// Streams the response as chunks; the concatenation is the full text.
    async fn respond_stream(
        &self,
        message: &str,
        context: &[AnimeEntry],
    ) -> Result<mpsc::Receiver<String>, ProviderError>;

    async fn respond(&self, message: &str, context: &[AnimeEntry]) -> Result<String, ProviderError> {
        let rx = self.respond_stream(message, context).await?;
        collect_chunks(rx).await
    }
}

pub async fn collect_chunks(mut rx: mpsc::Receiver<String>) -> Result<String, ProviderError> {
    let mut out = String::new();
    while let Some(chunk) = rx.recv().await {
        out.push_str(&chunk);
    }
    if out.trim().is_empty() {
        return Err(ProviderError::Empty);
    }
    Ok(out)
}

fn describe_entry(entry: &AnimeEntry) -> String {
    let mut line = format!("- {}", entry.title.trim());
    if let Some(status) = entry.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        line.push_str(&format!(" [{}]", status.to_ascii_lowercase()));
    }
    if let Some(score) = entry.score.filter(|s| s.is_finite() && *s > 0.0) {
        line.push_str(&format!(" (score {score})"));
    }
    line
}

/// Prompt text with the user's list as context, one line per entry.
pub fn build_prompt(message: &str, context: &[AnimeEntry]) -> String {
    let mut prompt = String::from(
        "You are an anime recommendation assistant. Suggest titles the user has not seen and explain why.\n",
    );
    if !context.is_empty() {
        prompt.push_str("\nThe user's anime list:\n");
        for entry in context.iter().take(MAX_CONTEXT_ENTRIES) {
            prompt.push_str(&describe_entry(entry));
            prompt.push('\n');
        }
        if context.len() > MAX_CONTEXT_ENTRIES {
            prompt.push_str(&format!(
                "... and {} more\n",
                context.len() - MAX_CONTEXT_ENTRIES
            ));
        }
    }
    prompt.push_str("\nUser: ");
    prompt.push_str(message.trim());
    prompt
}

/// Canned responder; splits its answer into word chunks.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderProvider;

impl PlaceholderProvider {
    fn answer(message: &str, context: &[AnimeEntry]) -> String {
        let favourites: Vec<&str> = context
            .iter()
            .filter(|e| e.score.is_some_and(|s| s >= 8.0))
            .map(|e| e.title.as_str())
            .take(3)
            .collect();
        if favourites.is_empty() {
            format!(
                "Recommendations are not available yet. You asked: \"{}\"",
                message.trim()
            )
        } else {
            format!(
                "Recommendations are not available yet. Based on {} you may enjoy similar shows.",
                favourites.join(", ")
            )
        }
    }
}

#[async_trait]
impl ResponseProvider for PlaceholderProvider {
    async fn respond_stream(
        &self,
        message: &str,
        context: &[AnimeEntry],
    ) -> Result<mpsc::Receiver<String>, ProviderError> {
        let answer = Self::answer(message, context);
        let words: Vec<String> = answer
            .split_inclusive(' ')
            .map(|w| w.to_string())
            .collect();
        let (tx, rx) = mpsc::channel(words.len().max(1));
        tokio::spawn(async move {
            for word in words {
                if tx.send(word).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
