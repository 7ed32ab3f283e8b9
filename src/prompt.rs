//! Prompt composition.
//!
//! [`compose_prompt`] is pure: the same history, retrieval result and
//! question always produce the same prompt text.

use crate::models::{ConversationTurn, RetrievedChunk};

pub const DEFAULT_INSTRUCTIONS: &str = "You are an expert EMD locomotive maintenance assistant. \
Answer the user's question based ONLY on the provided context from service manuals and the \
recent conversation history. If the context doesn't contain the answer, state that the \
information is not in your documents.";

/// Stands in for the context block when retrieval found nothing.
pub const NO_CONTEXT_SENTINEL: &str = "No specific context found in the provided documents.";

/// Number of turns a caller forwards with each question.
pub const HISTORY_WINDOW: usize = 6;

/// The last `n` turns of a conversation, oldest first.
pub fn recent_history(history: &[ConversationTurn], n: usize) -> Vec<ConversationTurn> {
    let start = history.len().saturating_sub(n);
    history[start..].to_vec()
}

/// Build the full prompt sent to the answer generator.
///
/// The history is rendered in full, one `role: content` line per turn.
/// Each retrieved chunk is preceded by a header naming its source document.
pub fn compose_prompt(
    instructions: &str,
    history: &[ConversationTurn],
    retrieved: &[RetrievedChunk],
    question: &str,
) -> String {
    let history_block = history
        .iter()
        .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
        .collect::<Vec<_>>()
        .join("\n");

    let context_block = if retrieved.is_empty() {
        NO_CONTEXT_SENTINEL.to_string()
    } else {
        retrieved
            .iter()
            .map(|r| {
                format!(
                    "\n\n--- From document: {} ---\n{}",
                    r.chunk.source_document, r.chunk.content
                )
            })
            .collect::<String>()
    };

    format!(
        "{instructions}\n\n\
         CONVERSATION HISTORY:\n{history_block}\n\n\
         RELEVANT DOCUMENT CONTEXT:\n{context_block}\n\n\
         USER'S QUESTION:\n{question}\n\n\
         ANSWER:"
    )
}
