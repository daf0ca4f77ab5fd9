//! Prompt and context assembly for downstream answer generation

use crate::types::RankedPassage;

/// Builds prompts and context blocks from retrieved passages
pub struct PromptBuilder;

impl PromptBuilder {
    /// Join ranked passages into a single numbered context block.
    /// An empty passage list yields an empty string, signaling "no relevant
    /// knowledge" to the caller.
    pub fn build_context(passages: &[RankedPassage]) -> String {
        if passages.is_empty() {
            return String::new();
        }

        passages
            .iter()
            .enumerate()
            .map(|(i, passage)| format!("[{}] {}", i + 1, passage.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Assemble the final generation prompt
    pub fn build_prompt(question: &str, context: &str) -> String {
        if context.is_empty() {
            return format!(
                "Answer the following question. If you do not know the answer, say so.\n\n\
                 Question: {}",
                question
            );
        }

        format!(
            "Answer the question using only the numbered context passages below. \
             Cite passages by their number, like [2]. If the context does not \
             contain the answer, say so.\n\n\
             Context:\n{}\n\n\
             Question: {}",
            context, question
        )
    }

    /// Default system prompt for the generation call
    pub fn system_prompt() -> &'static str {
        "You are a precise assistant that answers strictly from the provided \
         context passages and cites them by number."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn passage(text: &str) -> RankedPassage {
        RankedPassage {
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            text: text.to_string(),
            metadata: HashMap::new(),
            score: 0.9,
        }
    }

    #[test]
    fn context_is_numbered_from_one() {
        let context =
            PromptBuilder::build_context(&[passage("First fact."), passage("Second fact.")]);
        assert_eq!(context, "[1] First fact.\n\n[2] Second fact.");
    }

    #[test]
    fn empty_results_format_to_empty_string() {
        assert_eq!(PromptBuilder::build_context(&[]), "");
    }

    #[test]
    fn prompt_embeds_context_and_question() {
        let prompt = PromptBuilder::build_prompt("What happened?", "[1] A thing happened.");
        assert!(prompt.contains("[1] A thing happened."));
        assert!(prompt.contains("Question: What happened?"));
    }
}
