//! Prompt assembly.
//!
//! A prompt is one string with fixed sections, in this order:
//!
//! 1. system instructions
//! 2. `[Conversation history]` as `user:` / `assistant:` lines (omitted when empty)
//! 3. `[Reference material]`: retrieved chunks separated by blank lines,
//!    or a notice that none is available
//! 4. `[Question]`
//! 5. the answer cue

use interview_coach_core::models::{ConversationTurn, SearchHit};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an interview coach helping a candidate prepare \
for job interviews. Use the reference material (company pages, job postings, the candidate's \
resume) when it is relevant, generate realistic interview questions, and give concrete, \
structured feedback. Answer in the language of the question.";

pub const NO_CONTEXT_NOTICE: &str = "No reference material is available for this question. \
Give a general answer based on common interview practice.";

pub const ANSWER_CUE: &str = "Answer:";

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system: String,
    max_chunk_chars: Option<usize>,
}

impl PromptBuilder {
    pub fn new(system: Option<String>, max_chunk_chars: Option<usize>) -> Self {
        Self {
            system: system.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_chunk_chars,
        }
    }

    pub fn build(&self, history: &[ConversationTurn], context: &[SearchHit], question: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str(self.system.trim());
        prompt.push_str("\n\n");

        if !history.is_empty() {
            prompt.push_str("[Conversation history]\n");
            for turn in history {
                prompt.push_str(turn.role.label());
                prompt.push_str(": ");
                prompt.push_str(turn.text.trim());
                prompt.push('\n');
            }
            prompt.push('\n');
        }

        prompt.push_str("[Reference material]\n");
        if context.is_empty() {
            prompt.push_str(NO_CONTEXT_NOTICE);
        } else {
            let chunks: Vec<String> = context.iter().map(|hit| self.clip(&hit.text)).collect();
            prompt.push_str(&chunks.join("\n\n"));
        }
        prompt.push_str("\n\n");

        prompt.push_str("[Question]\n");
        prompt.push_str(question.trim());
        prompt.push_str("\n\n");
        prompt.push_str(ANSWER_CUE);
        prompt
    }

    fn clip(&self, text: &str) -> String {
        let text = text.trim();
        match self.max_chunk_chars {
            Some(max) if text.chars().count() > max => text.chars().take(max).collect(),
            _ => text.to_string(),
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_coach_core::models::{Metadata, Role};

    fn hit(text: &str) -> SearchHit {
        SearchHit::new(text, Metadata::new(), 1.0)
    }

    #[test]
    fn test_sections_in_order() {
        let history = vec![
            ConversationTurn::new(Role::User, "What is Rust?"),
            ConversationTurn::new(Role::Assistant, "A systems language."),
        ];
        let prompt = PromptBuilder::default().build(
            &history,
            &[hit("chunk one"), hit("chunk two")],
            "Tell me more",
        );

        let system = prompt.find("interview coach").unwrap();
        let hist = prompt.find("user: What is Rust?").unwrap();
        let asst = prompt.find("assistant: A systems language.").unwrap();
        let ctx = prompt.find("chunk one\n\nchunk two").unwrap();
        let question = prompt.find("[Question]\nTell me more").unwrap();
        assert!(system < hist && hist < asst && asst < ctx && ctx < question);
        assert!(prompt.ends_with(ANSWER_CUE));
        assert!(!prompt.contains(NO_CONTEXT_NOTICE));
    }

    #[test]
    fn test_empty_context_states_no_material() {
        let prompt = PromptBuilder::default().build(&[], &[], "hi");
        assert!(prompt.contains(NO_CONTEXT_NOTICE));
        assert!(!prompt.contains("[Conversation history]"));
    }

    #[test]
    fn test_chunks_clipped_on_char_boundary() {
        let builder = PromptBuilder::new(Some("sys".into()), Some(3));
        let prompt = builder.build(&[], &[hit("카카오톡 채널")], "q");
        assert!(prompt.contains("[Reference material]\n카카오\n"));
        assert!(prompt.starts_with("sys\n\n"));
    }
}
