//! Answer prompt construction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::ScoredChunk;

/// Length directive for generated answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStyle {
    #[default]
    #[serde(alias = "Concise")]
    Concise,
    #[serde(alias = "Detailed")]
    Detailed,
}

impl AnswerStyle {
    fn instruction(self) -> &'static str {
        match self {
            AnswerStyle::Concise => "Answer briefly in 2-3 sentences.",
            AnswerStyle::Detailed => "Provide a detailed, well-structured explanation.",
        }
    }
}

impl fmt::Display for AnswerStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerStyle::Concise => write!(f, "Concise"),
            AnswerStyle::Detailed => write!(f, "Detailed"),
        }
    }
}

impl FromStr for AnswerStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concise" => Ok(AnswerStyle::Concise),
            "detailed" => Ok(AnswerStyle::Detailed),
            other => Err(format!(
                "unknown answer style '{}': use concise or detailed",
                other
            )),
        }
    }
}

/// Retrieved chunk texts in retrieval order, one per line.
pub fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the single-turn prompt sent to the chat model.
///
/// The model is told to answer from the supplied context only, with the
/// length directive chosen by `style`.
pub fn build_answer_prompt(question: &str, chunks: &[ScoredChunk], style: AnswerStyle) -> String {
    format!(
        "You are a knowledgeable assistant. {}\n\
         Answer the question based on the context below.\n\
         \n\
         Context:\n\
         {}\n\
         \n\
         Question: {}\n",
        style.instruction(),
        build_context(chunks),
        question.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn scored(text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: text.to_string(),
                filename: "f.txt".to_string(),
                page: 1,
                chunk_index: 0,
                text: text.to_string(),
                hash: String::new(),
            },
            score: 0.5,
        }
    }

    #[test]
    fn test_context_joined_in_retrieval_order() {
        let ctx = build_context(&[scored("second best"), scored("first")]);
        assert_eq!(ctx, "second best\nfirst");
    }

    #[test]
    fn test_prompt_contains_parts() {
        let prompt = build_answer_prompt(
            "  What is Rust? ",
            &[scored("Rust is a language.")],
            AnswerStyle::Concise,
        );
        assert!(prompt.starts_with("You are a knowledgeable assistant. Answer briefly in 2-3 sentences."));
        assert!(prompt.contains("Context:\nRust is a language.\n"));
        assert!(prompt.contains("Question: What is Rust?\n"));
    }

    #[test]
    fn test_detailed_style_directive() {
        let prompt = build_answer_prompt("q", &[], AnswerStyle::Detailed);
        assert!(prompt.contains("Provide a detailed, well-structured explanation."));
        assert!(!prompt.contains("2-3 sentences"));
    }

    #[test]
    fn test_style_parse() {
        assert_eq!("Concise".parse::<AnswerStyle>().unwrap(), AnswerStyle::Concise);
        assert_eq!(" detailed ".parse::<AnswerStyle>().unwrap(), AnswerStyle::Detailed);
        assert!("verbose".parse::<AnswerStyle>().is_err());
    }
}
