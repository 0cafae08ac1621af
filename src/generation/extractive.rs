//! Extractive answering without a language model.
//!
//! Picks the context sentences sharing the most distinct terms with the
//! question and returns them in their original order, capped at
//! `max_tokens` words. Output depends only on the prompt, so every
//! temperature behaves like greedy decoding.

use async_trait::async_trait;
use std::collections::HashSet;

use super::{GenerationParams, LanguageModel, Prompt};
use crate::error::Result;

/// Returned when no context sentence shares a term with the question.
pub const NO_ANSWER: &str =
    "I don't know. The provided documents do not appear to cover this question.";

const MAX_SENTENCES: usize = 3;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
    "i", "if", "in", "is", "it", "my", "of", "on", "or", "should", "that", "the", "this", "to",
    "was", "what", "when", "where", "which", "who", "why", "will", "with", "you", "your",
];

#[derive(Debug, Default)]
pub struct ExtractiveModel;

impl ExtractiveModel {
    pub fn new() -> Self {
        Self
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Split on sentence terminators and line breaks, keeping the terminator.
fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c == '\n' {
            push_sentence(&mut out, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            push_sentence(&mut out, &mut current);
        }
    }
    push_sentence(&mut out, &mut current);
    out
}

fn push_sentence(out: &mut Vec<String>, current: &mut String) {
    let s = current.trim();
    if s.chars().any(|c| c.is_alphanumeric()) {
        out.push(s.to_string());
    }
    current.clear();
}

pub fn extract_answer(prompt: &Prompt, max_words: usize) -> String {
    let question = terms(&prompt.question);

    // (position, score) for every candidate sentence across all passages.
    let candidates: Vec<String> = prompt
        .passages
        .iter()
        .flat_map(|p| sentences(&p.text))
        .collect();
    let mut scored: Vec<(usize, usize)> = candidates
        .iter()
        .enumerate()
        .map(|(i, s)| (i, terms(s).intersection(&question).count()))
        .filter(|(_, score)| *score > 0)
        .collect();

    if scored.is_empty() {
        return NO_ANSWER.to_string();
    }

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(MAX_SENTENCES);
    scored.sort_by_key(|(i, _)| *i);

    let mut words: Vec<&str> = Vec::new();
    for (i, _) in &scored {
        for w in candidates[*i].split_whitespace() {
            if words.len() >= max_words {
                break;
            }
            words.push(w);
        }
    }
    words.join(" ")
}

#[async_trait]
impl LanguageModel for ExtractiveModel {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn complete(&self, prompt: &Prompt, params: &GenerationParams) -> Result<String> {
        Ok(extract_answer(prompt, params.max_tokens as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::Passage;

    fn prompt(question: &str, passages: &[&str]) -> Prompt {
        Prompt {
            system: String::new(),
            passages: passages
                .iter()
                .map(|t| Passage {
                    source: "doc.md".to_string(),
                    text: t.to_string(),
                })
                .collect(),
            history: Vec::new(),
            question: question.to_string(),
        }
    }

    #[test]
    fn test_sentence_split() {
        let s = sentences("First one. Second!\nThird line without stop\n\n  ?? ");
        assert_eq!(s, vec!["First one.", "Second!", "Third line without stop"]);
    }

    #[test]
    fn test_picks_overlapping_sentences_in_order() {
        let p = prompt(
            "When should infants get the measles vaccine?",
            &[
                "Bathe newborns two or three times a week. The measles vaccine is given at 12 months.",
                "Infants get a second measles vaccine dose at age four.",
            ],
        );
        let answer = extract_answer(&p, 200);
        assert!(answer.starts_with("The measles vaccine is given at 12 months."));
        assert!(answer.contains("second measles vaccine dose"));
        assert!(!answer.contains("Bathe"));
    }

    #[test]
    fn test_no_overlap_says_unknown() {
        let p = prompt("quantum chromodynamics", &["Burp the baby after feeding."]);
        assert_eq!(extract_answer(&p, 50), NO_ANSWER);
        assert_eq!(extract_answer(&prompt("anything", &[]), 50), NO_ANSWER);
    }

    #[test]
    fn test_word_cap() {
        let p = prompt("fever", &["Fever is common in children and usually harmless in most cases."]);
        assert_eq!(extract_answer(&p, 3), "Fever is common");
    }

    #[tokio::test]
    async fn test_deterministic_across_temperatures() {
        let p = prompt("sleep safety", &["Place babies on their back to sleep. Keep cribs empty for safety."]);
        let model = ExtractiveModel::new();
        let cold = GenerationParams { max_tokens: 64, temperature: 0.0, top_p: 1.0 };
        let hot = GenerationParams { temperature: 1.5, ..cold };
        let a = model.complete(&p, &cold).await.unwrap();
        let b = model.complete(&p, &cold).await.unwrap();
        let c = model.complete(&p, &hot).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }
}
