use std::collections::BTreeSet;

use crate::vector::ScoredRecord;

pub const NOT_FOUND_REPLY: &str =
    "I'm sorry, I couldn't find relevant information. Please rephrase your question or upload a more detailed document.";

pub const NO_ANSWER_REPLY: &str =
    "I'm sorry, I couldn't find an answer based on the uploaded document. Try rephrasing your question.";

const EVASIVE_ANSWERS: &[&str] = &["i don't know", "no information available", "not sure"];

/// Every retrieved passage goes into a single prompt.
pub fn stuff_prompt(question: &str, hits: &[ScoredRecord]) -> String {
    let context = hits.iter().map(|h| h.record.text.as_str()).collect::<Vec<_>>().join("\n\n");
    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
         {context}\n\nQuestion: {question}\nHelpful Answer:"
    )
}

pub fn is_evasive(answer: &str) -> bool {
    let normalized = answer.trim().to_lowercase();
    normalized.is_empty() || EVASIVE_ANSWERS.contains(&normalized.as_str())
}

/// Distinct file names of the passages, sorted.
pub fn source_names(hits: &[ScoredRecord]) -> Vec<String> {
    hits.iter()
        .map(|h| {
            h.record
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Unknown".to_string())
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn with_sources(answer: &str, sources: &[String]) -> String {
    format!("{}\n\n**Sources:** {}", answer, sources.join(", "))
}
