//! Canned replies for greetings and small talk. These short-circuit retrieval.

use regex::Regex;

/// `(phrases, reply)` in priority order; the first rule with a matching
/// phrase answers.
const RULES: &[(&[&str], &str)] = &[
    (&["hi", "hello", "hey"], "Hello. How may I assist you today?"),
    (&["how are you"], "I'm functioning smoothly. How can I help you today?"),
    (&["thank you", "thanks"], "You're most welcome!"),
    (&["tell me a joke"], "Why do programmers hate nature? Too many bugs!"),
    (&["do you sleep"], "I never sleep. I'm always on call for your questions!"),
    (&["great job", "well done"], "Thank you! I strive to be helpful."),
    (
        &["are you real", "are you a human"],
        "I\u{2019}m not human \u{2014} just an AI assistant trained to help you understand documents.",
    ),
    (
        &["who are you", "your name"],
        "I\u{2019}m a document assistant built to answer questions based on uploaded files.",
    ),
    (
        &["what can you do", "help"],
        "You may upload a document, and then ask any question related to its content.",
    ),
    (&["bye", "goodbye"], "Goodbye. Feel free to return anytime."),
    (
        &["what is your purpose"],
        "My purpose is to assist you with questions about your documents. Just upload a file and ask away!",
    ),
];

struct Rule {
    patterns: Vec<Regex>,
    reply: &'static str,
}

pub struct SmallTalk {
    rules: Vec<Rule>,
}

impl Default for SmallTalk {
    fn default() -> Self { Self::new() }
}

impl SmallTalk {
    pub fn new() -> Self {
        let rules = RULES
            .iter()
            .map(|&(phrases, reply)| Rule {
                // Escaped literals always compile.
                patterns: phrases
                    .iter()
                    .filter_map(|p| Regex::new(&format!(r"\b{}\b", regex::escape(p))).ok())
                    .collect(),
                reply,
            })
            .collect();
        Self { rules }
    }

    /// The canned reply for `query`, if any phrase occurs in it as whole words.
    pub fn reply(&self, query: &str) -> Option<&'static str> {
        let query = query.trim().to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.patterns.iter().any(|re| re.is_match(&query)))
            .map(|rule| rule.reply)
    }
}
