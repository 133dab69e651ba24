use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// The fixed word list, compiled into the binary and loaded once.
const WORD_LIST: &str = include_str!("moderation_words.txt");

lazy_static! {
    static ref FORBIDDEN_PATTERNS: Vec<(String, Regex)> = WORD_LIST
        .lines()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .map(|word| {
            let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&word)))
                .expect("word patterns compile");

            (word, pattern)
        })
        .collect();
}

/// The result of screening a piece of text
#[derive(Debug, Clone)]
pub struct ModerationVerdict {
    pub flagged: bool,
    /// The offending terms, in word list order
    pub words: Vec<String>,
}

#[derive(Debug, Clone, Error)]
#[error("content contains forbidden words: {}", words.join(", "))]
pub struct ModerationError {
    pub words: Vec<String>,
}

impl ModerationError {
    /// The first offending term, if any
    pub fn first_word(&self) -> Option<&str> {
        self.words.first().map(|w| w.as_str())
    }
}

/// Screens user-authored text against the word list. Stateless after the
/// list is compiled, so it can be shared freely.
#[derive(Debug, Default)]
pub struct ModerationGate;

impl ModerationGate {
    pub fn new() -> Self {
        // Compile the patterns up front instead of on the first message
        lazy_static::initialize(&FORBIDDEN_PATTERNS);
        Self
    }

    pub fn check(&self, text: &str) -> ModerationVerdict {
        let words: Vec<_> = FORBIDDEN_PATTERNS
            .iter()
            .filter(|(_, pattern)| pattern.is_match(text))
            .map(|(word, _)| word.clone())
            .collect();

        ModerationVerdict {
            flagged: !words.is_empty(),
            words,
        }
    }

    /// Returns an error carrying the offending terms if the text is flagged
    pub fn ensure_clean(&self, text: &str) -> Result<(), ModerationError> {
        let verdict = self.check(text);

        if verdict.flagged {
            return Err(ModerationError {
                words: verdict.words,
            });
        }

        Ok(())
    }
}
