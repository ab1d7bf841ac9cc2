//! Raw model inputs: plain text or a pre-tokenized token list.

use serde::{Deserialize, Serialize};

/// One example as the caller supplied it.
///
/// Span positions index into this value: characters for [`RawInput::Text`],
/// list elements for [`RawInput::Tokens`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawInput {
    Text(String),
    /// Words already split by the caller; encoded with `is_split_into_words`.
    Tokens(Vec<String>),
}

impl RawInput {
    /// Split `text` into one token per character.
    pub fn chars(text: &str) -> Self {
        Self::Tokens(text.chars().map(String::from).collect())
    }

    /// Number of addressable positions.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.chars().count(),
            Self::Tokens(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_pretokenized(&self) -> bool {
        matches!(self, Self::Tokens(_))
    }

    /// Text covered by positions `[start, end)`, with token lists concatenated.
    ///
    /// The range is clamped to the input; an empty or inverted range gives `""`.
    pub fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.len());
        if start >= end {
            return String::new();
        }
        match self {
            Self::Text(s) => s.chars().skip(start).take(end - start).collect(),
            Self::Tokens(t) => t[start..end].concat(),
        }
    }
}

impl From<&str> for RawInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RawInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<String>> for RawInput {
    fn from(tokens: Vec<String>) -> Self {
        Self::Tokens(tokens)
    }
}

impl std::fmt::Display for RawInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Tokens(t) => write!(f, "{t:?}"),
        }
    }
}
