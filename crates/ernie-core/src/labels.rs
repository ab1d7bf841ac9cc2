//! BIO tag table for token classification.
//!
//! The token classification head predicts one of seven tags per token:
//! `O` at index 0, then a `B-`/`I-` pair for each of PER, ORG and LOC.
//! Begin tags sit at the odd indices and their inside tags directly after.

/// Tags in the order the classification head emits them.
pub const TOKEN_CLS_TAGS: [&str; 7] = ["O", "B-PER", "I-PER", "B-ORG", "I-ORG", "B-LOC", "I-LOC"];

/// Index of the outside tag.
pub const OUTSIDE: usize = 0;

/// Ordered tag table, built once and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    tags: &'static [&'static str],
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::token_cls()
    }
}

impl LabelSet {
    /// The fixed `O, B-PER, I-PER, B-ORG, I-ORG, B-LOC, I-LOC` table.
    pub fn token_cls() -> Self {
        Self {
            tags: &TOKEN_CLS_TAGS,
        }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Tag string at `index`, if it is part of the table.
    pub fn tag(&self, index: usize) -> Option<&'static str> {
        self.tags.get(index).copied()
    }

    /// Whether `index` opens a span (indices 1, 3 and 5).
    ///
    /// Indices outside the table never open a span.
    pub fn is_begin(&self, index: usize) -> bool {
        index != OUTSIDE && index % 2 == 1 && index < self.tags.len()
    }

    /// Entity type for a begin tag: the tag with its `B-` prefix removed.
    pub fn entity_type(&self, index: usize) -> Option<&'static str> {
        self.tag(index).map(|t| t.get(2..).unwrap_or(""))
    }
}
