//! Symbol normalization and the capped, first-seen-order vocabulary.

use hashbrown::HashMap;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Used when the text contributes no symbols at all.
pub const FALLBACK_SYMBOLS: [char; 3] = ['a', 'b', ' '];

#[inline]
pub fn is_allowed_symbol(c: char) -> bool {
    c == ' ' || c.is_ascii_lowercase()
}

/// Lowercase, then keep only `a..=z` and space.
pub fn normalize(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .filter(|&c| is_allowed_symbol(c))
        .collect()
}

/// Display form for matrix labels; a bare space is invisible in a header.
pub fn symbol_label(c: char) -> String {
    if c == ' ' {
        "␠".to_string()
    } else {
        c.to_string()
    }
}

/// Ordered set of symbols labelling the rows and columns of a count matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Vocabulary {
    symbols: Vec<char>,
    #[cfg_attr(feature = "serde", serde(skip))]
    index: HashMap<char, usize>,
    /// Distinct symbols of the text that did not fit under the cap.
    skipped_symbols: usize,
    fallback: bool,
}

impl Vocabulary {
    /// Build from already-normalized text: unique symbols in first-seen order,
    /// at most `limit` of them. Falls back to [`FALLBACK_SYMBOLS`] when nothing
    /// survives.
    pub fn from_normalized(text: &str, limit: usize) -> Self {
        let mut symbols = Vec::new();
        let mut index = HashMap::new();
        let mut overflow: Vec<char> = Vec::new();

        for c in text.chars() {
            if index.contains_key(&c) || overflow.contains(&c) {
                continue;
            }
            if symbols.len() < limit {
                index.insert(c, symbols.len());
                symbols.push(c);
            } else {
                overflow.push(c);
            }
        }

        if symbols.is_empty() {
            let mut v = Self::from_symbols(&FALLBACK_SYMBOLS);
            v.skipped_symbols = overflow.len();
            v.fallback = true;
            return v;
        }

        Self {
            symbols,
            index,
            skipped_symbols: overflow.len(),
            fallback: false,
        }
    }

    fn from_symbols(symbols: &[char]) -> Self {
        let index = symbols.iter().enumerate().map(|(i, &c)| (c, i)).collect();
        Self {
            symbols: symbols.to_vec(),
            index,
            skipped_symbols: 0,
            fallback: false,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    #[inline]
    pub fn index_of(&self, c: char) -> Option<usize> {
        self.index.get(&c).copied()
    }

    pub fn symbol(&self, idx: usize) -> Option<char> {
        self.symbols.get(idx).copied()
    }

    pub fn skipped_symbols(&self) -> usize {
        self.skipped_symbols
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn labels(&self) -> Vec<String> {
        self.symbols.iter().copied().map(symbol_label).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_everything_outside_the_alphabet() {
        assert_eq!(normalize("Hello, World!\n42"), "hello world");
        assert_eq!(normalize("ÀÉ-_"), "");
    }

    #[test]
    fn vocabulary_keeps_first_seen_order() {
        let v = Vocabulary::from_normalized("hello world", 12);
        assert_eq!(v.symbols(), &['h', 'e', 'l', 'o', ' ', 'w', 'r', 'd']);
        assert_eq!(v.index_of('o'), Some(3));
        assert_eq!(v.index_of('z'), None);
        assert_eq!(v.skipped_symbols(), 0);
        assert!(!v.is_fallback());
    }

    #[test]
    fn vocabulary_cap_counts_overflow() {
        let v = Vocabulary::from_normalized("abcdefg", 4);
        assert_eq!(v.symbols(), &['a', 'b', 'c', 'd']);
        assert_eq!(v.skipped_symbols(), 3);
    }

    #[test]
    fn empty_text_falls_back() {
        let v = Vocabulary::from_normalized("", 12);
        assert_eq!(v.symbols(), &FALLBACK_SYMBOLS);
        assert!(v.is_fallback());

        let zero_cap = Vocabulary::from_normalized("xyz", 0);
        assert_eq!(zero_cap.symbols(), &FALLBACK_SYMBOLS);
        assert_eq!(zero_cap.skipped_symbols(), 3);
    }

    #[test]
    fn space_gets_a_visible_label() {
        let v = Vocabulary::from_normalized("a b", 12);
        assert_eq!(v.labels(), vec!["a", "␠", "b"]);
    }
}
