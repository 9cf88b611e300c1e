//! Word hyphenation seam.

use smallvec::{smallvec, SmallVec};

/// Soft hyphen (U+00AD); marks an author-supplied break opportunity.
pub const SOFT_HYPHEN: char = '\u{00AD}';
/// Default cost of breaking at a computed hyphenation point.
pub const DEFAULT_HYPHEN_PENALTY: f64 = 50.0;
/// Default cost of breaking after an explicit `-`.
pub const DEFAULT_EXPLICIT_HYPHEN_PENALTY: f64 = 50.0;

/// One fragment of a hyphenated word.
#[derive(Clone, Debug, PartialEq)]
pub struct HyphenatedPart {
    /// Fragment text without the hyphen.
    pub text: String,
    /// Cost of breaking after this fragment. Ignored for the last one.
    pub penalty: f64,
}

/// Ordered fragments of a word; a single element when no break is allowed.
pub type HyphenatedWord = SmallVec<[HyphenatedPart; 4]>;

/// Hyphenation supplier.
pub trait Hyphenator {
    /// Split `word` at its allowed break points.
    fn hyphenate(&self, word: &str) -> HyphenatedWord;

    /// Cost of breaking after an explicit hyphen character.
    fn explicit_hyphen_penalty(&self) -> f64 {
        DEFAULT_EXPLICIT_HYPHEN_PENALTY
    }
}

/// Never splits words. Soft hyphens are dropped from the output.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHyphenation;

impl Hyphenator for NoHyphenation {
    fn hyphenate(&self, word: &str) -> HyphenatedWord {
        smallvec![HyphenatedPart {
            text: strip_soft_hyphens(word),
            penalty: 0.0,
        }]
    }
}

/// How author soft hyphens are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SoftHyphenPolicy {
    /// Drop them and hyphenate heuristically.
    Ignore,
    /// Use them as the only break opportunities in words that carry them.
    #[default]
    Discretionary,
}

/// Heuristic English hyphenator.
///
/// Breaks at vowel/consonant transitions at least three letters from either
/// end, before common suffixes, and at fixed points for a short exception
/// list. Words shorter than [`min_word_chars`](Self::min_word_chars) are
/// kept whole.
#[derive(Clone, Copy, Debug)]
pub struct EnglishHyphenator {
    /// Cost of each computed break.
    pub penalty: f64,
    /// Cost returned by [`Hyphenator::explicit_hyphen_penalty`].
    pub explicit_penalty: f64,
    /// Shortest word that may be split.
    pub min_word_chars: usize,
    /// Soft-hyphen handling.
    pub soft_hyphens: SoftHyphenPolicy,
}

impl Default for EnglishHyphenator {
    fn default() -> Self {
        Self {
            penalty: DEFAULT_HYPHEN_PENALTY,
            explicit_penalty: DEFAULT_EXPLICIT_HYPHEN_PENALTY,
            min_word_chars: 7,
            soft_hyphens: SoftHyphenPolicy::Discretionary,
        }
    }
}

impl Hyphenator for EnglishHyphenator {
    fn hyphenate(&self, word: &str) -> HyphenatedWord {
        if self.soft_hyphens == SoftHyphenPolicy::Discretionary && word.contains(SOFT_HYPHEN) {
            return word
                .split(SOFT_HYPHEN)
                .filter(|part| !part.is_empty())
                .map(|part| HyphenatedPart {
                    text: part.to_string(),
                    penalty: self.penalty,
                })
                .collect();
        }
        let word = strip_soft_hyphens(word);
        let positions = english_hyphenation_candidates(&word, self.min_word_chars);
        if positions.is_empty() {
            return smallvec![HyphenatedPart {
                text: word,
                penalty: 0.0,
            }];
        }
        let mut parts = HyphenatedWord::new();
        let mut rest = word.as_str();
        let mut consumed = 0usize;
        for position in positions {
            let Some((head, tail)) = split_word_at_char_boundary(rest, position - consumed) else {
                continue;
            };
            parts.push(HyphenatedPart {
                text: head.to_string(),
                penalty: self.penalty,
            });
            consumed = position;
            rest = tail;
        }
        parts.push(HyphenatedPart {
            text: rest.to_string(),
            penalty: 0.0,
        });
        parts
    }

    fn explicit_hyphen_penalty(&self) -> f64 {
        self.explicit_penalty
    }
}

fn strip_soft_hyphens(text: &str) -> String {
    if text.contains(SOFT_HYPHEN) {
        text.chars().filter(|ch| *ch != SOFT_HYPHEN).collect()
    } else {
        text.to_string()
    }
}

fn split_word_at_char_boundary(word: &str, split_chars: usize) -> Option<(&str, &str)> {
    if split_chars == 0 {
        return None;
    }
    let (split_byte, _) = word.char_indices().nth(split_chars)?;
    Some((&word[..split_byte], &word[split_byte..]))
}

fn english_hyphenation_candidates(word: &str, min_chars: usize) -> Vec<usize> {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() < min_chars.max(6) || !chars.iter().all(|c| c.is_ascii_alphabetic()) {
        return Vec::new();
    }
    let mut candidates = Vec::with_capacity(chars.len() / 2);
    if let Some(exception) = english_hyphenation_exception(word) {
        candidates.extend_from_slice(exception);
    } else {
        let is_vowel = |c: char| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        for i in 3..chars.len().saturating_sub(2) {
            let prev = chars[i - 1];
            let next = chars[i];
            // Break before a consonant that starts a new syllable: vowel, consonant, vowel.
            if is_vowel(prev) && !is_vowel(next) && chars.get(i + 1).is_some_and(|c| is_vowel(*c)) {
                candidates.push(i);
            } else if !is_vowel(prev) && !is_vowel(next) && prev != next && i >= 4 {
                // Consonant cluster: split between the two consonants.
                if chars.get(i + 1).is_some_and(|c| is_vowel(*c)) && is_vowel(chars[i - 2]) {
                    candidates.push(i);
                }
            }
        }

        const SUFFIXES: &[&str] = &[
            "tion", "sion", "ment", "ness", "less", "able", "ible", "ally", "ingly", "edly",
            "ing",
        ];
        let lower = word.to_ascii_lowercase();
        for suffix in SUFFIXES {
            if lower.ends_with(suffix) {
                let split = chars.len().saturating_sub(suffix.len());
                if split >= 3 {
                    candidates.push(split);
                }
                break;
            }
        }
    }

    candidates.retain(|&pos| pos >= 2 && pos + 2 <= chars.len());
    candidates.sort_unstable();
    candidates.dedup();
    candidates
}

fn english_hyphenation_exception(word: &str) -> Option<&'static [usize]> {
    let lower = word.to_ascii_lowercase();
    match lower.as_str() {
        "characteristically" => Some(&[4, 6, 9, 12]),
        "accessibility" => Some(&[3, 6, 9]),
        "typesetting" => Some(&[4, 7]),
        "paragraph" => Some(&[4]),
        "paragraphs" => Some(&[4]),
        "algorithm" => Some(&[2, 5]),
        "hyphenation" => Some(&[2, 6]),
        "publication" => Some(&[3, 6]),
        "responsibility" => Some(&[3, 6, 9]),
        "document" => Some(&[3]),
        "language" => Some(&[3]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(word: &HyphenatedWord) -> Vec<&str> {
        word.iter().map(|part| part.text.as_str()).collect()
    }

    #[test]
    fn short_words_stay_whole() {
        let parts = EnglishHyphenator::default().hyphenate("word");
        assert_eq!(texts(&parts), vec!["word"]);
    }

    #[test]
    fn exception_list_drives_split_points() {
        let parts = EnglishHyphenator::default().hyphenate("accessibility");
        assert_eq!(texts(&parts), vec!["acc", "ess", "ibi", "lity"]);
        assert_eq!(parts[0].penalty, DEFAULT_HYPHEN_PENALTY);
    }

    #[test]
    fn parts_reassemble_to_the_word() {
        for word in ["typesetting", "unbelievable", "structure", "Knuth"] {
            let parts = EnglishHyphenator::default().hyphenate(word);
            let joined: String = parts.iter().map(|part| part.text.as_str()).collect();
            assert_eq!(joined, word);
        }
    }

    #[test]
    fn punctuation_blocks_hyphenation() {
        let parts = EnglishHyphenator::default().hyphenate("algorithm,");
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn soft_hyphens_are_authoritative_when_discretionary() {
        let parts = EnglishHyphenator::default().hyphenate("co\u{00AD}operate");
        assert_eq!(texts(&parts), vec!["co", "operate"]);
    }

    #[test]
    fn no_hyphenation_strips_soft_hyphens() {
        let parts = NoHyphenation.hyphenate("co\u{00AD}operate");
        assert_eq!(texts(&parts), vec!["cooperate"]);
    }
}
