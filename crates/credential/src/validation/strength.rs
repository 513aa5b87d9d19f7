//! Password strength scoring

use std::collections::{HashMap, HashSet};

/// Fixed sequences whose 3-character windows count as predictable
const SEQUENCES: &[&str] = &[
    "abcdefghijklmnopqrstuvwxyz",
    "0123456789",
    "qwertyuiop",
    "asdfghjkl",
    "zxcvbnm",
];

const SEQUENCE_WINDOW: usize = 3;
const PATTERN_PENALTY: f64 = 5.0;

/// Character classes present in a password
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CharClasses {
    pub lowercase: bool,
    pub uppercase: bool,
    pub digit: bool,
    pub special: bool,
}

impl CharClasses {
    pub(crate) fn of(password: &str) -> Self {
        let mut classes = Self::default();
        for c in password.chars() {
            if c.is_ascii_lowercase() {
                classes.lowercase = true;
            } else if c.is_ascii_uppercase() {
                classes.uppercase = true;
            } else if c.is_ascii_digit() {
                classes.digit = true;
            } else {
                classes.special = true;
            }
        }
        classes
    }

    pub(crate) fn count(self) -> u32 {
        u32::from(self.lowercase)
            + u32::from(self.uppercase)
            + u32::from(self.digit)
            + u32::from(self.special)
    }
}

/// Shannon entropy in bits per character of the character distribution
pub fn shannon_entropy(password: &str) -> f64 {
    let len = password.chars().count();
    if len == 0 {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in password.chars() {
        *freq.entry(c).or_default() += 1;
    }

    freq.values()
        .map(|&n| {
            let p = n as f64 / len as f64;
            -p * p.log2()
        })
        .sum()
}

/// Number of runs of three or more identical characters
pub(crate) fn repeated_runs(password: &str) -> usize {
    let mut runs = 0;
    let mut current: Option<char> = None;
    let mut length = 0;

    for c in password.chars() {
        if Some(c) == current {
            length += 1;
            if length == 3 {
                runs += 1;
            }
        } else {
            current = Some(c);
            length = 1;
        }
    }
    runs
}

/// Distinct predictable 3-character windows found in the password
pub(crate) fn sequence_hits(password: &str) -> usize {
    let lower = password.to_lowercase();
    let mut hits = HashSet::new();

    for sequence in SEQUENCES {
        let chars: Vec<char> = sequence.chars().collect();
        for window in chars.windows(SEQUENCE_WINDOW) {
            let needle: String = window.iter().collect();
            if lower.contains(&needle) {
                hits.insert(needle);
            }
        }
    }
    hits.len()
}

/// Whether the whole password is one unit repeated two or more times
pub(crate) fn is_whole_repetition(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    let len = chars.len();
    (1..=len / 2)
        .filter(|unit| len % unit == 0)
        .any(|unit| chars.chunks(unit).all(|chunk| chunk == &chars[..unit]))
}

/// Whether some substring of two or more characters is immediately
/// followed by itself
pub(crate) fn has_repeated_substring(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    let len = chars.len();
    (2..=len / 2).any(|unit| {
        (0..=len - 2 * unit).any(|start| chars[start..start + unit] == chars[start + unit..start + 2 * unit])
    })
}

/// Composite strength score in `0..=100`.
///
/// | component   | points                                          |
/// |-------------|-------------------------------------------------|
/// | length      | up to 25, `25 * min(1, len / min_length)`       |
/// | variety     | 10 per character class present                  |
/// | uniqueness  | up to 20, `20 * distinct / len`                 |
/// | patterns    | -5 per repeated run, sequence hit, repetition   |
/// | entropy     | up to 15, `shannon * len / 4`                   |
pub fn strength_score(password: &str, min_length: usize) -> u8 {
    let len = password.chars().count();
    if len == 0 {
        return 0;
    }

    let min_length = min_length.max(1);
    let length_score = 25.0 * (len as f64 / min_length as f64).min(1.0);

    let variety_score = 10.0 * f64::from(CharClasses::of(password).count());

    let distinct = password.chars().collect::<HashSet<_>>().len();
    let uniqueness_score = 20.0 * distinct as f64 / len as f64;

    let mut pattern_hits = repeated_runs(password) + sequence_hits(password);
    if is_whole_repetition(password) {
        pattern_hits += 1;
    }
    let penalty = PATTERN_PENALTY * pattern_hits as f64;

    let entropy_bonus = (shannon_entropy(password) * len as f64 / 4.0).min(15.0);

    let total = length_score + variety_score + uniqueness_score + entropy_bonus - penalty;
    total.round().clamp(0.0, 100.0) as u8
}
