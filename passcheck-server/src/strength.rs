//! Five-rule password strength heuristic.
//!
//! Each rule is worth one point. The score picks one of six fixed categories
//! and every failed rule adds one suggestion, in rule order.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Characters that satisfy the special-character rule.
pub const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Minimum length, in characters, for the length rule.
pub const MIN_LENGTH: usize = 8;

/// Highest possible score.
pub const MAX_SCORE: u8 = 5;

/// Any Unicode decimal digit (category Nd), not just ASCII `0-9`.
static DIGIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d").expect("digit pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Category {
    #[serde(rename = "Very Weak")]
    VeryWeak,
    #[serde(rename = "Weak")]
    Weak,
    #[serde(rename = "Medium")]
    Medium,
    #[serde(rename = "Strong")]
    Strong,
    #[serde(rename = "Very Strong")]
    VeryStrong,
    #[serde(rename = "Excellent")]
    Excellent,
}

/// Categories indexed by score.
pub const CATEGORIES: [Category; 6] = [
    Category::VeryWeak,
    Category::Weak,
    Category::Medium,
    Category::Strong,
    Category::VeryStrong,
    Category::Excellent,
];

impl Category {
    /// Looks up the category for a score. Scores past the table clamp to the
    /// last category.
    pub fn from_score(score: u8) -> Self {
        CATEGORIES.get(score as usize).copied().unwrap_or(Category::Excellent)
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::VeryWeak => "Very Weak",
            Category::Weak => "Weak",
            Category::Medium => "Medium",
            Category::Strong => "Strong",
            Category::VeryStrong => "Very Strong",
            Category::Excellent => "Excellent",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

struct Rule {
    check: fn(&str) -> bool,
    suggestion: &'static str,
}

const RULES: [Rule; 5] = [
    Rule {
        check: |p| p.chars().count() >= MIN_LENGTH,
        suggestion: "Use at least 8 characters.",
    },
    Rule {
        check: |p| DIGIT.is_match(p),
        suggestion: "Add at least one number.",
    },
    Rule {
        check: |p| p.chars().any(|c| c.is_ascii_uppercase()),
        suggestion: "Add at least one uppercase letter.",
    },
    Rule {
        check: |p| p.chars().any(|c| c.is_ascii_lowercase()),
        suggestion: "Add at least one lowercase letter.",
    },
    Rule {
        check: |p| p.chars().any(|c| SPECIAL_CHARS.contains(c)),
        suggestion: "Add at least one special character (!@#$...).",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strength {
    pub score: u8,
    pub category: Category,
    pub suggestions: Vec<&'static str>,
}

/// Scores a password. Total over all inputs, the empty string included.
pub fn evaluate(password: &str) -> Strength {
    let mut score = 0u8;
    let mut suggestions = Vec::new();

    for rule in &RULES {
        if (rule.check)(password) {
            score += 1;
        } else {
            suggestions.push(rule.suggestion);
        }
    }

    Strength { score, category: Category::from_score(score), suggestions }
}
