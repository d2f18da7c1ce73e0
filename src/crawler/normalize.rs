//! # Text Normalization
//!
//! Canonicalizes strings pulled out of a page before they are stored.
//! Typographic quotes, dashes and ellipses are folded into ASCII forms,
//! whitespace around punctuation is tidied, and every double quote becomes a
//! single quote so stored text can be embedded in JSON or CSV without escaping
//! surprises.
//!
//! The rule families follow the Moses punctuation normalizer. Language
//! selection only affects the quote-before-comma rule and the digit separator
//! used in place of non-breaking spaces. Czech and unlisted languages have
//! no quote-before-comma rule, so their quotes stay where they are.
//!
//! Normalization is idempotent: one pass is re-applied until the output stops
//! changing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const NBSP: &str = "\u{00A0}";

/// Upper bound on fixpoint passes; real inputs settle in two or three
const MAX_PASSES: usize = 16;

const NO_RULES: &[Rule] = &[];

/// Language whose punctuation conventions are applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    /// English
    #[default]
    En,
    /// German
    De,
    /// Spanish
    Es,
    /// French
    Fr,
    /// Czech
    Cs,
    /// Anything else
    Other,
}

#[derive(Debug)]
enum Rule {
    Literal(&'static str, &'static str),
    Pattern(Regex, &'static str),
}

impl Rule {
    fn pattern(pattern: &str, replacement: &'static str) -> Self {
        Rule::Pattern(
            Regex::new(pattern).expect("normalizer patterns are valid"),
            replacement,
        )
    }

    fn apply(&self, text: String) -> String {
        match self {
            Rule::Literal(from, to) => {
                if text.contains(from) {
                    text.replace(from, to)
                } else {
                    text
                }
            }
            Rule::Pattern(regex, to) => {
                if regex.is_match(&text) {
                    regex.replace_all(&text, *to).into_owned()
                } else {
                    text
                }
            }
        }
    }
}

fn common_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            // Extra whitespace
            Rule::Literal("\r", ""),
            Rule::Literal("(", " ("),
            Rule::Literal(")", ") "),
            Rule::pattern(r" +", " "),
            Rule::pattern(r"\) ([.!:?;,])", ")${1}"),
            Rule::Literal("( ", "("),
            Rule::Literal(" )", ")"),
            Rule::pattern(r"(\d) %", "${1}%"),
            Rule::Literal(" :", ":"),
            Rule::Literal(" ;", ";"),
            // Backticks and doubled apostrophes
            Rule::Literal("`", "'"),
            Rule::Literal("''", " \" "),
            // Unicode quotes, dashes and ellipses
            Rule::Literal("„", "\""),
            Rule::Literal("“", "\""),
            Rule::Literal("”", "\""),
            Rule::Literal("–", "-"),
            Rule::Literal("—", " - "),
            Rule::pattern(r" +", " "),
            Rule::Literal("´", "'"),
            Rule::pattern(r"([a-zA-Z])‘([a-zA-Z])", "${1}'${2}"),
            Rule::pattern(r"([a-zA-Z])’([a-zA-Z])", "${1}'${2}"),
            Rule::Literal("‘", "'"),
            Rule::Literal("‚", "'"),
            Rule::Literal("’", "'"),
            Rule::Literal("''", "\""),
            Rule::Literal("´´", "\""),
            Rule::Literal("…", "..."),
            // French guillemets
            Rule::Literal("\u{00A0}«\u{00A0}", "\""),
            Rule::Literal("«\u{00A0}", "\""),
            Rule::Literal("«", "\""),
            Rule::Literal("\u{00A0}»\u{00A0}", "\""),
            Rule::Literal("\u{00A0}»", "\""),
            Rule::Literal("»", "\""),
            // Pseudo spaces
            Rule::Literal("\u{00A0}%", "%"),
            Rule::Literal("nº\u{00A0}", "nº "),
            Rule::Literal("\u{00A0}:", ":"),
            Rule::Literal("\u{00A0}ºC", " ºC"),
            Rule::Literal("\u{00A0}cm", " cm"),
            Rule::Literal("\u{00A0}?", "?"),
            Rule::Literal("\u{00A0}!", "!"),
            Rule::Literal("\u{00A0};", ";"),
            Rule::Literal(",\u{00A0}", ", "),
            Rule::pattern(r" +", " "),
        ]
    })
}

fn english_quote_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| vec![Rule::pattern(r#""([,.]+)"#, "${1}\"")])
}

fn romance_quote_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            Rule::Literal(",\"", "\","),
            // A period at the very end of a sentence stays put
            Rule::pattern(r#"(\.+)"(\s*[^<])"#, "\"${1}${2}"),
        ]
    })
}

fn decimal_comma_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| vec![Rule::pattern(&format!(r"(\d){NBSP}(\d)"), "${1},${2}")])
}

fn decimal_point_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| vec![Rule::pattern(&format!(r"(\d){NBSP}(\d)"), "${1}.${2}")])
}

/// Punctuation normalizer for extracted page text
#[derive(Debug, Clone, Copy, Default)]
pub struct TextNormalizer {
    lang: Lang,
}

impl TextNormalizer {
    /// Create a normalizer for the given language
    pub fn new(lang: Lang) -> Self {
        Self { lang }
    }

    /// Language this normalizer applies
    pub fn lang(&self) -> Lang {
        self.lang
    }

    /// Normalize punctuation, unify quotes and trim surrounding whitespace.
    ///
    /// `normalize(normalize(x)) == normalize(x)` for every input.
    pub fn normalize(&self, text: &str) -> String {
        let mut current = self.pass(text);
        for _ in 0..MAX_PASSES {
            let next = self.pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn pass(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in self.rules() {
            out = rule.apply(out);
        }
        out.replace('"', "'").trim().to_string()
    }

    fn rules(&self) -> impl Iterator<Item = &'static Rule> {
        let quotes: &'static [Rule] = match self.lang {
            Lang::En => english_quote_rules(),
            Lang::De | Lang::Es | Lang::Fr => romance_quote_rules(),
            Lang::Cs | Lang::Other => NO_RULES,
        };
        let numbers = match self.lang {
            Lang::De | Lang::Es | Lang::Fr | Lang::Cs => decimal_comma_rules(),
            Lang::En | Lang::Other => decimal_point_rules(),
        };
        common_rules().iter().chain(quotes).chain(numbers)
    }
}

/// Normalize text with English punctuation rules
pub fn normalize_text(text: &str) -> String {
    TextNormalizer::new(Lang::En).normalize(text)
}
