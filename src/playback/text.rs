//! Text clean-up before it reaches a voice

use crate::session::Language;

/// Strip leading markdown structure from one line
fn strip_line_markup(line: &str) -> &str {
    let line = line.trim_start();
    let line = line.trim_start_matches('#').trim_start();
    for bullet in ["- ", "* ", "+ ", "> "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return rest;
        }
    }
    // "1. item"
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix(". ") {
            return rest;
        }
    }
    line
}

/// Make agent text speakable: drop markdown, expand a few symbols for
/// English, keep sentence punctuation, collapse whitespace
pub fn prepare_for_speech(text: &str, language: Language) -> String {
    let mut result = text
        .lines()
        .map(strip_line_markup)
        .collect::<Vec<_>>()
        .join(" ");

    result = result.replace(['*', '_', '`'], "");

    if language == Language::English {
        for (symbol, spoken) in [
            ("&", " and "),
            ("%", " percent"),
            ("@", " at "),
            ("+", " plus "),
            ("e.g.", "for example"),
            ("i.e.", "that is"),
            ("etc.", "etcetera"),
        ] {
            result = result.replace(symbol, spoken);
        }
    }

    result = result
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || ".,!?;:'-\"،؟".contains(*c))
        .collect();

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
