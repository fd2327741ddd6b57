//! Phrase-matched emoji reactions and the dice roller.

use rand::Rng;
use regex::Regex;

/// Built-in phrase table. Patterns are matched case-insensitively.
pub const DEFAULT_REACTIONS: &[(&str, &[&str])] = &[
    (r"buyers?", &["back"]),
    (r"(checks? a box|checking a box)", &["ballot_box_with_check"]),
    (r"click\s?ops", &["three_button_mouse"]),
    (r"delete", &["deleteprod"]),
    (r"does anyone", &["plus1"]),
    (r"#experience.*", &["man-tipping-hand"]),
    (r"\b(tea)\b", &["popcorn"]),
    (r"popcorn", &["tea"]),
    (r"(saddens|saddened)", &["facepalm"]),
    (r"real\s?deal", &["tm"]),
    (r"wait", &["loading"]),
    (r"wheel", &["ferris_wheel"]),
    (r"workplace", &["tr"]),
    (r"(place|house)", &["house"]),
    (r"under (a|the) bus", &["bus"]),
    (r"slow", &["hourglass_flowing_sand"]),
    (r"pizza", &["pineapple"]),
    (r"complicated", &["man-gesturing-no"]),
    (r"(honk|g[oe]{2}se)", &["honk"]),
    (r"(\btp\b|(toilet|bog)\s?(paper|roll))", &["toilet-paper", "shopping_trolley"]),
    (r"animal crossing", &["animal-crossing"]),
    (r"\bnook\b", &["nook"]),
    (r"\bgood bot\b", &["hugging_face"]),
    (r"\bbad bot\b", &["anger"]),
    (r"strong(ly)? ask", &["muscle"]),
    (r"d11s", &["dandy"]),
    (r"\bsage\b", &["sage"]),
    (r"yikes", &["yikes", "plus1"]),
];

#[derive(Debug, Clone)]
pub struct TriggerRule {
    pattern: Regex,
    emojis: Vec<String>,
}

impl TriggerRule {
    pub fn new(pattern: Regex, emojis: Vec<String>) -> Self {
        Self { pattern, emojis }
    }
}

/// Static pattern → emoji table. Every matching rule fires.
#[derive(Debug, Clone, Default)]
pub struct TriggerTable {
    rules: Vec<TriggerRule>,
}

impl TriggerTable {
    pub fn new(rules: Vec<TriggerRule>) -> Self {
        Self { rules }
    }

    /// Emoji to react with, in rule order. Duplicates are kept.
    pub fn apply(&self, text: &str) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|rule| rule.pattern.is_match(text))
            .flat_map(|rule| rule.emojis.iter().map(String::as_str))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

const DIGITS: [&str; 10] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

/// Whether a message asks for a dice roll.
pub fn wants_dice(text: &str) -> bool {
    text.to_lowercase().contains("dice")
}

/// Roll a d20.
pub fn roll_d20<R: Rng>(rng: &mut R) -> u32 {
    rng.gen_range(1..=20)
}

/// One emoji per decimal digit of `roll`.
///
/// Two identical reactions can't sit on one message, so 11 uses the
/// custom `one-again` emoji for its second digit.
pub fn dice_emojis(roll: u32) -> Vec<&'static str> {
    if roll == 11 {
        return vec!["one", "one-again"];
    }
    roll.to_string()
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| DIGITS[d as usize])
        .collect()
}
