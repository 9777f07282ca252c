//! Priority classification of inbound messages.
//!
//! Classification is a small set of deterministic keyword and pattern
//! rules. It sits behind [`PriorityClassifier`] so the reasoning loop
//! never depends on how a priority was reached.

use std::sync::LazyLock;

use careclaw_config::ClassifierConfig;
use careclaw_core::Priority;
use regex_lite::Regex;

/// Maps message text to a priority.
pub trait PriorityClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Priority;
}

const HIGH_KEYWORDS: [&str; 13] = [
    "urgente",
    "emergencia",
    "importante",
    "crítico",
    "grave",
    "dolor intenso",
    "insoportable",
    "empeorando",
    "sangrado",
    "no puedo",
    "alergia",
    "reacción",
    "adversa",
];

const MEDIUM_KEYWORDS: [&str; 11] = [
    "molestia",
    "dolor",
    "síntoma",
    "diagnóstico",
    "tratamiento",
    "medicamento",
    "terapia",
    "cambio",
    "nuevo",
    "evaluación",
    "cita",
];

static GREETING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"^(hola|buenos días|buenas tardes|buenas noches)\s*[.,!]?$",
        r"^(gracias|muchas gracias|ok|perfecto|entendido)\s*[.,!]?$",
        r"^(sí|no|tal vez|quizás)\s*[.,!]?$",
        r"^(vale|de acuerdo|comprendo)\s*[.,!]?$",
    ])
});

static HIGH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"dol\w+ (fuerte|intens\w+)",
        r"empeo(r\w+|ó)",
        r"no (puedo|puede|logr\w+)",
        r"urg\w+",
        r"sangr\w+",
        r"muri\w+|fallec\w+",
        r"alergi\w+",
        r"(10|9|8)\s*(/|de)\s*10",
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

/// The keyword/pattern classifier.
#[derive(Debug, Clone, Copy)]
pub struct KeywordClassifier {
    /// Messages longer than this (in chars) with no keyword are medium.
    pub long_message_chars: usize,
    /// Only messages shorter than this are checked against greetings.
    pub greeting_max_chars: usize,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            long_message_chars: 25,
            greeting_max_chars: 10,
        }
    }
}

impl KeywordClassifier {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            long_message_chars: config.long_message_chars,
            greeting_max_chars: config.greeting_max_chars,
        }
    }
}

impl PriorityClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Priority {
        let normalized = text.trim().to_lowercase();
        // Thresholds apply to the message as received, padding included.
        let length = text.chars().count();

        if length < self.greeting_max_chars
            && GREETING_PATTERNS.iter().any(|re| re.is_match(&normalized))
        {
            return Priority::Low;
        }

        if HIGH_KEYWORDS.iter().any(|kw| normalized.contains(kw))
            || HIGH_PATTERNS.iter().any(|re| re.is_match(&normalized))
        {
            return Priority::High;
        }

        if MEDIUM_KEYWORDS.iter().any(|kw| normalized.contains(kw)) {
            return Priority::Medium;
        }

        if length > self.long_message_chars {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}
