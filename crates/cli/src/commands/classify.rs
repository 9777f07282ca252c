//! `careclaw classify`: Print the priority the classifier assigns.

use careclaw_agent::{KeywordClassifier, PriorityClassifier};
use careclaw_config::AppConfig;

pub fn run(config: &AppConfig, text: &str) {
    let classifier = KeywordClassifier::from_config(&config.classifier);
    println!("{}", classifier.classify(text));
}
