//! Parse strategies for raw device responses

use regex::Regex;
use std::sync::OnceLock;

use super::DeviceError;

/// Turns one raw response into a numeric value
pub trait ReadParser {
    /// Decode one response into its primary value
    fn parse(&self, word: &str) -> Result<f64, DeviceError>;
}

impl<F> ReadParser for F
where
    F: Fn(&str) -> Result<f64, DeviceError>,
{
    fn parse(&self, word: &str) -> Result<f64, DeviceError> {
        self(word)
    }
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?").expect("number pattern is valid")
    })
}

/// Every decimal number in `text`, in order of appearance
pub fn numbers(text: &str) -> Vec<f64> {
    number_pattern()
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

/// The first decimal number in `text`
pub fn first_number(text: &str) -> Result<f64, DeviceError> {
    numbers(text)
        .first()
        .copied()
        .ok_or_else(|| DeviceError::parse(text, "no numeric value"))
}

/// The whole trimmed response as a number
pub fn plain_number(text: &str) -> Result<f64, DeviceError> {
    text.trim()
        .parse::<f64>()
        .map_err(|e| DeviceError::parse(text, e.to_string()))
}
