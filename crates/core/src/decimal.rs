//! Helpers backing the numeric inputs of the worker and debt forms.
//!
//! Amounts travel between the UI and the backend as loosely typed JSON, so
//! these functions accept numbers, numeric strings with thousands separators,
//! and garbage alike, and never fail.

use serde_json::Value;

/// Maximum number of fractional digits accepted while the user is typing.
pub const MAX_INPUT_FRACTION_DIGITS: usize = 4;

/// Formats a JSON value as a two-decimal string.
///
/// `null`, empty strings, unparseable text and non-finite numbers format as
/// `"0.00"`.
pub fn format_decimal(value: &Value) -> String {
    let number = match value {
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        Value::String(text) => parse_decimal(text),
        _ => 0.0,
    };
    format_amount(number)
}

/// Formats a number with exactly two fractional digits.
pub fn format_amount(value: f64) -> String {
    // -0.0 would otherwise print as "-0.00"
    let value = if value.is_finite() && value != 0.0 {
        value
    } else {
        0.0
    };
    format!("{value:.2}")
}

/// Parses a formatted amount back into a number, `0.0` when invalid.
pub fn parse_decimal(text: &str) -> f64 {
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();
    leading_number(&cleaned)
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}

/// Returns `true` when `text` looks like a decimal number being typed:
/// digits, at most one dot, and no more than four fractional digits.
pub fn is_valid_decimal_input(text: &str) -> bool {
    let (integer, fraction) = match text.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (text, None),
    };

    if !integer.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    match fraction {
        None => true,
        Some(fraction) => {
            fraction.len() <= MAX_INPUT_FRACTION_DIGITS
                && fraction.bytes().all(|b| b.is_ascii_digit())
        }
    }
}

/// Reads the longest numeric prefix of `text`, ignoring leading whitespace.
fn leading_number(text: &str) -> Option<f64> {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let digits_in = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }

    let integer_digits = digits_in(end);
    end += integer_digits;

    let mut fraction_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        fraction_digits = digits_in(end + 1);
        if fraction_digits > 0 {
            end += 1 + fraction_digits;
        }
    }

    if integer_digits == 0 && fraction_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent_end = end + 1;
        if matches!(bytes.get(exponent_end), Some(b'+' | b'-')) {
            exponent_end += 1;
        }
        let exponent_digits = digits_in(exponent_end);
        if exponent_digits > 0 {
            end = exponent_end + exponent_digits;
        }
    }

    trimmed[..end].parse().ok()
}
