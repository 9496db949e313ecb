//! Phone numbers used as login identifiers.

use crate::domain::ValidationError;

const MIN_DIGITS: usize = 10;
const MAX_DIGITS: usize = 15;

/// Normalizes to `+<digits>`.
///
/// Accepts digits, spaces, `-`, `(`, `)` and a single leading `+`. A bare 11-digit
/// number starting with `8` is the domestic form of `+7`.
pub fn normalize_phone(raw: &str) -> Result<String, ValidationError> {
    let invalid = || ValidationError::InvalidPhone(raw.to_string());
    let trimmed = raw.trim();
    let (has_plus, body) = match trimmed.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let mut digits = String::with_capacity(body.len());
    for c in body.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '(' | ')' => {}
            _ => return Err(invalid()),
        }
    }
    if !has_plus && digits.len() == 11 && digits.starts_with('8') {
        digits.replace_range(0..1, "7");
    }
    if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
        return Err(invalid());
    }
    Ok(format!("+{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_numbers_normalize() {
        assert_eq!(normalize_phone("+7 999 000-00-00").unwrap(), "+79990000000");
        assert_eq!(normalize_phone("8 (999) 000-00-00").unwrap(), "+79990000000");
        assert_eq!(normalize_phone("  +44 20 7946 0958 ").unwrap(), "+442079460958");
    }

    #[test]
    fn plus_eight_is_kept() {
        assert_eq!(normalize_phone("+8 999 000 00 00").unwrap(), "+89990000000");
    }

    #[test]
    fn garbage_is_rejected() {
        for raw in ["", "abc", "+7 999 000", "12345678901234567", "+7 999 000-00-0x", "++79990000000"] {
            assert_eq!(
                normalize_phone(raw),
                Err(ValidationError::InvalidPhone(raw.to_string())),
                "{raw}"
            );
        }
    }
}
