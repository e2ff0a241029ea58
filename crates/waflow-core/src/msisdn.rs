// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone number (MSISDN) normalization.
//!
//! Clients are stored under `+` followed by digits only. The gateway wire
//! format drops the `+`.

/// E.164 allows at most 15 digits.
const MAX_DIGITS: usize = 15;
const MIN_DIGITS: usize = 6;

/// Normalizes a phone number to `+<digits>`.
///
/// Spaces, dashes, dots, and parentheses are dropped, as is a leading `00`
/// international prefix. Returns `None` for anything else that is not a digit
/// or for implausible lengths.
pub fn normalize_msisdn(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let rest = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let mut digits = String::with_capacity(rest.len());
    for ch in rest.chars() {
        match ch {
            '0'..='9' => digits.push(ch),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return None,
        }
    }
    if !trimmed.starts_with('+')
        && let Some(stripped) = digits.strip_prefix("00")
    {
        digits = stripped.to_string();
    }

    if (MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
        Some(format!("+{digits}"))
    } else {
        None
    }
}

/// Digits-only form used on the gateway wire.
pub fn wire_msisdn(msisdn: &str) -> String {
    msisdn.chars().filter(char::is_ascii_digit).collect()
}
