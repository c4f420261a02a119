//! Validated MAC address type.
//!
//! Sources report MAC addresses in whatever form their vendor API uses:
//! colon-separated, dash-separated, Cisco dot-grouped, or bare hex. The
//! matcher compares only normalized values, so every MAC entering the engine
//! goes through `MacAddr`, which normalizes to uppercase colon-separated
//! octets and rejects malformed input.

use std::fmt;
use thiserror::Error;

/// Errors that can occur when parsing a MAC address.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacParseError {
    /// The input is empty.
    #[error("MAC address cannot be empty")]
    Empty,

    /// The input does not contain exactly six octets of hex.
    #[error("MAC address '{0}' does not contain exactly 6 octets")]
    WrongLength(String),

    /// The input contains a non-hex character outside the accepted
    /// separators.
    #[error("MAC address '{input}' contains invalid character '{found}'")]
    InvalidCharacter { input: String, found: char },
}

/// A validated MAC address, normalized to uppercase colon-separated octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Parses a MAC address from any common textual form.
    ///
    /// Accepted separators are `:`, `-`, and `.`; separators may also be
    /// omitted entirely (bare 12-digit hex). The grouping does not have to
    /// be uniform as long as exactly twelve hex digits remain.
    pub fn parse(input: &str) -> Result<Self, MacParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(MacParseError::Empty);
        }

        let mut digits = Vec::with_capacity(12);
        for c in trimmed.chars() {
            match c {
                ':' | '-' | '.' => continue,
                c if c.is_ascii_hexdigit() => digits.push(c),
                found => {
                    return Err(MacParseError::InvalidCharacter {
                        input: trimmed.to_string(),
                        found,
                    })
                }
            }
        }

        if digits.len() != 12 {
            return Err(MacParseError::WrongLength(trimmed.to_string()));
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            let hi = digits[2 * i].to_digit(16).unwrap_or(0) as u8;
            let lo = digits[2 * i + 1].to_digit(16).unwrap_or(0) as u8;
            *octet = (hi << 4) | lo;
        }
        Ok(Self(octets))
    }

    /// The raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl std::str::FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
