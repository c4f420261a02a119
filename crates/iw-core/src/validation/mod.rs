//! Input validation types.

mod mac;

pub use mac::{MacAddr, MacParseError};
