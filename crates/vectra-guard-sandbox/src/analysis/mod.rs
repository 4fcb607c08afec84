//! Static risk analysis of commands and shell scripts.
//!
//! Line-based pattern matching, deliberately conservative: a pattern matches
//! if it appears lexically, regardless of quoting. False positives are
//! preferred over false negatives.

mod rules;
mod scanner;
mod types;

pub use scanner::CommandScanner;
pub use types::{codes, risk_level, Finding};
