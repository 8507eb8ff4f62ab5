//! Key combination model.
//!
//! This module provides:
//! - `KeyCombination` - A modifier set plus one primary key, with a canonical string form
//! - `ParseError` - Structured errors for malformed combination strings
//! - `Key` / `Modifiers` - The building blocks and their OS key-code mapping
//!
//! # Example
//!
//! ```
//! use hotkey_dispatch::keys::KeyCombination;
//!
//! let combo: KeyCombination = "alt + ctrl + space".parse().unwrap();
//! assert_eq!(combo.to_string(), "Ctrl+Alt+Space");
//! assert!(!combo.is_reserved());
//! assert!(KeyCombination::parse("LWin").unwrap().is_reserved());
//! ```

mod combination;
mod types;


pub use combination::{normalize, KeyCombination, ParseError};
pub use types::{canonicalize_key, Key, Modifiers, Platform};
