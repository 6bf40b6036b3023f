//! # Utility Functions Module
//!
//! Funzioni di utilità condivise dal client.
//!
//! ## Responsabilità:
//! - Costruzione dei vettori di argomenti per i tool esterni (`args!`)
//! - Timestamp in millisecondi per i nomi file generati

use std::time::{SystemTime, UNIX_EPOCH};

/// Converts an iterable of string-like items to `Vec<String>`.
///
/// Used to build argument lists for external probes without a `.to_string()`
/// on every element.
///
/// # Example
/// ```rust,ignore
/// let args = to_string_vec(["-v", "quiet", "-show_format"]);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Builds an argument vector from mixed expressions.
///
/// # Example
/// ```rust,ignore
/// let path = "/tmp/out.mp4";
/// let args = args!["-v", "quiet", "-print_format", "json", path];
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        $crate::utils::to_string_vec([$(($item).to_string()),*])
    };
}

/// Milliseconds since the Unix epoch
pub fn unix_timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
