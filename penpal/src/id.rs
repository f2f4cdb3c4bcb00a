//! Random identifier generation.
//!
//! Identifiers serve both as request correlation IDs and as default client
//! names. They are fixed-length strings drawn uniformly from the 62-character
//! alphanumeric alphabet (`A-Z`, `a-z`, `0-9`).
//!
//! No uniqueness is enforced: two draws collide with probability `62^-16`.

use rand::distr::Alphanumeric;
use rand::Rng;

/// Length of identifiers produced by [`generate_id`].
pub const ID_LENGTH: usize = 16;

/// Generate a 16-character alphanumeric identifier.
///
/// # Example
///
/// ```rust
/// let id = penpal::id::generate_id();
/// assert_eq!(id.len(), 16);
/// ```
pub fn generate_id() -> String {
    generate_id_with_len(ID_LENGTH)
}

/// Generate an alphanumeric identifier of `len` characters.
pub fn generate_id_with_len(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
