//! Identifier validation for accounts, peers, and channel names.
//!
//! Validation happens locally, before any backend request: a rejected
//! identifier costs a reprompt, never a network round trip.

/// Identifiers must be shorter than this many characters.
pub const MAX_IDENT_CHARS: usize = 128;

/// Why an identifier was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentError {
    /// The identifier contains whitespace.
    #[error("must not contain whitespace")]
    Whitespace,

    /// The identifier is empty.
    #[error("must not be empty")]
    Empty,

    /// The identifier is at or over the length limit.
    #[error("is {0} characters long (limit {MAX_IDENT_CHARS})")]
    TooLong(usize),

    /// The identifier names the account that is already logged in.
    #[error("matches the logged-in account")]
    SameAsCurrent,
}

/// Validate an account or channel identifier.
///
/// Rejects identifiers that contain whitespace, are empty, are
/// [`MAX_IDENT_CHARS`] or more characters long, or equal `current` (the
/// active account, when one exists).
///
/// # Errors
///
/// Returns the first [`IdentError`] the identifier violates, in the order
/// listed above.
pub fn validate_ident(ident: &str, current: Option<&str>) -> Result<(), IdentError> {
    if ident.chars().any(char::is_whitespace) {
        return Err(IdentError::Whitespace);
    }
    if ident.is_empty() {
        return Err(IdentError::Empty);
    }
    let len = ident.chars().count();
    if len >= MAX_IDENT_CHARS {
        return Err(IdentError::TooLong(len));
    }
    if current == Some(ident) {
        return Err(IdentError::SameAsCurrent);
    }
    Ok(())
}
