/// Reasons an admin request is refused.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing x-api-key header")]
    Missing,
    #[error("invalid API key")]
    Invalid,
}

/// Validates the provided API key against the key configured at startup.
///
/// The comparison walks the full length of both keys so timing does not reveal the length of a
/// matching prefix.
pub fn validate_api_key(provided: Option<&str>, expected: &str) -> Result<(), AuthError> {
    let provided = provided.ok_or(AuthError::Missing)?;

    let a = provided.as_bytes();
    let b = expected.as_bytes();
    let mut diff = a.len() ^ b.len();
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= usize::from(x ^ y);
    }

    if diff == 0 {
        Ok(())
    } else {
        Err(AuthError::Invalid)
    }
}
