//! Password verification against stored Argon2id hashes.

use argon2::{Argon2, PasswordHash, PasswordVerifier};

use crate::error::AuthError;

/// Check `password` against a PHC-format hash. The pepper, if any, must
/// be the one used when the hash was produced.
///
/// A mismatch is `Ok(false)`; only a malformed hash is an error.
pub fn verify_password(
    password: &str,
    hash: &str,
    pepper: Option<&str>,
) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::Crypto(format!("invalid hash format: {e}")))?;

    let input = match pepper {
        Some(p) => format!("{p}{password}"),
        None => password.to_owned(),
    };

    match Argon2::default().verify_password(input.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Crypto(format!("verify error: {e}"))),
    }
}
