//! Password hashing with PBKDF2-HMAC-SHA256.
//!
//! Hashes are stored as `pbkdf2-sha256$<iterations>$<salt>$<hash>` where salt
//! and hash are base64 encoded. Storing the iteration count with each hash
//! lets us raise it later without invalidating existing passwords.

use std::num::NonZeroU32;

use aws_lc_rs::pbkdf2;

use crate::util::{base64decode, base64encode, gen_random_bytes_crypto};


/// Passwords shorter than this are rejected by `createUser` and `updateUser`.
pub(crate) const MIN_LENGTH: usize = 8;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;


/// Returns `true` if the password is long enough. Length is measured in
/// characters, not bytes.
pub(crate) fn is_long_enough(password: &str) -> bool {
    password.chars().count() >= MIN_LENGTH
}

/// Hashes `password` with a fresh random salt.
pub(crate) fn hash(password: &str, iterations: NonZeroU32) -> String {
    let salt = gen_random_bytes_crypto::<SALT_LEN>();
    let mut out = [0u8; HASH_LEN];
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, iterations, &salt, password.as_bytes(), &mut out);

    format!("{SCHEME}${iterations}${}${}", base64encode(salt), base64encode(out))
}

/// Checks `password` against a hash previously created by [`hash`]. Stored
/// values that cannot be parsed never match.
pub(crate) fn verify(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Ok(iterations) = iterations.parse::<NonZeroU32>() else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (base64decode(salt), base64decode(hash)) else {
        return false;
    };

    pbkdf2::verify(pbkdf2::PBKDF2_HMAC_SHA256, iterations, &salt, password.as_bytes(), &hash).is_ok()
}


#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;

    fn iterations() -> NonZeroU32 {
        NonZeroU32::new(1_000).unwrap()
    }

    #[test]
    fn correct_password_verifies() {
        let stored = hash("correct horse battery", iterations());
        assert!(stored.starts_with("pbkdf2-sha256$1000$"));
        assert!(verify("correct horse battery", &stored));
        assert!(!verify("correct horse battery ", &stored));
        assert!(!verify("", &stored));
    }

    #[test]
    fn salts_differ() {
        let a = hash("hunter2hunter2", iterations());
        let b = hash("hunter2hunter2", iterations());
        assert_ne!(a, b);
        assert!(verify("hunter2hunter2", &a));
        assert!(verify("hunter2hunter2", &b));
    }

    #[test]
    fn garbage_never_matches() {
        for stored in ["", "password123", "pbkdf2-sha256$0$AAAA$AAAA", "bcrypt$10$x$y", "pbkdf2-sha256$10$!!$!!"] {
            assert!(!verify("password123", stored), "'{stored}' matched");
        }
    }

    #[test]
    fn minimum_length() {
        assert!(!is_long_enough(""));
        assert!(!is_long_enough("1234567"));
        assert!(is_long_enough("12345678"));
        assert!(is_long_enough("ümläüte!"));
    }
}
