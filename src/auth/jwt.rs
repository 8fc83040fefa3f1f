use std::{fmt, time::Duration};

use jsonwebtoken::{
    errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::prelude::*;
use super::{AuthConfig, UserId};


/// The only algorithm we sign and accept.
const ALGORITHM: Algorithm = Algorithm::HS256;

/// Signs and verifies tokens with the shared secret. Created once at startup
/// and shared by all requests.
pub(crate) struct JwtContext {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl JwtContext {
    pub(crate) fn new(config: &AuthConfig) -> Result<Self> {
        let secret = config.jwt_secret.expose_secret();
        if secret.is_empty() {
            bail!("token secret is empty");
        }

        Ok(Self::from_secret(secret.as_bytes(), config.token_lifetime))
    }

    pub(crate) fn from_secret(secret: &[u8], lifetime: Duration) -> Self {
        // `exp` and `nbf` are checked if present, but neither is required.
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims::<&str>(&[]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            lifetime,
        }
    }

    /// Creates a new token for the given user, valid for the configured
    /// lifetime.
    pub(crate) fn issue(&self, user: UserId) -> jsonwebtoken::errors::Result<String> {
        let iat = chrono::Utc::now().timestamp();
        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        let claims = IssuedClaims {
            userid: user.to_string(),
            iat,
            exp: iat.saturating_add(lifetime),
        };

        jsonwebtoken::encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
    }

    /// Checks signature, algorithm, `exp` and `nbf` of the token and returns
    /// the user ID it names.
    pub(crate) fn verify(&self, token: &str) -> Result<UserId, VerifyError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| VerifyError::from(e.into_kind()))?;

        match data.claims.userid {
            Some(UserIdClaim::Number(id)) => Ok(UserId::from(id)),
            Some(UserIdClaim::Text(s)) => s.parse().map_err(|_| VerifyError::MissingUserId),
            None => Err(VerifyError::MissingUserId),
        }
    }
}

#[derive(Serialize)]
struct IssuedClaims {
    userid: String,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct Claims {
    userid: Option<UserIdClaim>,
}

/// Tokens from other issuers might encode the ID as string or number.
#[derive(Deserialize)]
#[serde(untagged)]
enum UserIdClaim {
    Number(i64),
    Text(String),
}


/// Why a token was rejected.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum VerifyError {
    /// Not a JWT at all, or some part of it could not be decoded.
    Malformed(String),
    UnsupportedAlgorithm,
    BadSignature,
    Expired,
    /// The `nbf` claim lies in the future.
    NotYetValid,
    /// The token verified, but does not contain a usable `userid` claim.
    MissingUserId,
}

impl From<ErrorKind> for VerifyError {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::UnsupportedAlgorithm
            }
            ErrorKind::InvalidSignature => Self::BadSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            other => Self::Malformed(format!("{other:?}")),
        }
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(what) => write!(f, "malformed token ({what})"),
            Self::UnsupportedAlgorithm => write!(f, "unsupported algorithm"),
            Self::BadSignature => write!(f, "signature does not match"),
            Self::Expired => write!(f, "token expired"),
            Self::NotYetValid => write!(f, "token is not valid yet"),
            Self::MissingUserId => write!(f, "token has no valid 'userid' claim"),
        }
    }
}

impl std::error::Error for VerifyError {}
