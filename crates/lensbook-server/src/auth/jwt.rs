//! JWT (JSON Web Token) based authentication.
//!
//! # Configuration
//!
//! Set `LENSBOOK_JWT_SECRET` with the HMAC secret key. `LENSBOOK_JWT_ISSUER`
//! optionally pins the expected issuer.
//!
//! # JWT Claims
//!
//! The JWT must contain:
//! - `sub`: the user id (UUID)
//! - `exp`: Expiration timestamp (Unix timestamp)
//!
//! Optional claims:
//! - `iat`: Issued at timestamp
//! - `iss`: Issuer
//!
//! # Example JWT Payload
//!
//! ```json
//! {
//!   "sub": "6f1c8a4e-3b52-4c1e-9d2a-5e8f7b0c1d23",
//!   "exp": 1735689600,
//!   "iat": 1735603200,
//!   "iss": "lensbook-web"
//! }
//! ```

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lensbook_proto::UserId;

use super::AuthError;

/// Environment variable holding the HMAC secret.
pub const JWT_SECRET_ENV: &str = "LENSBOOK_JWT_SECRET";

/// Environment variable holding the required issuer.
pub const JWT_ISSUER_ENV: &str = "LENSBOOK_JWT_ISSUER";

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user id).
    pub sub: String,

    /// Expiration time (Unix timestamp).
    pub exp: u64,

    /// Issued at time (Unix timestamp).
    #[serde(default)]
    pub iat: Option<u64>,

    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
}

impl JwtClaims {
    /// Claims for `user` expiring `ttl_secs` from now.
    pub fn for_user(user: UserId, ttl_secs: u64) -> Self {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        Self {
            sub: user.to_string(),
            exp: now + ttl_secs,
            iat: Some(now),
            iss: None,
        }
    }
}

/// JWT authenticator configuration.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Algorithm to use for verification.
    pub algorithm: Algorithm,

    /// Whether to validate expiration.
    pub validate_exp: bool,

    /// Required issuer (if any).
    pub required_issuer: Option<String>,

    /// Leeway in seconds for expiration check.
    pub leeway_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            validate_exp: true,
            required_issuer: None,
            leeway_secs: 60,
        }
    }
}

/// Verifies session tokens and resolves them to a user id.
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    config: JwtConfig,
}

impl JwtAuthenticator {
    /// Create a new JWT authenticator with HMAC secret.
    pub fn with_secret(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            encoding_key: EncodingKey::from_secret(secret),
            config: JwtConfig::default(),
        }
    }

    /// Create a new JWT authenticator with HMAC secret string.
    pub fn with_secret_str(secret: &str) -> Self {
        Self::with_secret(secret.as_bytes())
    }

    /// Load from `LENSBOOK_JWT_SECRET` and, if set, `LENSBOOK_JWT_ISSUER`.
    pub fn from_env() -> Result<Self, AuthError> {
        let secret = std::env::var(JWT_SECRET_ENV)
            .map_err(|_| AuthError::NotConfigured(format!("set {JWT_SECRET_ENV}")))?;
        if secret.is_empty() {
            return Err(AuthError::NotConfigured(format!("{JWT_SECRET_ENV} is empty")));
        }

        let mut authenticator = Self::with_secret_str(&secret);
        if let Ok(issuer) = std::env::var(JWT_ISSUER_ENV) {
            authenticator = authenticator.with_issuer(issuer);
        }
        Ok(authenticator)
    }

    /// Set the required issuer for validation.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.required_issuer = Some(issuer.into());
        self
    }

    /// Set the leeway for expiration check.
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.config.leeway_secs = secs;
        self
    }

    /// Verify a JWT token and extract claims.
    pub fn verify_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.leeway = self.config.leeway_secs;
        validation.validate_exp = self.config.validate_exp;

        if let Some(ref iss) = self.config.required_issuer {
            validation.set_issuer(&[iss]);
        }

        let token_data = decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(token_data.claims)
    }

    /// Verify a token and return the user id it was issued for.
    pub fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        let claims = self.verify_token(token)?;
        Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidSubject(claims.sub))
    }

    /// Sign a token for `user`. Used by operators and tests to mint sessions.
    pub fn issue(&self, user: UserId, ttl_secs: u64) -> Result<String, AuthError> {
        let mut claims = JwtClaims::for_user(user, ttl_secs);
        claims.iss = self.config.required_issuer.clone();
        encode(&Header::new(self.config.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}
