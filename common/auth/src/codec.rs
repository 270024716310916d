use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand_core::{OsRng, RngCore};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::claims::{
    ensure_safe_id, AccessClaims, AccessClaimsRepr, InvitationClaims, InvitationClaimsRepr,
    TokenSubject,
};
use crate::config::JwtConfig;
use crate::error::{CodecError, CodecResult};

const ALGORITHM: Algorithm = Algorithm::HS256;
const REFRESH_TOKEN_BYTES: usize = 32;

/// Signs and verifies the three credential shapes: access tokens,
/// invitation tokens and opaque refresh tokens.
#[derive(Clone)]
pub struct TokenCodec {
    config: JwtConfig,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenCodec {
    pub fn new(config: JwtConfig) -> CodecResult<Self> {
        if config.secret.trim().is_empty() {
            return Err(CodecError::MissingSecret);
        }
        let encoding = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding = DecodingKey::from_secret(config.secret.as_bytes());
        Ok(Self {
            config,
            encoding,
            decoding,
        })
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn issue_access_token(&self, subject: &TokenSubject) -> CodecResult<String> {
        ensure_safe_id(subject.user_id)?;
        for store_id in &subject.staff_store_ids {
            ensure_safe_id(*store_id)?;
        }

        let now = Utc::now();
        let claims = AccessClaimsRepr {
            email: subject.email.clone(),
            user_id: subject.user_id,
            is_admin: subject.is_admin,
            is_merchant: subject.is_merchant,
            staff_store_ids: subject.staff_store_ids.clone(),
            exp: (now + Duration::seconds(self.config.access_ttl_seconds)).timestamp(),
            iat: Some(now.timestamp()),
        };

        encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|err| CodecError::Signing(err.to_string()))
    }

    pub fn verify_access_token(&self, token: &str) -> CodecResult<AccessClaims> {
        let value = self.decode_value(token)?;
        let claims = AccessClaims::try_from(value)?;
        debug!(user_id = claims.user_id, "verified access token");
        Ok(claims)
    }

    /// Random bearer capability with no embedded claims; only meaningful
    /// once its digest has been stored server-side.
    pub fn issue_refresh_token(&self) -> CodecResult<(String, DateTime<Utc>)> {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| CodecError::Randomness(err.to_string()))?;
        let token = URL_SAFE_NO_PAD.encode(bytes);
        let expires_at = Utc::now() + Duration::seconds(self.config.refresh_ttl_seconds);
        Ok((token, expires_at))
    }

    pub fn issue_invitation_token(&self, store_id: u64, email: &str) -> CodecResult<String> {
        ensure_safe_id(store_id)?;
        let exp = Utc::now() + Duration::seconds(self.config.invitation_ttl_seconds);
        let claims = InvitationClaimsRepr {
            store_id,
            email: email.to_string(),
            invitation: true,
            exp: exp.timestamp(),
        };

        encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|err| CodecError::Signing(err.to_string()))
    }

    pub fn verify_invitation_token(&self, token: &str) -> CodecResult<InvitationClaims> {
        let value = self.decode_value(token)?;
        InvitationClaims::try_from(value)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_aud = false;
        validation.leeway = self.config.leeway_seconds.into();
        validation
    }

    fn decode_value(&self, token: &str) -> CodecResult<Value> {
        let header = decode_header(token).map_err(|err| {
            if names_an_algorithm(token) {
                CodecError::InvalidSignature
            } else {
                CodecError::MalformedToken(err.to_string())
            }
        })?;
        if header.alg != ALGORITHM {
            return Err(CodecError::InvalidSignature);
        }

        let data = decode::<Value>(token, &self.decoding, &self.validation())?;
        Ok(data.claims)
    }
}

/// True when the header segment is a JSON object carrying an `alg` string.
/// Such a header only fails to parse because the algorithm is unsupported
/// (`none` included).
fn names_an_algorithm(token: &str) -> bool {
    token
        .split('.')
        .next()
        .and_then(|segment| URL_SAFE_NO_PAD.decode(segment.trim_end_matches('=')).ok())
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .is_some_and(|header| header.get("alg").is_some_and(Value::is_string))
}

/// Digest stored in place of the raw refresh token.
pub fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
