use std::fmt;

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;
const DEFAULT_INVITATION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Runtime configuration for the token codec.
#[derive(Clone)]
pub struct JwtConfig {
    /// Symmetric HS256 secret shared by every token type.
    pub secret: String,
    /// Lifetime of access tokens.
    pub access_ttl_seconds: i64,
    /// Lifetime of opaque refresh tokens.
    pub refresh_ttl_seconds: i64,
    /// Lifetime of signed invitation tokens.
    pub invitation_ttl_seconds: i64,
    /// Allowable clock skew in seconds when validating exp.
    pub leeway_seconds: u32,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            invitation_ttl_seconds: DEFAULT_INVITATION_TTL_SECONDS,
            leeway_seconds: 0,
        }
    }

    pub fn with_access_ttl(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    pub fn with_refresh_ttl(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    pub fn with_invitation_ttl(mut self, seconds: i64) -> Self {
        self.invitation_ttl_seconds = seconds;
        self
    }

    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .field("invitation_ttl_seconds", &self.invitation_ttl_seconds)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}
