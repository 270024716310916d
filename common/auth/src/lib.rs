pub mod claims;
pub mod codec;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;

pub use claims::{AccessClaims, InvitationClaims, TokenSubject, MAX_SAFE_ID};
pub use codec::{hash_refresh_token, TokenCodec};
pub use config::JwtConfig;
pub use error::{AuthError, AuthResult, CodecError, CodecResult};
pub use extractors::{parse_bearer, AuthContext, StoreScope};
pub use guards::{ensure_admin, ensure_merchant, ensure_store_staff, is_staff_of_store, GuardError};
