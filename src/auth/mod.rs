/// Authentication module
///
/// Access token signing, refresh token rotation with reuse detection,
/// family revocation, and password hashing.

mod claims;
mod issuer;
mod jwt;
mod password;
mod refresh_token;
mod revocation;
mod rotation;
mod service;

pub use claims::Claims;
pub use issuer::AccessTokenIssuer;
pub use jwt::JwtSigner;
pub use password::{validate_password_strength, PasswordHasher};
pub use refresh_token::{
    generate_refresh_token, hash_token, IssuedRefreshToken, RefreshTokenRecord, TokenPair,
};
pub use revocation::{RevocationEngine, RevocationReason};
pub use rotation::RotationEngine;
pub use service::AuthService;
