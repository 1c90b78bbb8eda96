//! `gatehouse-auth`: authentication, session issuance and role authorization.
//!
//! This crate is decoupled from HTTP and storage: persistence, caching and the
//! OAuth identity provider are reached through the traits in [`store`],
//! [`cache`] and [`oauth`].

pub mod authorize;
pub mod cache;
pub mod claims;
pub mod oauth;
pub mod password;
pub mod principal;
pub mod roles;
pub mod service;
pub mod store;
pub mod tokens;
pub mod user;

#[cfg(test)]
pub(crate) mod testing;

pub use authorize::{AuthzError, require_role};
pub use cache::{Cache, CacheError};
pub use claims::{AccessClaims, RefreshClaims, TokenType};
pub use oauth::{OAuthError, OAuthProfile, OAuthProvider};
pub use password::{Argon2PasswordHasher, HashError, PasswordHasher};
pub use principal::Principal;
pub use roles::Role;
pub use service::{
    ALL_USERS_CACHE_KEY, AuthService, OAUTH_PLACEHOLDER_PASSWORD, SignInInput, SignUpInput,
    UpdateProfileInput,
};
pub use store::{CredentialStore, StoreError};
pub use tokens::{JwtTokenIssuer, TokenConfig, TokenError, TokenIssuer, TokenPair};
pub use user::{NewUser, Page, User, UserPatch, UserSummary, UserView};
