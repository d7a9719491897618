//! Admin authorization.
//!
//! Players never authenticate: registering hands out an id and that's
//! it. Host commands (start, reset, kick, round cap) carry a token, and
//! an [`AdminAuthenticator`] decides whether the token is good. The
//! engine itself never sees tokens.

/// Why an admin token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

/// Checks a host token before an admin command reaches the engine.
///
/// # Example
///
/// ```rust
/// use roulette::{AdminAuthenticator, AuthError};
///
/// /// Lets everyone administer. Handy on a trusted LAN, nowhere else.
/// struct OpenDoor;
///
/// impl AdminAuthenticator for OpenDoor {
///     async fn authorize(&self, _token: &str) -> Result<(), AuthError> {
///         Ok(())
///     }
/// }
/// ```
pub trait AdminAuthenticator: Send + Sync + 'static {
    /// Returns `Ok(())` if `token` may issue admin commands.
    fn authorize(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<(), AuthError>> + Send;
}

/// Accepts exactly one configured token.
#[derive(Debug, Clone)]
pub struct StaticTokenAuth {
    token: String,
}

impl StaticTokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl AdminAuthenticator for StaticTokenAuth {
    async fn authorize(&self, token: &str) -> Result<(), AuthError> {
        if constant_time_eq(self.token.as_bytes(), token.as_bytes()) {
            Ok(())
        } else {
            Err(AuthError::Unauthorized("invalid admin token".into()))
        }
    }
}

/// Compares without an early exit on the first differing byte. The
/// length still leaks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
