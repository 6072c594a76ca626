//! Acting-user identity supplied by the authentication layer.
//!
//! The core trusts this identity and does not re-authenticate; session
//! issuance and verification live outside this crate.

use crate::types::UserId;

/// Supplies the acting user for order creation, review authorship, and
/// audit attribution.
pub trait AuthContext: Send + Sync {
    /// The currently authenticated user.
    fn current_user(&self) -> UserId;
}

/// An auth context with a fixed user, for composition roots that resolve
/// identity per request, and for tests.
#[derive(Debug, Clone)]
pub struct StaticAuthContext {
    user: UserId,
}

impl StaticAuthContext {
    /// Creates a context acting as the given user.
    pub const fn new(user: UserId) -> Self {
        Self { user }
    }
}

impl AuthContext for StaticAuthContext {
    fn current_user(&self) -> UserId {
        self.user.clone()
    }
}
