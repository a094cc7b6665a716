pub mod demo_provider;
pub mod static_provider;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

/// The trait LoginProvider defines the interface for a login provider that allows
/// to retrieve the identity of a caller from their username and password.
#[async_trait]
pub trait LoginProvider {
    /// The login method takes an account's password as an input to check
    /// that the account's password is valid and returns the authenticated principal
    async fn login(&self, username: &str, password: &str) -> Result<Principal>;
}

/// ArcLoginProvider is simply an alias on a structure that is used
/// in many places in the code
pub type ArcLoginProvider = Arc<dyn LoginProvider + Send + Sync>;

/// An authenticated identity
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Principal(pub String);

impl Principal {
    pub fn name(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Carried along every repository call, identifies who is acting.
/// A request without credentials runs with an anonymous token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityToken {
    principal: Option<Principal>,
}

impl SecurityToken {
    pub fn anonymous() -> Self {
        Self { principal: None }
    }

    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.principal.is_none()
    }
}
