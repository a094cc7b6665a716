use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::login::*;

/// Accounts available in developer mode, all sharing the same password
pub const DEMO_USERS: [&str; 2] = ["alice", "bob"];
pub const DEMO_PASSWORD: &str = "hunter2";

pub struct DemoLoginProvider {}

impl DemoLoginProvider {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for DemoLoginProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoginProvider for DemoLoginProvider {
    async fn login(&self, username: &str, password: &str) -> Result<Principal> {
        tracing::debug!(user=%username, "login");

        if !DEMO_USERS.contains(&username) {
            bail!("user does not exist");
        }

        if password != DEMO_PASSWORD {
            bail!("wrong password");
        }

        Ok(Principal(username.to_string()))
    }
}
