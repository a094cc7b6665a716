use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use crate::config::*;
use crate::login::*;

/// Username to argon2 password hash
#[derive(Default)]
pub struct UserDatabase {
    hashes: HashMap<String, String>,
}

impl UserDatabase {
    fn load(path: &PathBuf) -> Result<Self> {
        let ulist: UserList = read_config(path.clone())
            .context(format!("'{}' must be a user list", path.display()))?;
        let hashes = ulist
            .into_iter()
            .map(|(username, entry)| (username, entry.password))
            .collect::<HashMap<_, _>>();
        Ok(Self { hashes })
    }
}

/// Users come from a TOML file, read again on SIGUSR1.
/// A list that fails to load leaves the previous one in place.
pub struct StaticLoginProvider {
    user_db: watch::Receiver<UserDatabase>,
}

async fn reload_on_signal(path: PathBuf, up: watch::Sender<UserDatabase>) -> Result<()> {
    let mut stream = signal(SignalKind::user_defined1())
        .context("failed to install SIGUSR1 signal hander for reload")?;

    while stream.recv().await.is_some() {
        tracing::info!("Received SIGUSR1, reloading");
        match UserDatabase::load(&path) {
            Ok(db) => {
                tracing::info!("{} users loaded", db.hashes.len());
                up.send(db).context("update user db config")?;
            }
            Err(e) => {
                tracing::warn!(path=%path.display(), err=?e, "Unable to reload user list, keeping the previous one")
            }
        }
    }
    Ok(())
}

impl StaticLoginProvider {
    pub async fn new(config: LoginStaticConfig) -> Result<Self> {
        let db = UserDatabase::load(&config.user_list)?;
        tracing::info!("{} users loaded", db.hashes.len());
        let (tx, rx) = watch::channel(db);

        tokio::spawn(async move {
            if let Err(e) = reload_on_signal(config.user_list, tx).await {
                tracing::error!(err=?e, "user list reloading stopped");
            }
        });

        Ok(Self { user_db: rx })
    }
}

#[async_trait]
impl LoginProvider for StaticLoginProvider {
    async fn login(&self, username: &str, password: &str) -> Result<Principal> {
        tracing::debug!(user=%username, "login");
        let hash = match self.user_db.borrow().hashes.get(username) {
            None => bail!("User {} does not exist", username),
            Some(h) => h.clone(),
        };

        if !verify_password(password, &hash)? {
            bail!("Wrong password");
        }

        tracing::debug!(user=%username, "logged");
        Ok(Principal(username.to_string()))
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    use argon2::{
        password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
        Argon2,
    };
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    Ok(argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Argon2 error: {}", e))?
        .to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    use argon2::{
        password_hash::{PasswordHash, PasswordVerifier},
        Argon2,
    };
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| anyhow!("Invalid hashed password: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
        assert!(verify_password("correct horse", "not a hash").is_err());
    }

    #[tokio::test]
    async fn login_from_user_list() {
        let path = std::env::temp_dir().join(format!("cairn-users-{}.toml", std::process::id()));
        let mut ulist = UserList::new();
        ulist.insert(
            "carol".into(),
            UserEntry {
                password: hash_password("s3cret").unwrap(),
            },
        );
        write_config(path.clone(), &ulist).unwrap();

        let provider = StaticLoginProvider::new(LoginStaticConfig {
            user_list: path.clone(),
        })
        .await
        .unwrap();

        let carol = provider.login("carol", "s3cret").await.unwrap();
        assert_eq!(carol, Principal("carol".into()));
        assert!(provider.login("carol", "nope").await.is_err());
        assert!(provider.login("dave", "s3cret").await.is_err());

        std::fs::remove_file(path).unwrap();
    }
}
