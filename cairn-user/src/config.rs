use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DavConfig {
    pub bind_addr: SocketAddr,
    pub certs: PathBuf,
    pub key: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DavUnsecureConfig {
    pub bind_addr: SocketAddr,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginStaticConfig {
    pub user_list: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "user_driver")]
pub enum UserManagement {
    Demo,
    Static(LoginStaticConfig),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub pid: Option<PathBuf>,
    pub dav: Option<DavConfig>,
    pub dav_unsecure: Option<DavUnsecureConfig>,
    pub users: UserManagement,

    #[serde(default)]
    pub webdav: WebdavConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
}

/// Knobs of the WebDAV method layer
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WebdavConfig {
    /// Maximum size of an XML request body (PROPFIND, PROPPATCH, LOCK)
    #[serde(default = "default_max_xml_body")]
    pub max_xml_body: usize,

    /// Maximum size of any request body
    #[serde(default = "default_max_body")]
    pub max_body: usize,

    /// Maximum number of resources listed by a `Depth: infinity` PROPFIND
    #[serde(default = "default_propfind_max_resources")]
    pub propfind_max_resources: usize,

    /// Glob patterns of document names that can't be created with PUT
    #[serde(default = "default_forbidden_names")]
    pub forbidden_names: Vec<String>,

    /// User-Agent prefixes allowed to overwrite their own locked documents
    /// without submitting the lock token
    #[serde(default = "default_lenient_user_agents")]
    pub lenient_user_agents: Vec<String>,
}

impl Default for WebdavConfig {
    fn default() -> Self {
        Self {
            max_xml_body: default_max_xml_body(),
            max_body: default_max_body(),
            propfind_max_resources: default_propfind_max_resources(),
            forbidden_names: default_forbidden_names(),
            lenient_user_agents: default_lenient_user_agents(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub property_types: Vec<PropertyTypeConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PropertyTypeConfig {
    /// None means the repository default namespace
    #[serde(default)]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default)]
    pub value_type: ValueTypeConfig,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub protected: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueTypeConfig {
    #[default]
    String,
    Integer,
    Boolean,
    Timestamp,
    Date,
    Untyped,
}

// ---

pub type UserList = HashMap<String, UserEntry>;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserEntry {
    pub password: String,
}

// ---

pub fn read_config<T: serde::de::DeserializeOwned>(config_file: PathBuf) -> Result<T> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .open(config_file.as_path())?;

    let mut config = String::new();
    file.read_to_string(&mut config)?;

    Ok(toml::from_str(&config)?)
}

pub fn write_config<T: Serialize>(config_file: PathBuf, config: &T) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(config_file.as_path())?;

    file.write_all(toml::to_string(config)?.as_bytes())?;

    Ok(())
}

fn default_max_xml_body() -> usize {
    1024 * 1024
}

fn default_max_body() -> usize {
    64 * 1024 * 1024
}

fn default_propfind_max_resources() -> usize {
    10_000
}

fn default_forbidden_names() -> Vec<String> {
    vec![".DS_Store".into(), "._*".into(), "Thumbs.db".into()]
}

fn default_lenient_user_agents() -> Vec<String> {
    vec![
        "Microsoft Data Access Internet Publishing Provider".into(),
        "Microsoft-WebDAV-MiniRedir".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config() {
        let raw = r#"
[dav_unsecure]
bind_addr = "[::1]:8087"

[users]
user_driver = "Demo"
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.dav.is_none());
        assert!(matches!(config.users, UserManagement::Demo));
        assert_eq!(config.webdav.max_xml_body, 1024 * 1024);
        assert_eq!(config.webdav.lenient_user_agents.len(), 2);
        assert!(!config.repository.read_only);
    }

    #[test]
    fn property_types() {
        let raw = r#"
[users]
user_driver = "Static"
user_list = "users.toml"

[webdav]
forbidden_names = ["*.tmp"]

[[repository.property_types]]
name = "published"
value_type = "timestamp"

[[repository.property_types]]
namespace = "http://example.com/ns"
name = "tags"
multiple = true
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.webdav.forbidden_names, vec!["*.tmp".to_string()]);
        assert_eq!(config.webdav.propfind_max_resources, 10_000);

        let types = &config.repository.property_types;
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].namespace, None);
        assert_eq!(types[0].value_type, ValueTypeConfig::Timestamp);
        assert_eq!(types[1].value_type, ValueTypeConfig::String);
        assert!(types[1].multiple);
        assert!(!types[1].protected);
    }
}
