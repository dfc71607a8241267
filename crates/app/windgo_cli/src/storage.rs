//! Credential persistence.
//!
//! Credentials live in `$WINDGO_CONFIG_DIR/credentials.json`, falling back to
//! `<config dir>/windgo/credentials.json`. Files are written atomically and
//! readable only by the owner.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const FILE_NAME: &str = "credentials.json";

/// What a successful login leaves behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub base_url: String,
    pub access_token: String,
    /// Present for device-bound logins only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub user_id: i64,
    pub username: String,
}

/// Directory holding the credentials file.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("WINDGO_CONFIG_DIR").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|d| d.join("windgo"))
        .ok_or_else(|| Error::Custom("cannot determine a config directory".into()))
}

pub fn load(dir: &Path) -> Result<Option<Credentials>> {
    let path = dir.join(FILE_NAME);
    match fs::read_to_string(&path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Stored credentials, or [`Error::NotLoggedIn`].
pub fn require(dir: &Path) -> Result<Credentials> {
    load(dir)?.ok_or(Error::NotLoggedIn)
}

pub fn save(dir: &Path, creds: &Credentials) -> Result<()> {
    fs::create_dir_all(dir)?;
    // NamedTempFile is created with owner-only permissions on Unix.
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(serde_json::to_string_pretty(creds)?.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(FILE_NAME)).map_err(|e| Error::Io(e.error))?;
    log::debug!("saved credentials to {}", dir.display());
    Ok(())
}

/// Remove stored credentials. Returns whether a file existed.
pub fn clear(dir: &Path) -> Result<bool> {
    match fs::remove_file(dir.join(FILE_NAME)) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
