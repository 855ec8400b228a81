//! YAML file-backed credential store.
//!
//! The whole registry lives in memory and is mirrored to one YAML file:
//!
//! ```yaml
//! web-1:
//!   name: web-1
//!   host: 10.0.0.5
//!   port: 22
//!   user: deploy
//!   pass: secret
//!   os:
//!     name: Ubuntu
//!     platform: ubuntu
//!     version: "24.04"
//!     arch: x86_64
//! ```
//!
//! Every mutation re-serializes the full map into a sibling temp file
//! (owner-only permissions on Unix) and renames it over the registry, so a
//! crash mid-write never leaves a truncated file behind. Passwords are stored
//! in cleartext.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::mcp::error::PersistenceError;
use crate::mcp::types::HostRecord;

use super::traits::CredentialStorage;

/// Registry persisted as a single YAML document.
#[derive(Debug)]
pub struct FileCredentialStore {
    hosts: BTreeMap<String, HostRecord>,
    path: PathBuf,
}

impl FileCredentialStore {
    /// Load the registry at `path`.
    ///
    /// A missing file yields an empty store. A file that exists but cannot be
    /// read or parsed is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let hosts = load(&path)?;
        info!("Loaded {} host(s) from {}", hosts.len(), path.display());
        Ok(Self { hosts, path })
    }

    /// Location of the registry file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    fn save(&self) -> Result<(), PersistenceError> {
        let data = serde_yaml::to_string(&self.hosts).map_err(PersistenceError::Serialize)?;

        let tmp_path = temp_path(&self.path);
        write_private(&tmp_path, data.as_bytes()).map_err(|source| PersistenceError::Write {
            path: tmp_path.clone(),
            source,
        })?;

        if let Err(source) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(PersistenceError::Write {
                path: self.path.clone(),
                source,
            });
        }

        debug!(
            "Persisted {} host(s) to {}",
            self.hosts.len(),
            self.path.display()
        );
        Ok(())
    }
}

impl CredentialStorage for FileCredentialStore {
    fn get(&self, name: &str) -> Option<HostRecord> {
        self.hosts.get(name).cloned()
    }

    fn set(&mut self, record: HostRecord) -> Result<(), PersistenceError> {
        if record.name.trim().is_empty() {
            return Err(PersistenceError::EmptyName);
        }
        let name = record.name.clone();
        let previous = self.hosts.insert(name.clone(), record);
        if let Err(e) = self.save() {
            // Keep memory in step with the file that is still on disk.
            match previous {
                Some(previous) => self.hosts.insert(name, previous),
                None => self.hosts.remove(&name),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<(), PersistenceError> {
        let removed = self.hosts.remove(name);
        if let Err(e) = self.save() {
            if let Some(removed) = removed {
                self.hosts.insert(name.to_string(), removed);
            }
            return Err(e);
        }
        Ok(())
    }

    fn list(&self) -> Vec<HostRecord> {
        self.hosts.values().cloned().collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.hosts.contains_key(name)
    }
}

fn load(path: &Path) -> Result<BTreeMap<String, HostRecord>, PersistenceError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No registry at {}, starting empty", path.display());
            return Ok(BTreeMap::new());
        }
        Err(source) => {
            return Err(PersistenceError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if data.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut hosts: BTreeMap<String, HostRecord> =
        serde_yaml::from_str(&data).map_err(|source| PersistenceError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    // The map key is the identity.
    for (key, record) in hosts.iter_mut() {
        if record.name != *key {
            if !record.name.is_empty() {
                debug!("Record {:?} is filed under {:?}, using the key", record.name, key);
            }
            record.name.clone_from(key);
        }
    }

    Ok(hosts)
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "hosts.yaml".to_string());
    path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()))
}

fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}
