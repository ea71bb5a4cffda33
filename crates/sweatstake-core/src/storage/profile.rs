//! JSON document store for the identity and setup profiles.
//!
//! Two small documents live beside the database: `identity.json` (who is
//! logged in) and `setup.json` (the accountability contract). Both are
//! written by the CLI and read by the engine at init. An absent document
//! is `Ok(None)`, never an error; the engine treats it as "not set up".

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::data_dir;
use crate::error::StoreError;
use crate::setup::{SetupDocument, UserIdentity};

const IDENTITY_FILE: &str = "identity.json";
const SETUP_FILE: &str = "setup.json";

/// Document store rooted at the data directory.
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    /// Store rooted at `~/.config/sweatstake/`.
    pub fn open() -> Result<Self, StoreError> {
        Ok(Self { dir: data_dir()? })
    }

    /// Store rooted at an explicit directory.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn load_identity(&self) -> Result<Option<UserIdentity>, StoreError> {
        self.load_json(IDENTITY_FILE)
    }

    pub fn save_identity(&self, identity: &UserIdentity) -> Result<(), StoreError> {
        self.save_json(IDENTITY_FILE, identity)
    }

    pub fn clear_identity(&self) -> Result<(), StoreError> {
        self.remove(IDENTITY_FILE)
    }

    pub fn load_setup(&self) -> Result<Option<SetupDocument>, StoreError> {
        self.load_json(SETUP_FILE)
    }

    pub fn save_setup(&self, setup: &SetupDocument) -> Result<(), StoreError> {
        self.save_json(SETUP_FILE, setup)
    }

    pub fn clear_setup(&self) -> Result<(), StoreError> {
        self.remove(SETUP_FILE)
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn load_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        match std::fs::read_to_string(self.path(name)) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(value)?;
        std::fs::write(self.path(name), content)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
