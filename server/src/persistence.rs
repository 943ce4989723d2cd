//! Profile storage consulted at session start and end.
//!
//! The tick loop only ever touches the in-memory copy. Writing the backing
//! file is left to `flush`, which the server binary calls on shutdown.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use shared::model::{Friend, PlayerProfile};
use shared::{Hash, Point};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("profile store encoding failed: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("username '{0}' is already registered")]
    Taken(String),
}

pub trait ProfileStore {
    /// The profile for `id`, provided the salted credential matches.
    fn load_profile(&self, id: &Hash, credential: &Hash) -> Result<Option<PlayerProfile>, StoreError>;

    /// Friend entry for a registered username, matched case-insensitively.
    fn find_friend(&self, username: &str) -> Option<Friend>;

    fn save_profile(&mut self, profile: &PlayerProfile) -> Result<(), StoreError>;

    /// Persists to durable storage, if the store has any.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredProfiles {
    profiles: BTreeMap<Hash, PlayerProfile>,
}

/// Profiles kept in memory, optionally backed by a bincode file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: StoredProfiles,
    path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `path` if it exists, otherwise starts empty. `flush` writes back
    /// to the same file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let data = if path.exists() {
            let file = File::open(&path)?;
            let data: StoredProfiles = bincode::deserialize_from(BufReader::new(file))?;
            info!(
                "Loaded {} profiles from {}",
                data.profiles.len(),
                path.display()
            );
            data
        } else {
            info!("No profile store at {}, starting empty", path.display());
            StoredProfiles::default()
        };

        Ok(Self {
            data,
            path: Some(path),
        })
    }

    /// Creates a fresh account at `spawn`.
    pub fn register(
        &mut self,
        username: &str,
        password: &str,
        spawn: Point,
    ) -> Result<Hash, StoreError> {
        let profile = PlayerProfile::new(username, password, spawn);
        if self.data.profiles.contains_key(&profile.id) {
            return Err(StoreError::Taken(username.to_string()));
        }

        let id = profile.id;
        debug!("Registered {}", profile);
        self.data.profiles.insert(id, profile);
        Ok(id)
    }

    pub fn get(&self, id: &Hash) -> Option<&PlayerProfile> {
        self.data.profiles.get(id)
    }

    pub fn len(&self) -> usize {
        self.data.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.profiles.is_empty()
    }
}

impl ProfileStore for MemoryStore {
    fn load_profile(&self, id: &Hash, credential: &Hash) -> Result<Option<PlayerProfile>, StoreError> {
        Ok(self
            .data
            .profiles
            .get(id)
            .filter(|profile| profile.credential == *credential)
            .cloned())
    }

    fn find_friend(&self, username: &str) -> Option<Friend> {
        self.data
            .profiles
            .get(&Hash::account(username))
            .map(|profile| Friend::new(profile.id, profile.username.clone()))
    }

    fn save_profile(&mut self, profile: &PlayerProfile) -> Result<(), StoreError> {
        self.data.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            warn!("Profile store has no backing file, nothing flushed");
            return Ok(());
        };

        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), &self.data)?;
        info!(
            "Saved {} profiles to {}",
            self.data.profiles.len(),
            path.display()
        );
        Ok(())
    }
}
