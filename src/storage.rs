//! Persists the repository identity, the token, and the last trigger's inputs.
//!
//! Persistence is best-effort: [`Storage`] logs and swallows every store failure, so losing a write never
//! interrupts the dashboard.

#![cfg(feature = "storage")]

use std::{
    collections::{BTreeMap, HashMap},
    fs, io,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::workflow::RepositoryIdentity;

/// The logical keys written by [`Storage`].
pub mod keys {
    /// The repository owner.
    pub const REPO_OWNER: &str = "actionviewer_repo_owner";
    /// The repository name.
    pub const REPO_NAME: &str = "actionviewer_repo_name";
    /// The access token.
    pub const GITHUB_TOKEN: &str = "actionviewer_github_token";
    /// The single slot holding the last trigger's inputs.
    pub const WORKFLOW_INPUTS: &str = "actionviewer_workflow_inputs";
}

/// A failure of the underlying store.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The stored data is not valid JSON.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// A durable key-value store without transactional guarantees. The last write wins.
pub trait KeyValueStore {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// A store that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty [`MemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// A store kept as one JSON object in a file, rewritten on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Creates a [`FileStore`] at `path`. The file is created on the first write.
    pub fn new<P>(path: P) -> Self
    where
        P: AsRef<Path>,
    {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut entries = self.read()?;
        entries.insert(key.to_owned(), value.to_owned());
        self.write(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut entries = self.read()?;
        if entries.remove(key).is_some() {
            self.write(&entries)?;
        }
        Ok(())
    }
}

/// The inputs of the most recent trigger.
///
/// Keyed by workflow name only: switching repositories keeps the slot, and a workflow with the same name in
/// another repository sees it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredWorkflowInputs {
    /// The name of the triggered workflow.
    pub workflow_name: String,
    /// The trigger's inputs, including the `ref` it ran at.
    pub inputs: BTreeMap<String, String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Typed, failure-tolerant access to a [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct Storage<S> {
    store: S,
}

impl<S> Storage<S>
where
    S: KeyValueStore,
{
    /// Wraps a store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the wrapped store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(err) = self.store.set(key, value) {
            error!("failed to save {key}: {err}");
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        self.store.get(key).unwrap_or_else(|err| {
            error!("failed to load {key}: {err}");
            None
        })
    }

    fn remove(&self, key: &str) {
        if let Err(err) = self.store.remove(key) {
            error!("failed to clear {key}: {err}");
        }
    }

    /// Saves the repository identity. The stored token is only replaced when one is given.
    pub fn save_repository_data(&self, identity: &RepositoryIdentity) {
        debug!("saving repository {identity}");
        self.set(keys::REPO_OWNER, &identity.owner);
        self.set(keys::REPO_NAME, &identity.repo);
        if let Some(token) = identity.token.as_deref().filter(|token| !token.is_empty()) {
            self.set(keys::GITHUB_TOKEN, token);
        }
    }

    /// Loads the repository identity, or [`None`] unless both owner and name are stored.
    pub fn load_repository_data(&self) -> Option<RepositoryIdentity> {
        let owner = self.get(keys::REPO_OWNER).filter(|owner| !owner.is_empty())?;
        let repo = self.get(keys::REPO_NAME).filter(|repo| !repo.is_empty())?;
        let token = self.get(keys::GITHUB_TOKEN);

        Some(RepositoryIdentity::new(owner, repo, token))
    }

    /// Clears the repository identity and the token.
    pub fn clear_repository_data(&self) {
        debug!("clearing repository data");
        self.remove(keys::REPO_OWNER);
        self.remove(keys::REPO_NAME);
        self.remove(keys::GITHUB_TOKEN);
    }

    /// Overwrites the inputs slot with a trigger of `workflow_name`, stamped with the current time.
    pub fn save_workflow_inputs(&self, workflow_name: &str, inputs: &BTreeMap<String, String>) {
        let stored = StoredWorkflowInputs {
            workflow_name: workflow_name.to_owned(),
            inputs: inputs.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        match serde_json::to_string(&stored) {
            Ok(json) => self.set(keys::WORKFLOW_INPUTS, &json),
            Err(err) => error!("failed to save workflow inputs: {err}"),
        }
    }

    /// Loads the inputs slot.
    pub fn load_workflow_inputs(&self) -> Option<StoredWorkflowInputs> {
        let json = self.get(keys::WORKFLOW_INPUTS)?;
        serde_json::from_str(&json)
            .map_err(|err| error!("failed to load workflow inputs: {err}"))
            .ok()
    }

    /// Clears the inputs slot.
    pub fn clear_workflow_inputs(&self) {
        self.remove(keys::WORKFLOW_INPUTS);
    }
}
