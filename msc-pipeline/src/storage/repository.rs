//! Keyed item storage
//!
//! `Repository` is the authoritative store the resume logic checks before
//! trusting a checkpoint. `JsonRepository` keeps items in memory and
//! mirrors them to one JSON array file.

use crate::models::Keyed;
use crate::storage::atomic;
use crate::{PipelineError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Storage capability consumed by stages
pub trait Repository<T> {
    /// Stored item for `id`, if any
    fn get(&self, id: &str) -> Option<T>;

    /// All stored items, in insertion order
    fn get_all(&self) -> Vec<T>;

    /// Insert or replace one item and persist
    fn add(&mut self, item: T) -> Result<()>;

    /// Insert or replace several items with a single write
    fn save_batch(&mut self, items: &[T]) -> Result<()>;

    /// Remove every item and persist
    fn clear(&mut self) -> Result<()>;

    fn count(&self) -> usize;

    fn exists(&self, id: &str) -> bool {
        self.get(id).is_some()
    }
}

/// JSON array file repository, keyed by `Keyed::key`
#[derive(Debug)]
pub struct JsonRepository<T> {
    path: PathBuf,
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> JsonRepository<T>
where
    T: Keyed + Clone + Serialize + DeserializeOwned,
{
    /// Open the repository stored at `path`
    ///
    /// A missing file yields an empty repository; so does an unreadable
    /// one (logged). Nothing is written until the first change.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut repo = Self {
            path,
            items: Vec::new(),
            index: HashMap::new(),
        };

        for item in load_items::<T>(&repo.path) {
            repo.upsert(item);
        }
        repo
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove one item; returns false if it was not stored
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let Some(position) = self.index.remove(id) else {
            return Ok(false);
        };
        self.items.remove(position);
        self.reindex();
        self.persist()?;
        Ok(true)
    }

    fn upsert(&mut self, item: T) {
        let key = item.key();
        match self.index.get(&key) {
            Some(&position) => self.items[position] = item,
            None => {
                self.index.insert(key, self.items.len());
                self.items.push(item);
            }
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| (item.key(), position))
            .collect();
    }

    fn persist(&self) -> Result<()> {
        atomic::write_json(&self.path, &self.items)?;
        debug!("Saved {} items to {}", self.items.len(), self.path.display());
        Ok(())
    }
}

impl<T> Repository<T> for JsonRepository<T>
where
    T: Keyed + Clone + Serialize + DeserializeOwned,
{
    fn get(&self, id: &str) -> Option<T> {
        self.index.get(id).map(|&position| self.items[position].clone())
    }

    fn get_all(&self) -> Vec<T> {
        self.items.clone()
    }

    fn add(&mut self, item: T) -> Result<()> {
        self.upsert(item);
        self.persist()
    }

    fn save_batch(&mut self, items: &[T]) -> Result<()> {
        for item in items {
            self.upsert(item.clone());
        }
        self.persist()
    }

    fn clear(&mut self) -> Result<()> {
        self.items.clear();
        self.index.clear();
        self.persist()
    }

    fn count(&self) -> usize {
        self.items.len()
    }

    fn exists(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }
}

fn load_items<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    if !path.exists() {
        debug!("Repository file does not exist: {}", path.display());
        return Vec::new();
    }

    let parsed = fs::read_to_string(path)
        .map_err(PipelineError::from)
        .and_then(|content| Ok(serde_json::from_str::<Vec<T>>(&content)?));

    match parsed {
        Ok(items) => {
            info!("Loaded {} items from {}", items.len(), path.display());
            items
        }
        Err(e) => {
            warn!("Ignoring unreadable repository {}: {}", path.display(), e);
            Vec::new()
        }
    }
}
