use crate::model::Scope;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A saved jump target: a top-level resource type in a scope, with the
/// list filter it was browsed with and the resource to land on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub name: String,
    pub resource_type: String,
    pub resource_id: String,
    #[serde(default)]
    pub arn: String,
    pub profile: String,
    pub region: String,
    #[serde(default)]
    pub filter: String,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn scope(&self) -> Scope {
        Scope::new(self.profile.clone(), self.region.clone())
    }

    fn same_target(&self, other: &Bookmark) -> bool {
        self.resource_type == other.resource_type
            && self.resource_id == other.resource_id
            && self.profile == other.profile
            && self.region == other.region
    }
}

/// Bookmarks in insertion order, written back to YAML after every change.
/// A store without a path keeps everything in memory.
#[derive(Debug, Default)]
pub struct BookmarkStore {
    path: Option<PathBuf>,
    bookmarks: Vec<Bookmark>,
}

impl BookmarkStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let bookmarks = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read bookmarks {}", path.display()))?;
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("failed to parse bookmarks {}", path.display()))?
            }
        } else {
            Vec::new()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            bookmarks,
        })
    }

    pub fn list(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    /// Replaces an existing bookmark for the same resource and scope,
    /// keeping its original creation time and position.
    pub fn add(&mut self, bookmark: Bookmark) -> Result<()> {
        match self
            .bookmarks
            .iter_mut()
            .find(|existing| existing.same_target(&bookmark))
        {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = Bookmark {
                    created_at,
                    ..bookmark
                };
            }
            None => self.bookmarks.push(bookmark),
        }
        self.save()
    }

    pub fn remove(&mut self, index: usize) -> Result<Option<Bookmark>> {
        if index >= self.bookmarks.len() {
            return Ok(None);
        }
        let removed = self.bookmarks.remove(index);
        self.save()?;
        Ok(Some(removed))
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let body = serde_yaml::to_string(&self.bookmarks).context("failed to encode bookmarks")?;
        fs::write(path, body).with_context(|| format!("failed to write bookmarks {}", path.display()))
    }
}
