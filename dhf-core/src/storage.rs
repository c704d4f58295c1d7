use serde_yaml::{Mapping, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::document::DhfDocument;
use crate::error::{DhfError, DhfResult};
use crate::models::{CategoryKind, ConfigType};
use crate::xref::duplicate_ids;

/// Loads and saves a DHF document, keeping the last good copy in memory
///
/// Every edit works on a clone of the cached document. The clone is written
/// out and only then becomes the new cache, so a failed write leaves the
/// cache exactly as it was.
#[derive(Debug)]
pub struct DhfStore {
    file_path: PathBuf,
    cache: Option<DhfDocument>,
}

impl DhfStore {
    /// Creates a handle for `file_path`; nothing is read until first use
    pub fn open<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            cache: None,
        }
    }

    /// Returns the path to the backing file
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// The cached document, if one has been loaded
    pub fn cached(&self) -> Option<&DhfDocument> {
        self.cache.as_ref()
    }

    /// Returns the cached document, loading it on first use
    pub fn document(&mut self) -> DhfResult<&DhfDocument> {
        if self.cache.is_none() {
            self.load()?;
        }
        match &self.cache {
            Some(doc) => Ok(doc),
            None => Err(DhfError::NotFound {
                path: self.file_path.clone(),
            }),
        }
    }

    /// Reads and parses the backing file, replacing the cache
    pub fn load(&mut self) -> DhfResult<&DhfDocument> {
        let content = fs::read_to_string(&self.file_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DhfError::NotFound {
                path: self.file_path.clone(),
            },
            _ => DhfError::Storage {
                path: self.file_path.clone(),
                message: format!("read failed: {}", e),
            },
        })?;

        let doc = if content.trim().is_empty() {
            DhfDocument::new()
        } else {
            let value: Value = serde_yaml::from_str(&content).map_err(|e| DhfError::Format {
                path: self.file_path.clone(),
                message: e.to_string(),
            })?;
            DhfDocument::from_value(value).map_err(|message| DhfError::Format {
                path: self.file_path.clone(),
                message,
            })?
        };

        for (id, locations) in duplicate_ids(&doc) {
            let places: Vec<String> = locations.iter().map(ToString::to_string).collect();
            tracing::warn!(%id, locations = ?places, "identifier stored more than once; first match wins");
        }
        tracing::debug!(path = %self.file_path.display(), "loaded DHF document");

        Ok(self.cache.insert(doc))
    }

    /// Drops the cache so the next access reads the file again
    pub fn reload(&mut self) {
        self.cache = None;
    }

    /// Writes the whole document and makes it the cached copy
    pub fn save(&mut self, doc: DhfDocument) -> DhfResult<()> {
        let storage_error = |message: String| DhfError::Storage {
            path: self.file_path.clone(),
            message,
        };

        let yaml = serde_yaml::to_string(&doc.to_value())
            .map_err(|e| storage_error(format!("serialization failed: {}", e)))?;

        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| storage_error(e.to_string()))?;
            }
        }
        fs::write(&self.file_path, yaml).map_err(|e| storage_error(e.to_string()))?;

        tracing::debug!(path = %self.file_path.display(), "saved DHF document");
        self.cache = Some(doc);
        Ok(())
    }

    /// Applies `edit` to a copy of the document and saves the copy when
    /// `changed` says the edit took effect
    pub fn update_atomically<T, F, C>(&mut self, edit: F, changed: C) -> DhfResult<T>
    where
        F: FnOnce(&mut DhfDocument) -> T,
        C: FnOnce(&T) -> bool,
    {
        let mut doc = self.document()?.clone();
        let outcome = edit(&mut doc);
        if changed(&outcome) {
            self.save(doc)?;
        }
        Ok(outcome)
    }

    /// Merges `patch` into item `id` and persists; `false` if the id is
    /// unknown
    pub fn update_item(&mut self, id: &str, patch: &Mapping) -> DhfResult<bool> {
        self.update_atomically(|doc| doc.update_item(id, patch), |found| *found)
    }

    pub fn rename_group(
        &mut self,
        kind: CategoryKind,
        group_key: &str,
        new_name: &str,
    ) -> DhfResult<bool> {
        require_text(new_name, "group name")?;
        self.update_atomically(|doc| doc.rename_group(kind, group_key, new_name), |found| *found)
    }

    pub fn update_mitigation_effect(&mut self, link_id: &str, effect: &str) -> DhfResult<bool> {
        require_text(effect, "effect")?;
        self.update_atomically(
            |doc| doc.update_mitigation_effect(link_id, effect),
            |found| *found,
        )
    }

    pub fn add_config_option(
        &mut self,
        config_type: ConfigType,
        name: &str,
        description: &str,
    ) -> DhfResult<String> {
        require_text(name, "option name")?;
        self.update_atomically(
            |doc| doc.add_config_option(config_type, name, description),
            |added| added.is_ok(),
        )?
    }

    pub fn remove_config_option(
        &mut self,
        config_type: ConfigType,
        option_id: &str,
    ) -> DhfResult<bool> {
        self.update_atomically(
            |doc| doc.remove_config_option(config_type, option_id),
            |found| *found,
        )
    }

    pub fn update_config_option(
        &mut self,
        config_type: ConfigType,
        option_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> DhfResult<bool> {
        require_text(name, "option name")?;
        self.update_atomically(
            |doc| doc.update_config_option(config_type, option_id, name, description),
            |found| *found,
        )
    }
}

fn require_text(value: &str, what: &str) -> DhfResult<()> {
    if value.trim().is_empty() {
        return Err(DhfError::Validation(format!("{} must not be empty", what)));
    }
    Ok(())
}
