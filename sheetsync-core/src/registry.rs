//! Mapping registry.
//!
//! # Storage layout
//!
//! ```text
//! ~/.sheetsync/
//!   mappings.yaml   (mode 0600)
//! ```
//!
//! # API pattern
//!
//! Persistence functions come in two forms:
//! - `fn_at(data_dir: &Path, …)`: explicit data directory; used by the daemon
//!   and by tests with `TempDir`
//! - `fn(…)`: derives `~/.sheetsync` from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, RegistryError};
use crate::types::{Mapping, MappingId, MappingPatch, NewMapping, SheetId, TabName};

const REGISTRY_VERSION: u32 = 1;

/// The active set of source → destination mappings.
///
/// Cycles never hold a reference into the registry; they work on
/// [`MappingRegistry::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRegistry {
    pub version: u32,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
    pub updated_at: DateTime<Utc>,
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MappingRegistry {
    pub fn new(mappings: Vec<Mapping>) -> Self {
        Self {
            version: REGISTRY_VERSION,
            mappings,
            updated_at: Utc::now(),
        }
    }

    pub fn list(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Owned copy of the current mapping set.
    pub fn snapshot(&self) -> Vec<Mapping> {
        self.mappings.clone()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Mapping> {
        self.mappings.iter().find(|m| m.id.0 == id)
    }

    /// Validate `new`, assign an id, and append it.
    ///
    /// The id is the current Unix time in milliseconds, bumped until unique.
    pub fn create(&mut self, new: NewMapping) -> Result<Mapping, RegistryError> {
        let source_sheet_id = required(new.source_sheet_id, "sourceSheetId")?;
        let source_tab = required(new.source_tab, "sourceTab")?;
        let dest_sheet_id = required(new.dest_sheet_id, "destSheetId")?;
        let dest_tab = required(new.dest_tab, "destTab")?;
        let name = required(new.name, "name")?;

        let mapping = Mapping {
            id: self.next_id(Utc::now().timestamp_millis()),
            source_sheet_id: SheetId(source_sheet_id),
            source_tab: TabName(source_tab),
            dest_sheet_id: SheetId(dest_sheet_id),
            dest_tab: TabName(dest_tab),
            name,
            description: new.description.unwrap_or_default(),
        };
        self.mappings.push(mapping.clone());
        self.touch();
        Ok(mapping)
    }

    /// Apply a partial update to the mapping with `id`.
    pub fn update(&mut self, id: &str, patch: MappingPatch) -> Result<Mapping, RegistryError> {
        let mapping = self
            .mappings
            .iter_mut()
            .find(|m| m.id.0 == id)
            .ok_or_else(|| RegistryError::MappingNotFound(id.to_string()))?;
        patch.apply(mapping);
        let updated = mapping.clone();
        self.touch();
        Ok(updated)
    }

    /// Remove and return the mapping with `id`.
    pub fn delete(&mut self, id: &str) -> Result<Mapping, RegistryError> {
        let idx = self
            .mappings
            .iter()
            .position(|m| m.id.0 == id)
            .ok_or_else(|| RegistryError::MappingNotFound(id.to_string()))?;
        let removed = self.mappings.remove(idx);
        self.touch();
        Ok(removed)
    }

    fn next_id(&self, now_millis: i64) -> MappingId {
        let mut candidate = now_millis;
        while self.mappings.iter().any(|m| m.id.0 == candidate.to_string()) {
            candidate += 1;
        }
        MappingId(candidate.to_string())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, RegistryError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RegistryError::MissingField(field)),
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// `~/.sheetsync`: pure, no I/O.
pub fn default_data_dir() -> Result<PathBuf, RegistryError> {
    dirs::home_dir()
        .map(|home| home.join(".sheetsync"))
        .ok_or(RegistryError::HomeNotFound)
}

/// `<data_dir>/mappings.yaml`: pure, no I/O.
pub fn registry_path_at(data_dir: &Path) -> PathBuf {
    data_dir.join("mappings.yaml")
}

/// Load the registry from `<data_dir>/mappings.yaml`.
///
/// A missing file yields an empty registry; malformed YAML is a
/// [`RegistryError::Parse`] carrying the path.
pub fn load_at(data_dir: &Path) -> Result<MappingRegistry, RegistryError> {
    let path = registry_path_at(data_dir);
    if !path.exists() {
        return Ok(MappingRegistry::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| RegistryError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<MappingRegistry, RegistryError> {
    load_at(&default_data_dir()?)
}

/// Atomically save the registry to `<data_dir>/mappings.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(data_dir: &Path, registry: &MappingRegistry) -> Result<(), RegistryError> {
    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir).map_err(|e| io_err(data_dir, e))?;
        set_dir_permissions(data_dir)?;
    }
    let path = registry_path_at(data_dir);
    let tmp_path = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(registry)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(registry: &MappingRegistry) -> Result<(), RegistryError> {
    save_at(&default_data_dir()?, registry)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
