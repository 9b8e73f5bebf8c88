use crate::catalog::PresetId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const CONFIGURATION_FILE: &str = "configuration.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresetMetadata {
    pub id: PresetId,
    pub version: u32,
}

/// A preset as kept locally. Fields other than `metadata` and `name` are opaque
/// and survive load/save untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalPreset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PresetMetadata>,
    pub name: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LocalPreset {
    pub fn id(&self) -> Option<PresetId> {
        self.metadata.map(|metadata| metadata.id)
    }

    pub fn version(&self) -> Option<u32> {
        self.metadata.map(|metadata| metadata.version)
    }

    pub fn version_label(&self) -> String {
        self.version()
            .map(|version| format!("v{version}"))
            .unwrap_or_else(|| "local".to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PresetStore {
    entries: Vec<LocalPreset>,
}

impl PresetStore {
    pub fn new(entries: Vec<LocalPreset>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[LocalPreset] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, id: PresetId) -> Option<&LocalPreset> {
        self.entries.iter().find(|entry| entry.id() == Some(id))
    }

    /// Position of this exact entry (by address, not by value).
    pub fn index_of(&self, entry: &LocalPreset) -> Option<usize> {
        self.entries
            .iter()
            .position(|candidate| std::ptr::eq(candidate, entry))
    }

    pub fn replace_at(&mut self, index: usize, entry: LocalPreset) -> Option<LocalPreset> {
        let slot = self.entries.get_mut(index)?;
        Some(std::mem::replace(slot, entry))
    }

    pub fn append(&mut self, entry: LocalPreset) {
        self.entries.push(entry);
    }

    /// Drops every entry carrying `id`. Returns how many were removed.
    pub fn remove_id(&mut self, id: PresetId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id() != Some(id));
        before - self.entries.len()
    }

    pub fn catalog_ids(&self) -> Vec<PresetId> {
        let mut ids = Vec::new();
        for id in self.entries.iter().filter_map(LocalPreset::id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

/// The whole persisted object: settings overlay, version counter and presets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    pub version: u32,
    pub setting_one: bool,
    pub setting_two: i32,
    pub presets: PresetStore,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            version: 0,
            setting_one: true,
            setting_two: 30,
            presets: PresetStore::default(),
            extra: Map::new(),
        }
    }
}

impl Configuration {
    /// Fresh configuration as shipped, including the bundled catalog preset at an
    /// older version so it can be updated from the catalog.
    pub fn factory() -> Self {
        let mut fields = Map::new();
        fields.insert("stringData".to_string(), Value::from("Bundled"));
        fields.insert("intData".to_string(), Value::from(1));
        Self {
            presets: PresetStore::new(vec![LocalPreset {
                metadata: Some(PresetMetadata { id: 1, version: 1 }),
                name: "Mod. Preset".to_string(),
                fields,
            }]),
            ..Self::default()
        }
    }
}

pub trait Persistence {
    fn save(&self, configuration: &Configuration) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(CONFIGURATION_FILE),
        }
    }

    pub fn load_or_create(&self) -> Result<Configuration> {
        if self.path.exists() {
            let raw = fs::read_to_string(&self.path).context("read configuration")?;
            let configuration: Configuration =
                serde_json::from_str(&raw).context("parse configuration")?;
            return Ok(configuration);
        }

        let configuration = Configuration::factory();
        self.save(&configuration)?;
        Ok(configuration)
    }
}

impl Persistence for ConfigFile {
    fn save(&self, configuration: &Configuration) -> Result<()> {
        let parent = self.path.parent().context("resolve configuration dir")?;
        fs::create_dir_all(parent).context("create configuration dir")?;
        let raw =
            serde_json::to_string_pretty(configuration).context("serialize configuration")?;
        let temp_path = parent.join(format!(".{CONFIGURATION_FILE}.tmp"));
        fs::write(&temp_path, raw).context("stage configuration")?;
        fs::rename(&temp_path, &self.path).context("replace configuration")?;
        Ok(())
    }
}

#[cfg(test)]
impl LocalPreset {
    pub(crate) fn bare(name: &str) -> Self {
        Self {
            metadata: None,
            name: name.to_string(),
            fields: Map::new(),
        }
    }
}
