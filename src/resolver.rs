use crate::{
    catalog::RemotePreset,
    log::ActivityLog,
    store::{Configuration, LocalPreset, Persistence, PresetMetadata},
};
use serde_json::Value;

/// Result of one import. Closed on purpose: callers match all four.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Success,
    Updated,
    AlreadyExists,
    Failure,
}

/// Local state the resolver works against: the active configuration, the
/// collaborator that persists it, and the log.
pub struct Session {
    configuration: Configuration,
    persistence: Box<dyn Persistence>,
    pub log: ActivityLog,
}

impl Session {
    pub fn new(
        configuration: Configuration,
        persistence: Box<dyn Persistence>,
        log: ActivityLog,
    ) -> Self {
        Self {
            configuration,
            persistence,
            log,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Replaces the settings overlay with the one in `payload`. The current version
    /// counter and preset list are carried forward; the payload's own are ignored.
    pub fn import_configuration(&mut self, payload: &str) -> ImportOutcome {
        let mut body: Value = match serde_json::from_str(payload) {
            Ok(body) => body,
            Err(err) => {
                self.log.warn(format!("Configuration payload is not JSON: {err}"));
                return ImportOutcome::Failure;
            }
        };
        // Replaced below; their shape in the payload is irrelevant.
        if let Some(object) = body.as_object_mut() {
            object.remove("version");
            object.remove("presets");
        }
        let mut overlay: Configuration = match serde_json::from_value(body) {
            Ok(overlay) => overlay,
            Err(err) => {
                self.log.warn(format!("Configuration payload rejected: {err}"));
                return ImportOutcome::Failure;
            }
        };
        overlay.version = self.configuration.version;
        overlay.presets = self.configuration.presets.clone();

        if !self.commit(overlay) {
            return ImportOutcome::Failure;
        }
        self.log.info("Configuration overlay imported".to_string());
        ImportOutcome::Success
    }

    /// Adds `remote` to the preset list, or replaces the local copy in place when
    /// the remote version is strictly newer.
    pub fn import_preset(&mut self, remote: &RemotePreset) -> ImportOutcome {
        let Some(candidate) = self.candidate_from(remote) else {
            return ImportOutcome::Failure;
        };

        let mut next = self.configuration.clone();
        let store = &mut next.presets;
        let outcome = match store.find(remote.id) {
            None => {
                store.append(candidate);
                ImportOutcome::Success
            }
            Some(existing) if existing.version().unwrap_or(0) < remote.version => {
                let local_version = existing.version().unwrap_or(0);
                match store.index_of(existing) {
                    Some(index) => {
                        store.replace_at(index, candidate);
                    }
                    None => {
                        self.log.error(format!(
                            "Preset {} found but not indexable; re-appending",
                            remote.id
                        ));
                        store.remove_id(remote.id);
                        store.append(candidate);
                    }
                }
                self.log.info(format!(
                    "Preset {} updating v{local_version} -> v{}",
                    remote.id, remote.version
                ));
                ImportOutcome::Updated
            }
            Some(existing) => {
                self.log.info(format!(
                    "Preset {} already at v{} (remote v{})",
                    remote.id,
                    existing.version().unwrap_or(0),
                    remote.version
                ));
                return ImportOutcome::AlreadyExists;
            }
        };

        if !self.commit(next) {
            return ImportOutcome::Failure;
        }
        if outcome == ImportOutcome::Success {
            self.log.info(format!("Preset {} added at v{}", remote.id, remote.version));
        }
        outcome
    }

    /// Restores the shipped configuration and persists it.
    pub fn reset(&mut self) -> bool {
        let restored = self.commit(Configuration::factory());
        if restored {
            self.log.info("Configuration reset to defaults".to_string());
        }
        restored
    }

    fn candidate_from(&mut self, remote: &RemotePreset) -> Option<LocalPreset> {
        let mut body: Value = match serde_json::from_str(&remote.data) {
            Ok(body) => body,
            Err(err) => {
                self.log.warn(format!("Preset {} payload is not JSON: {err}", remote.id));
                return None;
            }
        };
        // Identity comes from the catalog record only.
        if let Some(object) = body.as_object_mut() {
            object.remove("metadata");
        }
        let mut candidate: LocalPreset = match serde_json::from_value(body) {
            Ok(candidate) => candidate,
            Err(err) => {
                self.log.warn(format!("Preset {} payload rejected: {err}", remote.id));
                return None;
            }
        };
        candidate.metadata = Some(PresetMetadata {
            id: remote.id,
            version: remote.version,
        });
        Some(candidate)
    }

    // Persist first, then swap in memory, so a failed save leaves state untouched.
    fn commit(&mut self, next: Configuration) -> bool {
        if let Err(err) = self.persistence.save(&next) {
            self.log.error(format!("Saving configuration failed: {err:#}"));
            return false;
        }
        self.configuration = next;
        true
    }
}
