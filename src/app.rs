use crate::{
    catalog::{CatalogRoot, PresetId, RemotePreset},
    client::{CatalogClient, CatalogSource},
    config::{self, AppConfig},
    coordinator::{PollEvent, RequestCoordinator, RequestState},
    log::ActivityLog,
    resolver::{ImportOutcome, Session},
    status::{Severity, StatusLine},
    store::{ConfigFile, Configuration},
};
use anyhow::Result;
use serde::Serialize;
use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// How a catalog preset is taken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Preset,
    Configuration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    pub updated: usize,
    pub current: usize,
    pub failed: usize,
}

/// Everything one front end needs, passed around explicitly.
pub struct App {
    pub app_config: AppConfig,
    pub data_dir: PathBuf,
    pub session: Session,
    pub coordinator: RequestCoordinator,
    pub status: StatusLine,
}

impl App {
    pub fn initialize(overrides: &ConfigOverrides) -> Result<Self> {
        let data_dir = config::base_data_dir()?;
        let mut app_config = AppConfig::load_or_create(&data_dir)?;
        overrides.apply(&mut app_config);

        let config_file = ConfigFile::new(&data_dir);
        let configuration = config_file.load_or_create()?;
        let log = ActivityLog::with_file(data_dir.join("presetsync.log"));
        let source: Arc<dyn CatalogSource> = Arc::new(CatalogClient::new(&app_config));

        Ok(Self::assemble(
            app_config,
            data_dir,
            Session::new(configuration, Box::new(config_file), log),
            source,
        ))
    }

    pub fn assemble(
        app_config: AppConfig,
        data_dir: PathBuf,
        session: Session,
        source: Arc<dyn CatalogSource>,
    ) -> Self {
        let status = StatusLine::new(Duration::from_millis(app_config.status_duration_ms));
        Self {
            app_config,
            data_dir,
            session,
            coordinator: RequestCoordinator::new(source),
            status,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        self.session.configuration()
    }

    /// One cooperative step: observe finished requests, expire the status line.
    pub fn tick(&mut self) {
        self.poll_catalog();
        self.poll_updates();
        self.status.tick(Instant::now());
    }

    pub fn request_catalog(&mut self) {
        if self.coordinator.request_catalog() {
            self.status.set("Fetching presets...", Severity::Default);
            self.session.log.info(format!(
                "Catalog fetch started ({})",
                self.app_config.plugin_name
            ));
        } else {
            self.session.log.warn("Catalog fetch already pending; request ignored".to_string());
        }
    }

    pub fn request_updates(&mut self) {
        let ids = self.configuration().presets.catalog_ids();
        match self.coordinator.request_updates(ids.clone()) {
            Ok(true) => {
                self.status.set("Checking for updates...", Severity::Default);
                self.session.log.info(format!("Update check started for {} preset(s)", ids.len()));
            }
            Ok(false) => {
                self.session.log.warn("Update check already pending; request ignored".to_string());
            }
            Err(err) if err.is_usage() => {
                self.status.set("No catalog presets installed", Severity::Warning);
                self.session.log.warn(format!("Update check not started: {err}"));
            }
            Err(err) => {
                self.status.set("Could not check for updates", Severity::Error);
                self.session.log.error(format!("Update check not started: {err}"));
            }
        }
    }

    pub fn catalog_state(&self) -> &RequestState<CatalogRoot> {
        self.coordinator.catalog.state()
    }

    pub fn updates_state(&self) -> &RequestState<Vec<RemotePreset>> {
        self.coordinator.updates.state()
    }

    pub fn catalog(&self) -> Option<&CatalogRoot> {
        match self.catalog_state() {
            RequestState::Succeeded(catalog) => Some(catalog),
            _ => None,
        }
    }

    pub fn discard_catalog(&mut self) {
        if !matches!(self.catalog_state(), RequestState::Idle) {
            self.coordinator.catalog.discard();
            self.session.log.info("Catalog request discarded".to_string());
        }
    }

    pub fn discard_updates(&mut self) {
        if !matches!(self.updates_state(), RequestState::Idle) {
            self.coordinator.updates.discard();
            self.session.log.info("Update request discarded".to_string());
        }
    }

    /// Remote presets from the last update check that are newer than the local copy.
    pub fn pending_updates(&self) -> Vec<&RemotePreset> {
        let RequestState::Succeeded(updates) = self.updates_state() else {
            return Vec::new();
        };
        let store = &self.configuration().presets;
        updates
            .iter()
            .filter(|remote| {
                store
                    .find(remote.id)
                    .and_then(|local| local.version())
                    .map(|version| version < remote.version)
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn apply_updates(&mut self) -> UpdateSummary {
        let updates: Vec<RemotePreset> = self.pending_updates().into_iter().cloned().collect();
        let mut summary = UpdateSummary::default();
        for remote in &updates {
            match self.session.import_preset(remote) {
                ImportOutcome::Updated | ImportOutcome::Success => summary.updated += 1,
                ImportOutcome::AlreadyExists => summary.current += 1,
                ImportOutcome::Failure => summary.failed += 1,
            }
        }

        if summary.failed > 0 {
            self.status.set(
                format!(
                    "Updated {} preset(s), {} failed",
                    summary.updated, summary.failed
                ),
                Severity::Error,
            );
        } else if summary.updated > 0 {
            self.status.set(
                format!("Updated {} preset(s)", summary.updated),
                Severity::Success,
            );
        } else {
            self.status.set("All presets up to date", Severity::Default);
        }
        summary
    }

    pub fn import(&mut self, remote: &RemotePreset, kind: ImportKind) -> ImportOutcome {
        let outcome = match kind {
            ImportKind::Preset => self.session.import_preset(remote),
            ImportKind::Configuration => self.session.import_configuration(&remote.data),
        };
        let (text, severity) = match outcome {
            ImportOutcome::Success => (format!("Imported \"{}\"", remote.name), Severity::Success),
            ImportOutcome::Updated => (
                format!("Updated \"{}\" to v{}", remote.name, remote.version),
                Severity::Success,
            ),
            ImportOutcome::AlreadyExists => (
                format!("\"{}\" is already up to date", remote.name),
                Severity::Warning,
            ),
            ImportOutcome::Failure => (
                format!("Could not import \"{}\"", remote.name),
                Severity::Error,
            ),
        };
        self.status.set(text, severity);
        outcome
    }

    /// Looks `id` up in the fetched catalog and imports it.
    pub fn import_from_catalog(&mut self, id: PresetId, kind: ImportKind) -> Option<ImportOutcome> {
        let remote = self.catalog()?.find_preset(id)?.clone();
        Some(self.import(&remote, kind))
    }

    pub fn reset_configuration(&mut self) -> bool {
        let restored = self.session.reset();
        if restored {
            self.status.set("Configuration reset", Severity::Success);
        } else {
            self.status.set("Configuration reset failed", Severity::Error);
        }
        restored
    }

    fn poll_catalog(&mut self) {
        match self.coordinator.catalog.poll() {
            PollEvent::Nothing => {}
            PollEvent::Completed => {
                let (name, count, skipped) = match self.catalog_state() {
                    RequestState::Succeeded(catalog) => {
                        let skipped = catalog.walk(&mut |_| {});
                        (catalog.name.clone(), catalog.preset_count(), skipped)
                    }
                    _ => return,
                };
                if skipped > 0 {
                    self.session.log.warn(format!(
                        "Catalog nests deeper than supported; {skipped} categories skipped"
                    ));
                }
                self.session.log.info(format!("Catalog \"{name}\" fetched: {count} preset(s)"));
                self.status.reset();
            }
            PollEvent::Faulted => {
                if let RequestState::Faulted(err) = self.catalog_state() {
                    let message = format!("Catalog fetch failed: {err}");
                    self.session.log.warn(message);
                }
                self.status.set("Could not fetch presets", Severity::Error);
            }
            PollEvent::DroppedStale => {
                self.session.log.info("Dropped result of a discarded catalog request".to_string());
            }
        }
    }

    fn poll_updates(&mut self) {
        match self.coordinator.updates.poll() {
            PollEvent::Nothing => {}
            PollEvent::Completed => {
                let pending = self.pending_updates().len();
                self.session.log.info(format!("Update check finished: {pending} newer preset(s)"));
                if pending == 0 {
                    self.status.set("All presets up to date", Severity::Default);
                } else {
                    self.status.set(format!("{pending} update(s) available"), Severity::Success);
                }
            }
            PollEvent::Faulted => {
                if let RequestState::Faulted(err) = self.updates_state() {
                    let message = format!("Update check failed: {err}");
                    self.session.log.warn(message);
                }
                self.status.set("Could not check for updates", Severity::Error);
            }
            PollEvent::DroppedStale => {
                self.session.log.info("Dropped result of a discarded update request".to_string());
            }
        }
    }
}

/// Per-invocation overrides that are never written back to `config.json`.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub server_url: Option<String>,
    pub plugin_name: Option<String>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.server_url {
            config.server_url = url.clone();
        }
        if let Some(name) = &self.plugin_name {
            config.plugin_name = name.clone();
        }
    }
}
