use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, instrument, trace, warn};

use crate::models::Settings;

/// Loads, saves and broadcasts the application settings
#[derive(Debug, Clone)]
pub struct SettingsHandler {
    settings_file_path: PathBuf,
    watch_tx: watch::Sender<Settings>,
}

impl SettingsHandler {
    /// Loads `<app_dir>/settings.json`, falling back to defaults if it is unreadable
    #[instrument(skip(app_dir), err)]
    pub fn new(app_dir: &Path) -> Result<Self> {
        let handler = Self {
            settings_file_path: app_dir.join("settings.json"),
            watch_tx: watch::Sender::new(Settings::default()),
        };

        let settings = match handler.load_settings() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = e.as_ref() as &dyn Error, "Failed to load settings, using defaults");
                handler.load_default_settings()?
            }
        };
        handler.on_settings_change(settings);
        Ok(handler)
    }

    /// Currently active settings
    pub fn current(&self) -> Settings {
        self.watch_tx.borrow().clone()
    }

    /// Saves `settings` and makes them active
    #[instrument(skip(self, settings), err)]
    pub fn update(&self, settings: Settings) -> Result<()> {
        ensure!(!settings.backups_location.is_empty(), "Backups location must not be empty");
        ensure!(settings.batch_concurrency > 0, "Batch concurrency must be at least 1");
        self.save_settings(&settings)?;
        self.on_settings_change(settings);
        Ok(())
    }

    fn on_settings_change(&self, settings: Settings) {
        self.watch_tx.send_if_modified(|s| {
            if s != &settings {
                debug!(settings = ?settings, "Active settings changed");
                *s = settings;
                true
            } else {
                trace!("Settings unchanged");
                false
            }
        });
    }

    /// Stream of the active settings, starting with the current value
    pub fn subscribe(&self) -> WatchStream<Settings> {
        WatchStream::new(self.watch_tx.subscribe())
    }

    /// Load settings from file or return defaults if file doesn't exist
    #[instrument(skip(self))]
    fn load_settings(&self) -> Result<Settings> {
        if !self.settings_file_path.exists() {
            info!(path = %self.settings_file_path.display(), "Settings file doesn't exist, using defaults");
            return self.load_default_settings().context("Failed to load default settings");
        }

        info!(path = %self.settings_file_path.display(), "Loading settings from file");
        let file_content =
            fs::read_to_string(&self.settings_file_path).context("Failed to read settings file")?;
        let settings: Settings =
            serde_json::from_str(&file_content).context("Failed to parse settings file")?;

        debug!("Loaded application settings successfully");
        Ok(settings)
    }

    /// Save settings to file
    #[instrument(skip(self, settings))]
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        info!(path = %self.settings_file_path.display(), "Saving settings to file");
        let settings_json =
            serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

        if let Some(parent) = self.settings_file_path.parent()
            && !parent.exists()
        {
            info!(path = %parent.display(), "Creating settings directory");
            fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }

        fs::write(&self.settings_file_path, settings_json)
            .context("Failed to write settings file")?;

        info!("Saved application settings successfully");
        Ok(())
    }

    /// Load default settings, creating the backups directory if its parent exists
    #[instrument(skip(self))]
    pub fn load_default_settings(&self) -> Result<Settings> {
        info!("Loading default settings");
        let settings = Settings::default();

        debug!(path = %settings.backups_location, "Ensuring backups directory exists");
        let backups_parent = Path::new(&settings.backups_location)
            .parent()
            .context("Failed to get backups directory parent")?;
        ensure!(
            backups_parent.exists(),
            "Backups directory parent ({}) does not exist",
            backups_parent.display()
        );
        fs::create_dir_all(&settings.backups_location)
            .context("Failed to create backups directory")?;

        self.save_settings(&settings)?;
        info!("Default settings loaded and saved");
        Ok(settings)
    }
}
