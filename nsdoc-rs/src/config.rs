//! Contains the system configuration.
//!
//! The configuration is read from **config/settings.yml** when the platform is built. Afterwards
//! the file is checked every two seconds and re-read once its modification time moves. Each
//! successful load is broadcast to all [ChangeNotifier](ChangeNotifier)s. The
//! [Server](crate::server::Server) listens there to pick up a new host or port without a restart.
//!
//! The **docs** section is only read once, when the [handler](crate::handler::install) is
//! installed. Changing it requires a restart.
//!
//! A [Handle](Handle) obtained via [Config::current](Config::current) is a snapshot. It should be
//! used right away and not be stored, as it doesn't observe later reloads.
//!
//! # Examples
//!
//! ```
//! # use nsdoc::builder::Builder;
//! # use nsdoc::config::Config;
//! # #[tokio::main]
//! # async fn main() {
//! let platform = Builder::new().enable_config().build().await;
//! let config = platform.require::<Config>();
//!
//! let port = config.current().query("server.port").as_i64().unwrap_or(8080);
//! # }
//! ```
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use arc_swap::ArcSwap;
use yaml_rust::{Yaml, YamlLoader};

use crate::platform::Platform;

/// Contains the file which is loaded by [install](install).
pub const SETTINGS_FILE: &str = "config/settings.yml";

/// Determines how often the settings file is checked for changes.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Receives a message each time the config has been (re)loaded.
///
/// The message itself carries nothing. Receivers simply re-read whatever they need.
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

struct Snapshot {
    settings: Yaml,
    last_modified: Option<SystemTime>,
}

/// Provides access to the YAML settings of the system.
pub struct Config {
    path: PathBuf,
    tx: tokio::sync::broadcast::Sender<()>,
    snapshot: ArcSwap<Snapshot>,
}

/// A snapshot of the settings which were loaded at a certain point in time.
pub struct Handle {
    snapshot: Arc<Snapshot>,
}

impl Config {
    /// Creates an empty config which is backed by the given file.
    ///
    /// Nothing is read until [load](Config::load) is invoked.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            path: path.into(),
            tx,
            snapshot: ArcSwap::new(Arc::new(Snapshot {
                settings: Yaml::Null,
                last_modified: None,
            })),
        }
    }

    /// Subscribes to config changes.
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Returns a handle to the currently loaded settings.
    pub fn current(&self) -> Handle {
        Handle {
            snapshot: self.snapshot.load_full(),
        }
    }

    /// Returns the modification time of the backing file or **None** if there is no such file.
    ///
    /// A directory at the given path (e.g. an unmounted docker volume) is treated as absent.
    async fn last_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.path)
            .await
            .ok()
            .filter(|metadata| metadata.is_file())
            .and_then(|metadata| metadata.modified().ok())
    }

    /// Reads the backing file.
    ///
    /// A missing file is not an error and keeps the current settings.
    pub async fn load(&self) -> anyhow::Result<()> {
        let last_modified = match self.last_modified().await {
            Some(last_modified) => last_modified,
            None => {
                log::info!(
                    "No config file present at {} - using defaults.",
                    self.path.display()
                );
                return Ok(());
            }
        };

        log::info!("Loading config file {}...", self.path.display());
        let data = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Cannot load config file {}", self.path.display()))?;

        self.load_from_string(&data, Some(last_modified))
    }

    /// Re-reads the backing file if it has been modified since the last load.
    ///
    /// Returns **true** if new settings have been loaded.
    pub async fn reload_if_changed(&self) -> anyhow::Result<bool> {
        let last_modified = self.last_modified().await;
        let last_loaded = self.snapshot.load().last_modified;

        match (last_modified, last_loaded) {
            (Some(modified), Some(loaded)) if modified <= loaded => Ok(false),
            (None, _) => Ok(false),
            _ => self.load().await.map(|_| true),
        }
    }

    /// Parses the given YAML and makes it the current settings.
    ///
    /// Malformed input is rejected and keeps the current settings. Anything but a mapping at the
    /// top level is treated as empty.
    ///
    /// # Example
    ///
    /// ```
    /// # use nsdoc::config::Config;
    /// let config = Config::new("settings.yml");
    /// config.load_from_string("server:\n    port: 12345", None).unwrap();
    ///
    /// assert_eq!(config.current().query("server.port").as_i64(), Some(12345));
    /// assert!(config.load_from_string("server: 'broken", None).is_err());
    /// assert_eq!(config.current().query("server.port").as_i64(), Some(12345));
    /// ```
    pub fn load_from_string(
        &self,
        data: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let documents = YamlLoader::load_from_str(data)
            .with_context(|| format!("Cannot parse config file {}", self.path.display()))?;

        let settings = match documents.into_iter().next() {
            Some(settings @ Yaml::Hash(_)) => settings,
            _ => Yaml::Null,
        };

        self.snapshot.store(Arc::new(Snapshot {
            settings,
            last_modified,
        }));

        // Nobody might be listening, which is fine...
        let _ = self.tx.send(());

        Ok(())
    }
}

impl Handle {
    /// Resolves a dot separated path like **server.port**.
    ///
    /// Returns **Yaml::BadValue** if any segment of the path is absent.
    ///
    /// # Example
    ///
    /// ```
    /// # use nsdoc::config::Config;
    /// let config = Config::new("settings.yml");
    /// config.load_from_string("docs:\n    root: acme", None).unwrap();
    ///
    /// assert_eq!(config.current().query("docs.root").as_str(), Some("acme"));
    /// assert_eq!(config.current().query("docs.unknown.key").is_badvalue(), true);
    /// ```
    pub fn query(&self, path: impl AsRef<str>) -> &Yaml {
        path.as_ref()
            .split('.')
            .fold(&self.snapshot.settings, |node, key| &node[key])
    }
}

/// Creates the **Config** backed by [SETTINGS_FILE](SETTINGS_FILE), loads it and registers it in
/// the given platform.
///
/// Outside of tests, this also starts a task which reloads the file once it changes. This is
/// called by the [Builder](crate::builder::Builder) unless the config is disabled.
pub async fn install(platform: Arc<Platform>) {
    let config = Arc::new(Config::new(SETTINGS_FILE));
    platform.register::<Config>(config.clone());

    if let Err(error) = config.load().await {
        log::error!("{:#}", error);
    }

    watch_settings(platform, config);
}

#[cfg(test)]
fn watch_settings(_platform: Arc<Platform>, _config: Arc<Config>) {
    // Tests provide their settings via load_from_string...
}

#[cfg(not(test))]
fn watch_settings(platform: Arc<Platform>, config: Arc<Config>) {
    crate::spawn!(async move {
        while platform.is_running() {
            tokio::time::sleep(CHECK_INTERVAL).await;
            match config.reload_if_changed().await {
                Ok(true) => log::info!("System configuration was re-loaded."),
                Ok(false) => (),
                Err(error) => log::error!("Failed to re-load system config: {:#}", error),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use crate::builder::Builder;
    use crate::config::Config;

    #[test]
    fn malformed_updates_keep_the_settings() {
        crate::testing::test_async(async {
            let platform = Builder::new().enable_config().build().await;
            let config = platform.require::<Config>();
            config.load_from_string("test: 42", None).unwrap();

            let mut notifier = config.notifier();
            assert!(config.load_from_string("test: 'invalid", None).is_err());
            assert_eq!(config.current().query("test").as_i64(), Some(42));

            config.load_from_string("test: 4242", None).unwrap();
            notifier.recv().await.unwrap();
            assert_eq!(config.current().query("test").as_i64(), Some(4242));
        });
    }

    #[test]
    fn non_mappings_are_treated_as_empty() {
        let config = Config::new("settings.yml");
        config.load_from_string("- a\n- b", None).unwrap();
        assert!(config.current().query("a").is_badvalue());
    }

    #[test]
    fn modified_files_are_reloaded() {
        crate::testing::test_async(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("settings.yml");
            let config = Config::new(&path);

            // Without a file, there is nothing to load...
            config.load().await.unwrap();
            assert!(!config.reload_if_changed().await.unwrap());

            std::fs::write(&path, "server:\n    port: 1503").unwrap();
            assert!(config.reload_if_changed().await.unwrap());
            assert_eq!(config.current().query("server.port").as_i64(), Some(1503));
            assert!(!config.reload_if_changed().await.unwrap());

            std::fs::write(&path, "server:\n    port: 1504").unwrap();
            let file = std::fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(SystemTime::now() + Duration::from_secs(60))
                .unwrap();
            drop(file);

            assert!(config.reload_if_changed().await.unwrap());
            assert_eq!(config.current().query("server.port").as_i64(), Some(1504));
        });
    }
}
