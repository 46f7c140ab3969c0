//! Provides a builder which can be used to setup and initialize the framework.
//!
//! This is used to create and set up the central parts of the system: logging, the signal
//! handler, the [Config](crate::config::Config) and the [Server](crate::server::Server). Each of
//! them can be selectively enabled or disabled (tests e.g. commonly skip the signal handler).
//!
//! Note that the documentation handler itself is installed separately via
//! [handler::install](crate::handler::install) as this can fail (e.g. due to a broken template).
//!
//! # Example
//! Setting up the framework with all features enabled:
//! ```no_run
//! # use nsdoc::builder::Builder;
//! # use nsdoc::server::Server;
//! #[tokio::main]
//! async fn main() {
//!     // Enable all features and build the platform...
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     // Install the documentation handler...
//!     nsdoc::handler::install(&platform).unwrap();
//!
//!     // Start the main event loop of the server...
//!     platform.require::<Server>().event_loop().await;
//! }
//! ```
use std::sync::Arc;

use crate::platform::Platform;
use crate::{init_logging, NSDOC_REVISION, NSDOC_VERSION};

/// Initializes the framework by creating and initializing all core components.
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
    setup_server: bool,
}

impl Builder {
    /// Creates a new builder with all components disabled.
    pub fn new() -> Self {
        Builder::default()
    }

    /// Enables all features.
    ///
    /// Note that using this method (and then maybe disabling selected components) is quote
    /// convenient, but be aware that new components which might be added in a library update
    /// will then also be enabled by default. This might or might not be the expected behaviour.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;
        self.setup_server = true;

        self
    }

    /// Enables the automatic setup of the logging system.
    ///
    /// Using this, we properly initialize **simplelog** to log to stdout. As we intend nsdoc
    /// to be run in docker containers, this is all that is needed for proper logging. The date
    /// format being used is digestible by established tools like **greylog**.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the automatic setup of the logging system after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Installs a signal listener which terminates the framework once **CTRL-C** or **SIGHUP**
    /// is received.
    ///
    /// For more details see: [signals](crate::signals)
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Disables installing the signal listener after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Installs [config::Config](crate::config::Config) and loads the **settings.yml**.
    ///
    /// For more details see: [config](crate::config)
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Disables setting up a **Config** instance after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_config(mut self) -> Self {
        self.setup_config = false;
        self
    }

    /// Creates and installs a [Server](crate::server::Server) instance.
    ///
    /// For more details see: [server](crate::server::Server). Note that still, the main event loop
    /// has to be invoked manually via: `platform.require::<Server>().event_loop().await`.
    pub fn enable_server(mut self) -> Self {
        self.setup_server = true;
        self
    }

    /// Disables setting up a **Server** instance after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_server(mut self) -> Self {
        self.setup_server = false;
        self
    }

    /// Builds the [Platform](crate::platform::Platform) registry with all the enabled components
    /// being registered.
    pub async fn build(self) -> Arc<Platform> {
        let platform = Platform::new();

        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "||. NSDOC (v {} - rev {}) running on {} core(s) in {} CPU(s)",
            NSDOC_VERSION,
            NSDOC_REVISION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        if self.enable_signals {
            crate::signals::install(platform.clone());
        }

        if self.setup_config {
            crate::config::install(platform.clone()).await;
        }

        if self.setup_server {
            let _ = crate::server::Server::install(&platform);
        }

        platform
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::config::Config;
    use crate::server::Server;

    #[test]
    fn logging_can_be_initialized_repeatedly() {
        crate::init_logging();
        crate::init_logging();
        log::info!("Logging is up and running.");
    }

    #[test]
    fn only_enabled_components_are_installed() {
        crate::testing::test_async(async {
            let platform = Builder::new().enable_config().build().await;
            assert!(platform.find::<Config>().is_some());
            assert!(platform.find::<Server>().is_none());

            let platform = Builder::new()
                .enable_all()
                .disable_signals()
                .disable_config()
                .build()
                .await;
            assert!(platform.find::<Config>().is_none());
            assert!(platform.find::<Server>().is_some());
        });
    }
}
