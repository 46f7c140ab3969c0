//! Describes how the documentation handler is set up.
//!
//! [Options](Options) start with sensible defaults and are customized by chaining the provided
//! setters. They are consumed by [install_with](crate::handler::install_with), which is also what
//! [install](crate::handler::install) does after reading them from the system config via
//! [Options::from_config](Options::from_config).
//!
//! # Configuration
//!
//! ```yaml
//! server:
//!     # Serves the documentation below this path prefix (none by default).
//!     mount: /docs
//! docs:
//!     # The name of the namespace served at the mount point (default: src).
//!     root: acme
//!     # The directory in which namespaces are resolved (default: the working directory).
//!     source: .
//!     # Specifies how often cached documentation is re-rendered. Supports common suffixes
//!     # like: ms, s, m, h, d (default: 1h).
//!     refresh_interval: 1h
//!     # A file containing a custom Tera template (the built-in template is used by default).
//!     template: templates/package.html
//!     # A stylesheet which is linked by the template (none by default).
//!     stylesheet: /static/docs.css
//!     # Logs the outcome of each background refresh (default: false).
//!     log_refresh: false
//! ```
//!
//! # Examples
//!
//! ```
//! # use std::time::Duration;
//! # use nsdoc::options::Options;
//! let options = Options::new("acme")
//!     .source_dir("src")
//!     .refresh_interval(Duration::from_secs(15 * 60))
//!     .stylesheet_url("/static/docs.css");
//!
//! assert_eq!(options.root(), "acme");
//! assert_eq!(options.refresh_interval_value(), Duration::from_secs(900));
//! ```
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::refresher::{LogListener, RefreshListener, SilentListener};
use crate::cache::DocCache;
use crate::config::Handle;
use crate::fetch::Fetcher;
use crate::fmt::{format_duration, parse_duration};
use crate::handler::{DefaultErrorHandler, ErrorHandler};
use crate::inspector::{DirectoryInspector, SourceInspector};
use crate::render::{Renderer, TemplateRenderer, DEFAULT_STYLESHEET, DEFAULT_TEMPLATE};

/// Contains the default interval in which cached documentation is re-rendered.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Contains the root name used if none is configured.
pub const DEFAULT_ROOT: &str = "src";

/// Collects all settings of the documentation handler.
pub struct Options {
    root: String,
    mount: String,
    source_dir: PathBuf,
    refresh_interval: Duration,
    template: String,
    stylesheet_url: String,
    inspector: Option<Arc<dyn SourceInspector>>,
    renderer: Option<Arc<dyn Renderer>>,
    error_handler: Arc<dyn ErrorHandler>,
    refresh_listener: Arc<dyn RefreshListener>,
}

impl Options {
    /// Creates the default options for serving the given root namespace.
    pub fn new(root: impl Into<String>) -> Self {
        Options {
            root: root.into(),
            mount: String::new(),
            source_dir: PathBuf::from("."),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            template: DEFAULT_TEMPLATE.to_owned(),
            stylesheet_url: DEFAULT_STYLESHEET.to_owned(),
            inspector: None,
            renderer: None,
            error_handler: Arc::new(DefaultErrorHandler),
            refresh_listener: Arc::new(SilentListener),
        }
    }

    /// Reads the options from the given config handle.
    ///
    /// Invalid values are logged and replaced by their defaults.
    pub fn from_config(handle: &Handle) -> Self {
        let docs = handle.query("docs");
        let mut options =
            Options::new(docs["root"].as_str().unwrap_or(DEFAULT_ROOT)).source_dir(
                docs["source"].as_str().unwrap_or("."),
            );

        if let Some(mount) = handle.query("server.mount").as_str() {
            options = options.mount(mount);
        }

        if let Some(interval) = docs["refresh_interval"].as_str() {
            match parse_duration(interval) {
                Ok(interval) => options = options.refresh_interval(interval),
                Err(error) => log::error!("Invalid docs.refresh_interval: {}", error),
            }
        } else if let Some(millis) = docs["refresh_interval"].as_i64() {
            options = options.refresh_interval(Duration::from_millis(millis.max(0) as u64));
        }

        if let Some(file) = docs["template"].as_str() {
            options = options.template_file(file);
        }

        if let Some(href) = docs["stylesheet"].as_str() {
            options = options.stylesheet_url(href);
        }

        if docs["log_refresh"].as_bool().unwrap_or(false) {
            options = options.refresh_listener(Arc::new(LogListener));
        }

        options
    }

    /// Specifies the path prefix below which the documentation is served.
    ///
    /// Leading and trailing slashes are normalized, so **docs**, **/docs** and **/docs/** are
    /// all treated the same.
    pub fn mount(mut self, mount: &str) -> Self {
        let trimmed = mount.trim_matches('/');
        self.mount = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        };
        self
    }

    /// Specifies the directory in which the default inspector resolves namespace names.
    pub fn source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = dir.into();
        self
    }

    /// Specifies how often cached documentation is re-rendered in the background.
    ///
    /// An empty interval is rejected with a warning and the current interval is kept.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            log::warn!(
                "A refresh interval of zero is not supported - keeping {}.",
                format_duration(self.refresh_interval)
            );
        } else {
            self.refresh_interval = interval;
        }
        self
    }

    /// Specifies the template applied by the default renderer.
    ///
    /// This is ignored if a custom [renderer](Options::renderer) is given.
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Reads the template applied by the default renderer from the given file.
    ///
    /// If the file cannot be read, a warning is logged and the current template is kept.
    pub fn template_file(self, file: impl AsRef<Path>) -> Self {
        match std::fs::read_to_string(file.as_ref()) {
            Ok(template) => self.template(template),
            Err(error) => {
                log::warn!(
                    "Cannot read template {}: {} - Keeping the current template.",
                    file.as_ref().display(),
                    error
                );
                self
            }
        }
    }

    /// Specifies the stylesheet which is linked by the default template.
    pub fn stylesheet_url(mut self, href: impl Into<String>) -> Self {
        self.stylesheet_url = href.into();
        self
    }

    /// Replaces the default inspector, which scans the source directory.
    pub fn inspector(mut self, inspector: Arc<dyn SourceInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    /// Replaces the default template based renderer.
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Replaces the default error handler, which reports import errors as **404** and everything
    /// else as **500**.
    pub fn error_handler(mut self, error_handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = error_handler;
        self
    }

    /// Installs a listener which is notified about the outcome of each background refresh.
    pub fn refresh_listener(mut self, listener: Arc<dyn RefreshListener>) -> Self {
        self.refresh_listener = listener;
        self
    }

    /// Returns the root namespace.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Returns the normalized mount point (empty if the documentation is served at "/").
    pub fn mount_point(&self) -> &str {
        &self.mount
    }

    /// Returns the configured refresh interval.
    pub fn refresh_interval_value(&self) -> Duration {
        self.refresh_interval
    }

    /// Returns the configured error handler.
    pub fn error_handler_value(&self) -> Arc<dyn ErrorHandler> {
        self.error_handler.clone()
    }

    /// Creates the cache described by these options.
    ///
    /// Fails if the template cannot be compiled.
    pub fn build_cache(&self) -> anyhow::Result<Arc<DocCache>> {
        let inspector: Arc<dyn SourceInspector> = match &self.inspector {
            Some(inspector) => inspector.clone(),
            None => Arc::new(DirectoryInspector::new(self.source_dir.clone())),
        };
        let renderer: Arc<dyn Renderer> = match &self.renderer {
            Some(renderer) => renderer.clone(),
            None => Arc::new(TemplateRenderer::new(&self.template, &self.stylesheet_url)?),
        };

        log::info!(
            "Serving documentation of '{}' from {} (refreshed every {})...",
            self.root,
            self.source_dir.display(),
            format_duration(self.refresh_interval)
        );

        Ok(DocCache::new(
            Fetcher::new(inspector, renderer),
            self.refresh_interval,
            self.refresh_listener.clone(),
        ))
    }
}
