//! nsdoc serves rendered documentation of a tree of Rust namespaces via HTTP.
//!
//! # Introduction
//! Point **nsdoc** to a directory of Rust sources and it will serve a documentation page for the
//! root namespace as well as for each directory below it which contains Rust sources. Pages are
//! rendered lazily: nothing happens until a page is requested for the first time. From then on,
//! the page is delivered from memory and kept up to date by a background task which re-renders it
//! periodically (once an hour by default).
//!
//! # Architecture
//! * [inspector](inspector) extracts the structured documentation of a namespace (its
//!   [Package](package::Package)) from the sources.
//! * [render](render) turns a package into bytes. By default a **Tera** template is applied.
//! * [fetch](fetch) combines both into a single step which produces an [Artifact](artifact::Artifact).
//! * [cache](cache) stores artifacts, ensures that each name is only rendered once even if it is
//!   requested concurrently and runs one refresher per cached name.
//! * [handler](handler) maps HTTP requests to names and delivers artifacts via [content](content)
//!   which also takes care of conditional and range requests.
//!
//! All of these are wired together by a small framework: a [Platform](platform::Platform) which
//! holds all components, a [Builder](builder::Builder) which sets them up, a reload-aware
//! [Config](config::Config) and the HTTP [Server](server::Server).
//!
//! # Features
//! * **Lazy rendering with request coalescing** - a render never blocks the cache for other names
//!   and concurrent requests for the same name wait for a single render.
//! * **Background refresh** - each cached page is re-rendered periodically. Its **Last-Modified**
//!   timestamp only changes if the rendered output actually changed, so clients can rely on
//!   conditional requests.
//! * **100% Async/Await** - the whole server builds upon [tokio](https://tokio.rs/) and
//!   [hyper](https://hyper.rs/). Inspecting and rendering is moved to the blocking thread pool.
//! * **Reload-aware config facility** which permits to change the IP binding or port during
//!   operation without any restart.
//!
//! # Examples
//! A complete example of using nsdoc can be found in **nsdoc-io**, which simply serves the
//! configured source directory. A short example on how to initialize the library can be found
//! here: [Builder](builder::Builder).
#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod artifact;
pub mod builder;
pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod fetch;
pub mod fmt;
pub mod handler;
pub mod inspector;
pub mod options;
pub mod package;
pub mod platform;
pub mod render;
pub mod server;
pub mod signals;

/// Contains the version of the nsdoc library.
pub const NSDOC_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the nsdoc build being used.
pub const NSDOC_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// Note that most probably the simplest way is to use a [Builder](builder::Builder) to set up the
/// framework, which will also set up logging if enabled.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // We need to do this as otherwise the integration tests might crash as the logging system
    // is initialized several times...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Provides a simple macro to execute an async lambda within `tokio::spawn`.
///
/// Note that this also applies std::mem::drop on the returned closure to make
/// clippy happy.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate nsdoc;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
/// ```
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}
