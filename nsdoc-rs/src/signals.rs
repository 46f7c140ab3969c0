//! Installs a signal handler which terminates the platform on CTRL+C or SIGHUP.
//!
//! Forks an async task which waits for either **CTRL+C** or **SIGHUP** and then invokes
//! [Platform::terminate](crate::platform::Platform::terminate) on the given platform. This makes
//! the [Server](crate::server::Server) stop accepting requests, so that **nsdoc-io** can stop all
//! documentation refreshers and exit.
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};

use crate::platform::Platform;

/// Installs a signal handler for the given platform which awaits either a **CTRL+C** or **SIGHUP**.
///
/// Note that this is automatically called by the [Builder](crate::builder::Builder) unless it is
/// disabled. If no handler for **SIGHUP** can be registered, only **CTRL+C** is observed.
pub fn install(platform: Arc<Platform>) {
    let _ = tokio::spawn(async move {
        let mut sig_hup = match signal(SignalKind::hangup()) {
            Ok(sig_hup) => Some(sig_hup),
            Err(error) => {
                log::error!("Cannot install a handler for SIGHUP: {}", error);
                None
            }
        };

        let hang_up = async {
            match sig_hup.as_mut() {
                Some(sig_hup) => {
                    let _ = sig_hup.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received CTRL-C. Shutting down...");
            },
            _ = hang_up => {
                log::info!("Received SIGHUP. Shutting down...");
            }
        }

        platform.terminate();
    });
}
