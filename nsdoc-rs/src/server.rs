//! Contains the HTTP server which delivers the documentation.
//!
//! Opens a server-socket on the specified port (**server.port** in the config or 8080 as fallback)
//! and binds it to the selected IP (**server.host** in the config or 0.0.0.0 as fallback). Each
//! incoming connection is served by **hyper** and all requests are dispatched to the
//! [DocHandler](crate::handler::DocHandler) registered in the platform.
//!
//! Note that the server will periodically try to bind the socket to the selected port, therefore a
//! "new" instance can be started and the "old" one can bleed out and the port will be "handed
//! through" with minimal downtime. Also, this will listen to change events of the config and will
//! relocate to another port or host if changed.
//!
//! Once the platform is terminated, the server socket is closed and all open connections are
//! shut down gracefully, so that requests in progress are still answered.
//!
//! # Example
//!
//! ```no_run
//! use nsdoc::builder::Builder;
//! use nsdoc::config::Config;
//! use nsdoc::server::Server;
//!
//! #[tokio::main]
//! async fn main() {
//!     //  Setup and create a platform...
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     // Specify a minimal config so that we run on a different port than a
//!     // production instance.
//!     platform.require::<Config>().load_from_string("
//!         server:
//!             port: 1503
//!     ", None).unwrap();
//!
//!     // Install the handler which actually serves the documentation...
//!     nsdoc::handler::install(&platform).unwrap();
//!
//!     // Run the platform...
//!     platform.require::<Server>().event_loop().await;
//! }
//! ```
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Body, Request, Response, StatusCode};
use tokio::net::{TcpListener, TcpStream};

use crate::config::Config;
use crate::handler::{status_response, DocHandler};
use crate::platform::Platform;
use crate::spawn;

/// Contains the port used if none is configured.
pub const DEFAULT_PORT: u16 = 8080;

/// Specifies the timeout when waiting for a new incoming connection.
///
/// When waiting for a new connection we need to interrupt this every once in a while so that
/// we can check if the platform has been shut down.
const CONNECT_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Specifies how often an open connection checks if the platform is still running.
const CONNECTION_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Represents a server which manages all HTTP connections.
pub struct Server {
    running: AtomicBool,
    current_address: Mutex<Option<String>>,
    platform: Arc<Platform>,
    connections: AtomicUsize,
}

impl Server {
    /// Creates and installs a **Server** into the given **Platform**.
    ///
    /// Note that this is called by the [Builder](crate::builder::Builder) unless disabled.
    ///
    /// Also note, that this will not technically start the server. This has to be done manually
    /// via [event_loop](Server::event_loop) as it is most probable done in the main thread.
    pub fn install(platform: &Arc<Platform>) -> Arc<Self> {
        let server = Arc::new(Server {
            running: AtomicBool::new(false),
            current_address: Mutex::new(None),
            platform: platform.clone(),
            connections: AtomicUsize::new(0),
        });

        platform.register::<Server>(server.clone());

        server
    }

    /// Returns the number of currently open connections.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// Returns the address the server socket is currently bound to (if any).
    pub fn current_address(&self) -> Option<String> {
        self.current_address
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Determines if the server socket should keep listening for incoming connections.
    ///
    /// In contrast to **Platform::is_running** this is not used to control the shutdown of the
    /// server. Rather we toggle this flag to false if a config and therefore address change was
    /// detected. This way **server_loop** will exit and a new server socket for the appropriate
    /// address will be setup by the **event_loop**.
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Determines the server address based on the current configuration.
    ///
    /// If no, an invalid or a partial config is present, fallback values are used. By default we
    /// use port 8080 and bind to "0.0.0.0".
    fn address(&self) -> String {
        self.platform
            .find::<Config>()
            .map(|config| {
                let handle = config.current();
                format!(
                    "{}:{}",
                    handle.query("server.host").as_str().unwrap_or("0.0.0.0"),
                    handle
                        .query("server.port")
                        .as_i64()
                        .filter(|port| port > &0 && port <= &(u16::MAX as i64))
                        .unwrap_or(DEFAULT_PORT as i64)
                )
            })
            .unwrap_or_else(|| format!("0.0.0.0:{}", DEFAULT_PORT))
    }

    /// Starts the event loop in a separate task.
    ///
    /// This is most probably used by test scenarios where the tests itself run in the main thread.
    pub fn fork(server: &Arc<Server>) {
        let cloned_server = server.clone();
        spawn!(async move {
            cloned_server.event_loop().await;
        });
    }

    /// Starts the event loop in a separate task and waits until the server socket is bound.
    ///
    /// Just like **fork** this is intended to be used in test environments.
    pub async fn fork_and_await(server: &Arc<Server>) {
        Server::fork(server);

        while server.current_address().is_none() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Tries to open a server socket on the specified address to serve incoming client connections.
    ///
    /// The task of this loop is to bind the server socket to the specified address. Once this was
    /// successful, we enter the [server_loop](Server::server_loop) to actually handle incoming
    /// connections. Once this loop returns, either the platform is no longer running and we should
    /// exit, or the config has changed and we should try to bind the server to the new address.
    pub async fn event_loop(&self) {
        let mut address = String::new();
        let mut last_bind_error_reported = Instant::now();

        while self.platform.is_running() {
            // If the sever is started for the first time or if it has been restarted due to a
            // config change, we need to reload the address...
            if !self.is_running() {
                address = self.address();
                self.running.store(true, Ordering::Release);
            }

            // Bind and hopefully enter the server_loop...
            if let Ok(listener) = TcpListener::bind(&address).await {
                log::info!("Opened server socket on {}...", &address);
                *self
                    .current_address
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(address.clone());
                self.server_loop(&listener).await;
                *self
                    .current_address
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = None;
                log::info!("Closing server socket on {}.", &address);
            } else {
                // If we were unable to bind to the server, we log this every once in a while
                // (every 5s). Otherwise we would jam the log as re retry every 500ms.
                if Instant::now()
                    .duration_since(last_bind_error_reported)
                    .as_secs()
                    > 5
                {
                    log::error!(
                        "Cannot open server address: {}. Retrying every 500ms...",
                        &address
                    );
                    last_bind_error_reported = Instant::now();
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    /// Runs the main server loop which processes incoming connections.
    ///
    /// This also listens on config changes and exits to the event_loop if necessary (server
    /// address changed...).
    async fn server_loop(&self, listener: &TcpListener) {
        let mut config_changed_flag = self
            .platform
            .find::<Config>()
            .map(|config| config.notifier());

        while self.platform.is_running() && self.is_running() {
            tokio::select! {
                // We use a timeout here so that the while condition (esp. platform.is_running())
                // is checked every once in a while...
                timeout_stream = tokio::time::timeout(CONNECT_WAIT_TIMEOUT, listener.accept()) => {
                    // We're only interested in a positive result here, as an Err simply indicates
                    // that the timeout was hit...
                    if let Ok(stream) = timeout_stream {
                        match stream {
                            Ok((stream, _)) => self.handle_new_connection(stream),
                            Err(error) => {
                                // The socket is broken, therefore we exit to the event_loop which
                                // will either exit or try to re-create the socket.
                                log::error!("Failed to accept a connection: {}", error);
                                return;
                            }
                        }
                    }
                }
                _ = wait_for_change(&mut config_changed_flag) => {
                    // If the config was changed, we need to check if the address itself changed...
                    let new_address = self.address();
                    if self.current_address().as_ref() != Some(&new_address) {
                        log::info!("Server address has changed. Restarting server socket...");

                        // Force the event_loop to re-evaluate the expected server address...
                        self.running.store(false, Ordering::Release);

                        // Return to event_loop so that the server socket is re-created...
                        return;
                    }
                }
            }
        }
    }

    /// Handles a new incoming connection.
    ///
    /// This forks a task which serves HTTP requests on the given stream until either the client
    /// closes the connection or the platform is shut down.
    fn handle_new_connection(&self, stream: TcpStream) {
        let platform = self.platform.clone();
        let _ = stream.set_nodelay(true);
        let peer_address = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "<unknown>".to_owned());

        spawn!(async move {
            let server = match platform.find::<Server>() {
                Some(server) => server,
                None => return,
            };

            log::debug!("Opened connection from {}...", peer_address);
            let _ = server.connections.fetch_add(1, Ordering::AcqRel);

            let service_platform = platform.clone();
            let service = service_fn(move |request: Request<Body>| {
                let platform = service_platform.clone();
                async move { Ok::<_, Infallible>(dispatch(&platform, request).await) }
            });

            let connection = Http::new().serve_connection(stream, service);
            tokio::pin!(connection);

            let mut shutting_down = false;
            loop {
                tokio::select! {
                    result = &mut connection => {
                        if let Err(error) = result {
                            log::debug!("An error occurred in connection {}: {}", peer_address, error);
                        }
                        break;
                    }
                    _ = tokio::time::sleep(CONNECTION_CHECK_INTERVAL), if !shutting_down => {
                        if !platform.is_running() {
                            connection.as_mut().graceful_shutdown();
                            shutting_down = true;
                        }
                    }
                }
            }

            log::debug!("Closing connection to {}...", peer_address);
            let _ = server.connections.fetch_sub(1, Ordering::AcqRel);
        });
    }
}

/// Waits for the next config change or forever if no config is present.
async fn wait_for_change(
    notifier: &mut Option<crate::config::ChangeNotifier>,
) -> Result<(), tokio::sync::broadcast::error::RecvError> {
    match notifier {
        Some(notifier) => notifier.recv().await,
        None => std::future::pending().await,
    }
}

/// Hands the given request to the registered documentation handler.
async fn dispatch(platform: &Arc<Platform>, request: Request<Body>) -> Response<Body> {
    log::debug!("{} {}", request.method(), request.uri());

    match platform.find::<DocHandler>() {
        Some(handler) => handler.handle(request).await,
        None => status_response(StatusCode::SERVICE_UNAVAILABLE),
    }
}
