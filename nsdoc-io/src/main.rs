use nsdoc::builder::Builder;
use nsdoc::server::Server;

#[tokio::main]
async fn main() {
    // Build a platform and enable all features...
    let platform = Builder::new().enable_all().build().await;

    // Setup the documentation handler as described by the config...
    let handler = match nsdoc::handler::install(&platform) {
        Ok(handler) => handler,
        Err(error) => {
            log::error!("Failed to set up the documentation handler: {:#}", error);
            std::process::exit(1);
        }
    };

    platform.require::<Server>().event_loop().await;

    // Stop all background refreshers before exiting...
    handler.cache().shutdown().await;
    log::info!("nsdoc-io has been shut down.");
}
