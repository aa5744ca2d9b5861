use std::error::Error;
use std::sync::Arc;

use log::{error, info};
use tokio::net::TcpListener;

use game_tcp_server::store::MemoryStore;
use game_tcp_server::{Config, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    let addr = config.bind_addr();
    info!("Attempting to bind to {}", addr);

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return Err(e.into());
        }
    };

    let server = Server::with_store(Arc::new(MemoryStore::new()), &config);
    server.run(listener).await?;
    Ok(())
}
