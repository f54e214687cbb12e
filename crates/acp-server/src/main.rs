//! Test station binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the standard port with the default password
//! acp-server
//!
//! # Custom bind address and password
//! acp-server --bind 127.0.0.1:5009 --password testing
//! ```

use acp_proto::property::PropName;
use acp_server::{MemoryStore, NullRpcHandler, Server, ServerConfig};
use bytes::Bytes;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// ACP test station
#[derive(Parser, Debug)]
#[command(name = "acp-server")]
#[command(about = "Test station speaking the ACP management protocol")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = acp_server::DEFAULT_BIND)]
    bind: String,

    /// Administrator password clients must prove
    #[arg(short, long, default_value = "public")]
    password: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let store = MemoryStore::seeded([
        (PropName::new("syNm")?, Bytes::from_static(b"Base Station")),
        (PropName::new("syVs")?, Bytes::from_static(b"7.9.1")),
        (PropName::new("syLo")?, Bytes::from_static(b"attic")),
        (PropName::new("dbug")?, Bytes::from_static(&[0, 0, 0, 0])),
    ]);

    let config = ServerConfig { bind_address: args.bind, password: args.password };
    let server = Server::bind(config, store, NullRpcHandler).await?;

    tracing::info!("station listening on {}", server.local_addr()?);

    server.run().await?;
    Ok(())
}
