//! chat-server - process entrypoint for one site in the federation.
//!
//! Parses CLI args, loads TOML config, wires the Presence Directory,
//! Exchange Node and Chat Node together, binds both listeners, spawns one
//! dialer task per peer, and serves until Ctrl-C.

mod config;

use std::sync::Arc;

use chat_node::auth::FileAuthenticator;
use chat_node::ChatNode;
use chat_presence::PresenceDirectory;
use clap::Parser;
use exchange_node::ExchangeNode;
use tokio::net::TcpListener;

use config::Config;

/// Federated end-to-end-encrypted chat service - one site's server process.
#[derive(Parser)]
#[command(name = "chat-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "chat-server.toml")]
    config: String,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { config.logging.level.as_str() })
        .init();

    tracing::info!(server_name = %config.server_name, "starting chat-server");

    let directory = Arc::new(PresenceDirectory::new());

    let peers: Vec<(String, String, u16)> =
        config.remote_servers.iter().map(|r| (r.name.clone(), r.host.clone(), r.port)).collect();
    let exchange = ExchangeNode::new(config.server_name.clone(), directory, peers);

    let authenticator = Arc::new(FileAuthenticator::new(config.credentials_file.clone()));
    let chat = ChatNode::new(config.server_name.clone(), authenticator);

    exchange.set_chat_handle(chat.clone());
    chat.set_exchange_handle(exchange.clone());

    let chat_listener = TcpListener::bind((config.chat_server.host.as_str(), config.chat_server.port)).await?;
    tracing::info!(addr = %chat_listener.local_addr()?, "chat server listening");

    let exchange_listener = TcpListener::bind((config.exchange_server.host.as_str(), config.exchange_server.port)).await?;
    tracing::info!(addr = %exchange_listener.local_addr()?, "exchange server listening");

    let dialer_handles: Vec<tokio::task::JoinHandle<()>> = config
        .remote_servers
        .iter()
        .map(|remote| {
            let exchange = exchange.clone();
            let peer_name = remote.name.clone();
            tokio::spawn(async move { exchange.spawn_dialer(peer_name).await })
        })
        .collect();

    let chat_accept_loop = {
        let chat = chat.clone();
        async move {
            loop {
                match chat_listener.accept().await {
                    Ok((stream, addr)) => {
                        let chat = chat.clone();
                        tracing::debug!(%addr, "accepted client connection");
                        tokio::spawn(async move { chat.handle_connection(stream).await });
                    }
                    Err(err) => tracing::warn!(error = %err, "client listener accept failed"),
                }
            }
        }
    };

    let exchange_accept_loop = {
        let exchange = exchange.clone();
        async move {
            loop {
                match exchange_listener.accept().await {
                    Ok((stream, addr)) => {
                        let exchange = exchange.clone();
                        tracing::debug!(%addr, "accepted peer connection");
                        tokio::spawn(async move { exchange.handle_inbound(stream, addr.ip()).await });
                    }
                    Err(err) => tracing::warn!(error = %err, "peer listener accept failed"),
                }
            }
        }
    };

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = chat_accept_loop => {}
        _ = exchange_accept_loop => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
        _ = sigterm.recv() => {
            tracing::info!("received sigterm, shutting down");
        }
    }

    for handle in dialer_handles {
        handle.abort();
    }

    Ok(())
}
