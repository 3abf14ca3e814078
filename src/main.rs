//! OmokNet - Peer-to-peer omok
//!
//! Run a rendezvous server, or find an opponent through one and play.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use omoknet::config::{self, Config};
use omoknet::network::{
    resolve_host, Connection, RendezvousClient, RendezvousServer, ServerConfig, ServerEvent, UdpLink,
};
use omoknet::protocol::{self, DisplayName};
use omoknet::session::{Flow, LocalCommand, PeerSession, SessionConfig, SessionEvent, Side};

/// OmokNet - peer-to-peer five in a row
#[derive(Parser)]
#[command(name = "omoknet")]
#[command(author = "OmokNet Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Play omok against another player, peer to peer", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the rendezvous server that pairs players
    Server {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Find an opponent and play
    Play {
        /// Display name (lowercase letters only)
        name: Option<String>,

        /// Rendezvous server host
        #[arg(short, long)]
        server: Option<String>,

        /// Rendezvous server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Local port for the peer connection (0 = any)
        #[arg(long)]
        peer_port: Option<u16>,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol and default settings
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging; stdout belongs to the board
    let filter = if cli.verbose || config.general.verbose {
        EnvFilter::new("debug")
    } else if matches!(cli.command, Commands::Server { .. }) {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Server { port } => {
            run_server(config, port).await?;
        }
        Commands::Play {
            name,
            server,
            port,
            peer_port,
        } => {
            run_play(config, name, server, port, peer_port).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_info(&config);
        }
    }

    Ok(())
}

/// Run the rendezvous server
async fn run_server(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let mut server_config = ServerConfig::from_config(&config);
    if let Some(port) = port {
        server_config.port = port;
    }

    let mut server = RendezvousServer::new(server_config);
    let mut event_rx = server
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("server event receiver already taken"))?;

    let bind_addr = server.start().await?;

    println!("\n========================================");
    println!("  OmokNet Rendezvous Server");
    println!("========================================");
    println!("  Listening: {}", bind_addr);
    println!("========================================");
    println!("\nWaiting for players...");
    println!("Press Ctrl+C to stop.\n");

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    ServerEvent::Registered { name, addr } => {
                        println!("+ {} waiting ({})", name, addr);
                    }
                    ServerEvent::Paired { first, second } => {
                        println!("* Paired {} (first) with {} (second)", first, second);
                    }
                    ServerEvent::Rejected { addr, reason } => {
                        println!("! Rejected {}: {}", addr, reason);
                    }
                    ServerEvent::Left { name } => {
                        println!("- {} left", name);
                    }
                    ServerEvent::AnnounceFailed { name, reason } => {
                        tracing::warn!("Match announcement to {} failed: {}", name, reason);
                    }
                    ServerEvent::Error { message } => {
                        tracing::error!("Server error: {}", message);
                    }
                    ServerEvent::Started { .. } | ServerEvent::Stopped => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    server.stop().await?;
    tracing::info!("Server stopped");

    Ok(())
}

/// Find an opponent and play one match
async fn run_play(
    config: Config,
    name: Option<String>,
    server: Option<String>,
    port: Option<u16>,
    peer_port: Option<u16>,
) -> anyhow::Result<()> {
    let name = match name.or_else(|| config.general.name.clone()) {
        Some(name) => name,
        None => anyhow::bail!("Please give a display name: omoknet play <name>"),
    };
    // Fail before touching the network
    let name = DisplayName::parse(&name)?;

    let bind_addr = format!(
        "{}:{}",
        config.network.bind_address,
        peer_port.unwrap_or(config.network.peer_port)
    );
    let mut link = UdpLink::bind(&bind_addr).await?;
    let listen_port = link.local_addr()?.port();

    let host = server.unwrap_or_else(|| config.rendezvous.host.clone());
    let server_addr = resolve_host(&host, port.unwrap_or(config.rendezvous.port)).await?;

    let client = RendezvousClient::new(server_addr)
        .with_connect_timeout(Duration::from_millis(config.rendezvous.connect_timeout_ms));

    println!("Waiting for an opponent via {}...", server_addr);
    let assignment = client.register(name.as_str(), listen_port).await?;

    link.connect(assignment.opponent_addr).await?;

    let (session, mut events) = PeerSession::new(
        Connection::new(link),
        assignment.turn_order,
        assignment.opponent_name.clone(),
        SessionConfig::from(&config.game),
    );

    println!("\n========================================");
    println!("  {} vs {}", name, assignment.opponent_name);
    println!("========================================");
    if let Some(peer) = session.connection().peer_addr() {
        println!("  Peer: {}", peer);
    }
    println!("  You play {}", assignment.turn_order);
    println!("  Move:   <x> <y>   (row, column)");
    println!("  Resign: \\resign   Leave: \\exit");
    println!("  Anything else is sent as chat");
    println!("========================================\n");
    println!("{}", session.board().await);

    session.spawn_receiver();
    session.start().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => match session.handle_input(&line).await {
                        Ok(Flow::Stop) => break,
                        Ok(Flow::Continue) => {}
                        Err(e) => println!("error: {}", e),
                    },
                    Ok(None) => {
                        let _ = session.execute(LocalCommand::Exit).await;
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading input: {}", e);
                        let _ = session.execute(LocalCommand::Exit).await;
                        break;
                    }
                }
            }
            Some(event) = events.recv() => {
                show_event(&session, event);
            }
            _ = session.closed() => {
                while let Ok(event) = events.try_recv() {
                    show_event(&session, event);
                }
                break;
            }
        }
    }

    let stats = session.connection().stats();
    tracing::debug!(
        "Peer traffic: {} sent, {} received, {} dropped",
        stats.messages_sent(),
        stats.messages_received(),
        stats.messages_dropped()
    );

    println!("Match over: {}", session.status().await);
    Ok(())
}

fn show_event(session: &PeerSession, event: SessionEvent) {
    match event {
        SessionEvent::MoveApplied { side, mv, board } => {
            println!("{}", board);
            match side {
                Side::Local => println!("You played {}", mv),
                Side::Opponent => println!("{} played {}", session.opponent(), mv),
            }
        }
        SessionEvent::TurnStarted { side, timeout, .. } => match side {
            Side::Local => println!("Your turn ({}s)", timeout.as_secs()),
            Side::Opponent => println!("Waiting for {}...", session.opponent()),
        },
        SessionEvent::Chat { text } => {
            println!("{}> {}", session.opponent(), text);
        }
        SessionEvent::Finished { status, reason } => {
            println!("*** {} ({}) ***", status, reason);
            if !session.is_closed() {
                println!("Type \\exit to leave.");
            }
        }
    }
}

/// Print protocol and default settings
fn print_info(config: &Config) {
    println!("OmokNet Information");
    println!("===================\n");

    println!("Rendezvous: {}:{}", config.rendezvous.host, config.rendezvous.port);
    println!("Board: {0}x{0}", config.game.board_size);
    println!("Turn limit: {}s", config.game.turn_timeout_secs);

    println!("\nDefault Port: {}", protocol::DEFAULT_RENDEZVOUS_PORT);
    println!("Max Name Length: {}", protocol::MAX_NAME_LEN);
    println!("Max Datagram: {} bytes", protocol::MAX_DATAGRAM_SIZE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["omoknet", "info"]);
        assert!(cli.is_ok());

        let cli = Cli::try_parse_from(["omoknet", "play", "alice", "-s", "10.0.0.2", "--peer-port", "40000"]).unwrap();
        match cli.command {
            Commands::Play { name, server, peer_port, .. } => {
                assert_eq!(name.as_deref(), Some("alice"));
                assert_eq!(server.as_deref(), Some("10.0.0.2"));
                assert_eq!(peer_port, Some(40000));
            }
            _ => panic!("expected play"),
        }
    }
}
