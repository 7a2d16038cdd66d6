//! `reliable-udp` binary: pipes stdin to one UDP peer and the peer's stream
//! to stdout over a single reliable session.
//!
//! `connect <PEER>` opens an ephemeral socket towards `PEER`; `listen` binds
//! and serves whoever sends the first datagram.  The process exits once the
//! session is torn down or has gone quiet for two timeouts.

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use reliable_udp::event_loop::{self, Outcome};
use reliable_udp::packet::MAX_SEGMENT_LEN;
use reliable_udp::socket::UdpConduit;
use reliable_udp::{Attach, Config, Registry};

/// Reliable byte stream over UDP: stdin to the peer, the peer to stdout.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    session: SessionArgs,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Args)]
struct SessionArgs {
    /// Maximum unacknowledged segments in flight.
    #[arg(short, long, global = true, default_value_t = 1)]
    window: u32,

    /// Retransmission timeout in milliseconds.
    #[arg(short, long = "timeout-ms", global = true, default_value_t = 2000)]
    timeout_ms: u64,

    /// Retransmission sweep cadence in milliseconds (default: timeout / 5).
    #[arg(long = "tick-ms", global = true)]
    tick_ms: Option<u64>,
}

impl SessionArgs {
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::new(self.window, Duration::from_millis(self.timeout_ms));
        if let Some(tick) = self.tick_ms {
            config = config.with_tick(Duration::from_millis(tick));
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Mode {
    /// Wait for a peer to send the first datagram, then talk to it.
    Listen {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
    },
    /// Open a session to a listening peer.
    Connect {
        /// Remote address (e.g. 127.0.0.1:9000).
        peer: SocketAddr,
    },
}

/// Block until the first datagram arrives on `socket` and return its source.
///
/// The datagram is only peeked; the event loop reads it as usual.
async fn first_peer(socket: &UdpSocket) -> anyhow::Result<SocketAddr> {
    let clone = socket.try_clone()?;
    clone.set_nonblocking(true)?;
    let clone = tokio::net::UdpSocket::from_std(clone)?;
    let mut probe = [0u8; MAX_SEGMENT_LEN + 1];
    let (_, peer) = clone.peek_from(&mut probe).await?;
    Ok(peer)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr so stdout carries only the peer's stream.
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.session.config()?;

    let conduit = match cli.mode {
        Mode::Listen { bind } => {
            let socket = UdpSocket::bind(bind).with_context(|| format!("binding {bind}"))?;
            log::info!("Listening on {}", socket.local_addr()?);
            let peer = first_peer(&socket).await?;
            log::info!("First datagram from {peer}");
            Attach::Conduit(UdpConduit::with_socket(socket, peer)?)
        }
        Mode::Connect { peer } => {
            log::info!("Connecting to {peer}");
            Attach::Endpoint(peer)
        }
    };

    let mut registry = Registry::new();
    let id = registry.create(conduit, &config).context("creating session")?;

    let outcome = event_loop::run(&mut registry, id, tokio::io::stdin(), &config).await?;
    match outcome {
        Outcome::Destroyed => log::info!("Session closed"),
        Outcome::Lingered => log::info!("Session finished; peer went quiet"),
    }

    let leftover = registry.shutdown();
    if leftover > 0 {
        log::debug!("{leftover} session(s) released at shutdown");
    }
    Ok(())
}
