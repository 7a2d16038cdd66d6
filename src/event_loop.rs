//! Single-threaded event loop driving one UDP session.
//!
//! # Architecture
//!
//! ```text
//!   application input (AsyncRead) ──▶ feed_input ─┐
//!                                                 │ trigger_send
//!   UdpSocket::recv_from ──────────▶ on_packet ───┼──────────────▶ Registry
//!                                                 │
//!   sweep ticker ──────────────────▶ run_periodic_sweep ──────────┘
//! ```
//!
//! All three sources are multiplexed with `tokio::select!` on the calling
//! task, so the protocol core only ever runs on one thread at a time.
//!
//! The loop ends when the session is destroyed, or once both streams have
//! ended with nothing left to retransmit for two timeouts (see
//! [`Session::is_quiet`]): the duplicate datagram that would trigger
//! teardown only arrives if the peer retransmits.

use std::io;
use std::time::Instant;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::conduit::ConduitError;
use crate::config::Config;
use crate::packet::MAX_SEGMENT_LEN;
use crate::receiver::Disposition;
use crate::registry::{Registry, RegistryError, SessionId};
use crate::session::Session;
use crate::socket::UdpConduit;
use crate::timer::sweep_ticker;

/// Bytes requested from the application per read.
const INPUT_CHUNK: usize = 4096;

/// Stop reading application input while this much is already queued.
const INPUT_HIGH_WATER: usize = 64 * 1024;

/// How [`run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A datagram arrived after both streams finished; the session is gone.
    Destroyed,
    /// Both streams ended and the session stayed quiet for the linger
    /// period.  It is still registered.
    Lingered,
}

#[derive(Debug, Error)]
pub enum EventLoopError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Conduit(#[from] ConduitError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

fn session(registry: &Registry<UdpConduit>, id: SessionId) -> Result<&Session<UdpConduit>, RegistryError> {
    registry.get(id).ok_or(RegistryError::UnknownSession(id))
}

fn session_mut(
    registry: &mut Registry<UdpConduit>,
    id: SessionId,
) -> Result<&mut Session<UdpConduit>, RegistryError> {
    registry.get_mut(id).ok_or(RegistryError::UnknownSession(id))
}

/// Pump `input` to the peer and the peer's stream to the session's output
/// until the session ends.
pub async fn run<R>(
    registry: &mut Registry<UdpConduit>,
    id: SessionId,
    mut input: R,
    config: &Config,
) -> Result<Outcome, EventLoopError>
where
    R: AsyncRead + Unpin,
{
    let (socket, peer) = {
        let conduit = session(registry, id)?.conduit();
        (conduit.try_clone_socket()?, conduit.peer())
    };
    log::info!("[loop] session {id} talking to {peer}");

    let mut ticker = sweep_ticker(config);
    let linger = config.timeout * 2;
    let mut quiet_since: Option<Instant> = None;
    let mut datagram = [0u8; MAX_SEGMENT_LEN + 1];
    let mut chunk = vec![0u8; INPUT_CHUNK];
    let mut input_open = true;

    registry.trigger_send(id, Instant::now())?;

    loop {
        let wants_input =
            input_open && session(registry, id)?.conduit().pending_input() < INPUT_HIGH_WATER;

        tokio::select! {
            // ── Branch 1: datagram from the network ──────────────────────
            received = socket.recv_from(&mut datagram) => {
                let (n, from) = received?;
                if from != peer {
                    log::trace!("[loop] ignoring {n} bytes from stranger {from}");
                    continue;
                }
                let disposition = registry.on_packet(id, &datagram[..n], Instant::now())?;
                if disposition == Disposition::Destroyed {
                    log::info!("[loop] session {id} torn down");
                    return Ok(Outcome::Destroyed);
                }
            }

            // ── Branch 2: application input ──────────────────────────────
            read = input.read(&mut chunk), if wants_input => {
                let n = read?;
                let conduit = session_mut(registry, id)?.conduit_mut();
                if n == 0 {
                    log::debug!("[loop] application input closed");
                    conduit.close_input();
                    input_open = false;
                } else {
                    conduit.feed_input(&chunk[..n]);
                }
                registry.trigger_send(id, Instant::now())?;
            }

            // ── Branch 3: retransmission sweep ───────────────────────────
            _ = ticker.tick() => {
                registry.run_periodic_sweep(Instant::now());
            }
        }

        let now = Instant::now();
        let s = session(registry, id)?;
        if s.is_quiet() {
            let since = *quiet_since.get_or_insert(now);
            if now.duration_since(since) >= linger {
                log::info!(
                    "[loop] session {id} quiet in phase {}; no teardown datagram after {linger:?}",
                    s.phase()
                );
                return Ok(Outcome::Lingered);
            }
        } else {
            quiet_since = None;
        }
    }
}
