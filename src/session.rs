//! Per-session protocol state.
//!
//! A [`Session`] owns everything one endpoint of a stream needs: both
//! sequence spaces, the unacknowledged-segment buffer, the reorder buffer,
//! and its [`Conduit`].  Behaviour is split by direction:
//! - [`crate::sender`] — window-bounded transmission (`trigger_send`).
//! - [`crate::receiver`] — inbound segments, cumulative acks, delivery.
//! - [`crate::timer`] — timeout-driven retransmission.
//!
//! Sessions are created and destroyed by [`crate::registry::Registry`].
//!
//! # Sequence-number layout
//!
//! ```text
//!  snd_una            snd_nxt
//!     │                  │
//!  ───┼──────────────────┼──────────────────▶ send seq space
//!     │ <── in flight ──▶│ <── window room ─▶
//! ```
//!
//! Sequence numbers count segments, start at 1 and never wrap.  A session
//! can therefore carry at most `u32::MAX - 1` segments per direction.

use std::time::Duration;

use crate::buffer::OrderedBuffer;
use crate::config::Config;
use crate::conduit::Conduit;
use crate::packet::DataSegment;
use crate::state::Phase;

/// One endpoint of a reliable stream.
#[derive(Debug)]
pub struct Session<C> {
    pub(crate) timeout: Duration,
    pub(crate) window: u32,

    /// Encoded segments sent but not yet acknowledged, stamped with the time
    /// of their most recent transmission.
    pub(crate) send_buffer: OrderedBuffer<Vec<u8>>,
    /// Lowest unacknowledged sequence number (`SND.UNA`).  Zero until the
    /// first ack arrives.
    pub(crate) snd_una: u32,
    /// Sequence number for the next new segment (`SND.NXT`).
    pub(crate) snd_nxt: u32,
    /// The terminal marker has been sent.
    pub(crate) send_done: bool,

    /// Received segments not yet delivered, stamped with arrival time.
    pub(crate) recv_buffer: OrderedBuffer<DataSegment>,
    /// Next in-order sequence number expected (`RCV.NXT`).
    pub(crate) rcv_nxt: u32,
    /// The peer's terminal marker has been delivered.
    pub(crate) recv_done: bool,

    pub(crate) conduit: C,
}

impl<C: Conduit> Session<C> {
    pub(crate) fn new(conduit: C, config: &Config) -> Self {
        Self {
            timeout: config.timeout,
            window: config.window,
            send_buffer: OrderedBuffer::new(),
            snd_una: 0,
            snd_nxt: 1,
            send_done: false,
            recv_buffer: OrderedBuffer::new(),
            rcv_nxt: 1,
            recv_done: false,
            conduit,
        }
    }

    pub fn snd_una(&self) -> u32 {
        self.snd_una
    }

    pub fn snd_nxt(&self) -> u32 {
        self.snd_nxt
    }

    pub fn rcv_nxt(&self) -> u32 {
        self.rcv_nxt
    }

    pub fn send_done(&self) -> bool {
        self.send_done
    }

    pub fn recv_done(&self) -> bool {
        self.recv_done
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn send_buffer(&self) -> &OrderedBuffer<Vec<u8>> {
        &self.send_buffer
    }

    pub fn recv_buffer(&self) -> &OrderedBuffer<DataSegment> {
        &self.recv_buffer
    }

    pub fn conduit(&self) -> &C {
        &self.conduit
    }

    pub fn conduit_mut(&mut self) -> &mut C {
        &mut self.conduit
    }

    /// Both directions are finished and nothing is outstanding; the next
    /// inbound datagram destroys the session.
    pub fn is_finished(&self) -> bool {
        self.send_done && self.recv_done && self.snd_nxt == self.snd_una
    }

    /// Both streams ended and nothing is left to retransmit.
    ///
    /// Weaker than [`Session::is_finished`]: a late, stale ack can pull
    /// `snd_una` below `snd_nxt` after the send buffer has emptied, and then
    /// nothing will ever be sent that could bring the counters back together.
    pub fn is_quiet(&self) -> bool {
        self.send_done && self.recv_done && self.send_buffer.is_empty()
    }

    pub fn phase(&self) -> Phase {
        Phase::of(self.send_done, self.snd_nxt == self.snd_una, self.recv_done)
    }
}
