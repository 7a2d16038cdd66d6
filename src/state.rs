//! Session phase summary.
//!
//! A session has no explicit state machine: its behaviour follows from the
//! two `*_done` flags and whether anything is still unacknowledged.  [`Phase`]
//! names the combinations so logs and the event loop can talk about them.
//!
//! ```text
//!            local EOF sent                  last ack
//!   OPEN ───────────────────▶ DRAINING ──────────────────▶ SEND_CLOSED
//!     │                          │                              │
//!     │ peer EOF delivered       │ peer EOF delivered           │ peer EOF delivered
//!     ▼                          ▼                              ▼
//!  RECV_CLOSED ──local EOF──▶ DRAINING ──────last ack───────▶ FINISHED
//! ```

/// Coarse lifecycle position of a [`crate::session::Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Both directions still carry data.
    #[default]
    Open,
    /// Local input ended; the terminal marker or earlier data is unacked.
    Draining,
    /// Everything local has been acknowledged; the peer is still sending.
    SendClosed,
    /// The peer's stream has ended; local data is still flowing.
    RecvClosed,
    /// Both streams ended and nothing is outstanding.  The next inbound
    /// datagram tears the session down.
    Finished,
}

impl Phase {
    pub(crate) fn of(send_done: bool, all_acked: bool, recv_done: bool) -> Self {
        match (send_done, all_acked, recv_done) {
            (true, true, true) => Phase::Finished,
            (true, true, false) => Phase::SendClosed,
            (true, false, _) => Phase::Draining,
            (false, _, true) => Phase::RecvClosed,
            (false, _, false) => Phase::Open,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Open => "open",
            Phase::Draining => "draining",
            Phase::SendClosed => "send-closed",
            Phase::RecvClosed => "recv-closed",
            Phase::Finished => "finished",
        };
        f.write_str(name)
    }
}
