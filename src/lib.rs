//! `reliable-udp` — a reliable, in-order, bidirectional byte stream over an
//! unreliable datagram service.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   data segments   ┌──────────┐
//!  │  Sender  │──────────────────▶│ Receiver │
//!  └────┬─────┘                   └─────┬────┘
//!       │         cumulative acks       │
//!       │◀──────────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │             Session               │
//!  │  (sequence state, buffers, timer) │
//!  └────┬──────────────────────────────┘
//!       │ owned by
//!  ┌────▼──────────────────────────────┐
//!  │             Registry              │◀── periodic sweep
//!  └────┬──────────────────────────────┘
//!       │ framed datagrams + app bytes
//!  ┌────▼──────┐
//!  │  Conduit  │  (UDP socket, or the in-memory simulator)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]     — wire format, checksum, validation
//! - [`buffer`]     — sequence-ordered buffers with timestamps
//! - [`conduit`]    — network/application I/O boundary
//! - [`config`]     — window and timeout parameters
//! - [`session`]    — per-session state
//! - [`sender`]     — window-bounded transmission
//! - [`receiver`]   — inbound segments, acks, in-order delivery
//! - [`timer`]      — timeout-driven retransmission
//! - [`state`]      — lifecycle phase summary
//! - [`registry`]   — session creation, lookup, teardown, sweep
//! - [`socket`]     — UDP conduit
//! - [`event_loop`] — tokio loop driving one UDP session
//! - [`simulator`]  — seeded lossy network for tests

pub mod buffer;
pub mod conduit;
pub mod config;
pub mod event_loop;
pub mod packet;
pub mod receiver;
pub mod registry;
pub mod sender;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

#[cfg(test)]
mod mock;

pub use conduit::{AppInput, Attach, Conduit, ConduitError};
pub use config::{Config, ConfigError};
pub use receiver::Disposition;
pub use registry::{CreateError, Registry, RegistryError, SessionId};
pub use session::Session;
