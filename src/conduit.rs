//! The datagram conduit a session talks through.
//!
//! A [`Conduit`] bundles the two edges of a session: the unreliable network
//! (framed datagrams to the peer) and the local application (a byte stream
//! to read from and one to write to).  The protocol core never blocks on
//! either; [`Conduit::read_app_input`] reports "nothing yet" instead of
//! waiting.
//!
//! Releasing a conduit is `Drop`: a destroyed session drops its conduit.

use thiserror::Error;

/// Outcome of a non-blocking application read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppInput {
    /// Up to the requested number of bytes; never empty.
    Data(Vec<u8>),
    /// Nothing buffered right now; the caller will be re-invoked later.
    NoDataYet,
    /// The application closed its side; no more data will ever arrive.
    EndOfStream,
}

/// Errors raised by conduit implementations.
#[derive(Debug, Error)]
pub enum ConduitError {
    #[error("conduit I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("application output already closed")]
    OutputClosed,
}

/// Network and application I/O for one session.
pub trait Conduit {
    /// What [`Conduit::open`] needs to establish a new conduit.
    type Endpoint;

    /// Establish a conduit towards `endpoint`.
    fn open(endpoint: Self::Endpoint) -> Result<Self, ConduitError>
    where
        Self: Sized;

    /// Hand one complete segment to the network.
    ///
    /// Delivery is not guaranteed; an `Err` is equivalent to a lost datagram.
    fn send_framed(&mut self, bytes: &[u8]) -> Result<(), ConduitError>;

    /// Fetch up to `max` bytes of application data without blocking.
    fn read_app_input(&mut self, max: usize) -> AppInput;

    /// Deliver in-order bytes to the application.  An empty slice marks the
    /// end of the peer's stream.
    fn write_app_output(&mut self, bytes: &[u8]) -> Result<(), ConduitError>;
}

/// How a new session obtains its conduit.
pub enum Attach<C: Conduit> {
    /// Use a conduit that is already established.
    Conduit(C),
    /// Open a fresh conduit towards this endpoint.
    Endpoint(C::Endpoint),
}

impl<C: Conduit> Attach<C> {
    /// Resolve to a live conduit, opening one if necessary.
    pub fn establish(self) -> Result<C, ConduitError> {
        match self {
            Attach::Conduit(c) => Ok(c),
            Attach::Endpoint(e) => C::open(e),
        }
    }
}
