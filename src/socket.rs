//! UDP-backed [`Conduit`].
//!
//! [`UdpConduit`] sends segments as single datagrams through a non-blocking
//! [`UdpSocket`] and bridges the application side through two plain
//! buffers:
//! - input is queued by the event loop ([`UdpConduit::feed_input`]) and
//!   drained by the sender without blocking;
//! - output is written straight to a boxed [`Write`] (stdout by default).
//!
//! Receiving is the event loop's job: it registers a clone of the socket
//! with tokio (see [`UdpConduit::try_clone_socket`]).  Sends go through the
//! plain socket so they never wait on reactor readiness.

use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use crate::conduit::{AppInput, Conduit, ConduitError};

/// One peer reached through a UDP socket.
pub struct UdpConduit {
    socket: UdpSocket,
    peer: SocketAddr,
    input: VecDeque<u8>,
    input_closed: bool,
    output: Box<dyn Write + Send>,
    output_closed: bool,
}

impl fmt::Debug for UdpConduit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpConduit")
            .field("peer", &self.peer)
            .field("pending_input", &self.input.len())
            .field("input_closed", &self.input_closed)
            .field("output_closed", &self.output_closed)
            .finish_non_exhaustive()
    }
}

impl UdpConduit {
    /// Attach to an already bound socket (server side).
    pub fn with_socket(socket: UdpSocket, peer: SocketAddr) -> Result<Self, ConduitError> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            peer,
            input: VecDeque::new(),
            input_closed: false,
            output: Box::new(std::io::stdout()),
            output_closed: false,
        })
    }

    /// Replace the application output sink.
    pub fn with_output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ConduitError> {
        Ok(self.socket.local_addr()?)
    }

    /// A second handle to the same socket, ready to register with tokio for
    /// receiving.
    pub fn try_clone_socket(&self) -> Result<tokio::net::UdpSocket, ConduitError> {
        let clone = self.socket.try_clone()?;
        clone.set_nonblocking(true)?;
        Ok(tokio::net::UdpSocket::from_std(clone)?)
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queue application bytes for the sender.
    pub fn feed_input(&mut self, bytes: &[u8]) {
        debug_assert!(!self.input_closed, "input fed after close");
        self.input.extend(bytes);
    }

    /// The application will produce no more input.
    pub fn close_input(&mut self) {
        self.input_closed = true;
    }

    /// Bytes queued but not yet taken by the sender.
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// `true` once the peer's end of stream has been written out.
    pub fn output_closed(&self) -> bool {
        self.output_closed
    }
}

impl Conduit for UdpConduit {
    type Endpoint = SocketAddr;

    /// Bind an ephemeral local socket for talking to `peer`.
    fn open(peer: SocketAddr) -> Result<Self, ConduitError> {
        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        log::debug!("[udp] bound {} for peer {peer}", socket.local_addr()?);
        Self::with_socket(socket, peer)
    }

    fn send_framed(&mut self, bytes: &[u8]) -> Result<(), ConduitError> {
        // WouldBlock (full socket buffer) surfaces as an error: a lost datagram.
        self.socket.send_to(bytes, self.peer)?;
        Ok(())
    }

    fn read_app_input(&mut self, max: usize) -> AppInput {
        if !self.input.is_empty() {
            let n = max.min(self.input.len());
            return AppInput::Data(self.input.drain(..n).collect());
        }
        if self.input_closed {
            AppInput::EndOfStream
        } else {
            AppInput::NoDataYet
        }
    }

    fn write_app_output(&mut self, bytes: &[u8]) -> Result<(), ConduitError> {
        if self.output_closed {
            return Err(ConduitError::OutputClosed);
        }
        if bytes.is_empty() {
            self.output_closed = true;
            log::info!("[udp] peer {} finished its stream", self.peer);
        } else {
            self.output.write_all(bytes)?;
        }
        self.output.flush()?;
        Ok(())
    }
}
