//! In-memory network simulator for deterministic testing.
//!
//! Real networks drop, reorder, duplicate and corrupt datagrams.  To
//! exercise the reliability mechanisms without depending on actual network
//! conditions, this module provides a [`Simulator`]: a shared wire between
//! two [`Side`]s plus a [`SimConduit`] for each, with a seeded fault model:
//!
//! | Fault       | Description                                               |
//! |-------------|-----------------------------------------------------------|
//! | Loss        | Drop a datagram with probability `loss_rate`.             |
//! | Duplication | Queue a second copy with probability `duplicate_rate`.    |
//! | Corruption  | Flip one random bit of a copy with `corrupt_rate`.        |
//! | Reordering  | [`Simulator::pop_next`] takes a random queued datagram    |
//! |             | instead of the oldest with probability `reorder_rate`.    |
//!
//! Nothing is delivered on its own: the test drives the wire by popping
//! datagrams and handing them to the registry, and controls time by passing
//! explicit instants.  The same seed always yields the same run.
//!
//! Per-side application state (input queue, delivered output, end-of-stream
//! bookkeeping) lives in the shared wire, so it stays observable after a
//! session and its conduit have been destroyed.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::conduit::{AppInput, Conduit, ConduitError};

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability that a datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a delivered copy has one bit flipped.
    pub corrupt_rate: f64,
    /// Probability that [`Simulator::pop_next`] picks out of order.
    pub reorder_rate: f64,
}

impl FaultConfig {
    /// A perfect wire.
    pub fn clean() -> Self {
        Self::default()
    }

    fn assert_valid(&self) {
        for (name, p) in [
            ("loss_rate", self.loss_rate),
            ("duplicate_rate", self.duplicate_rate),
            ("corrupt_rate", self.corrupt_rate),
            ("reorder_rate", self.reorder_rate),
        ] {
            assert!((0.0..=1.0).contains(&p), "{name} out of range: {p}");
        }
    }
}

/// One end of the simulated wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn peer(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => f.write_str("A"),
            Side::B => f.write_str("B"),
        }
    }
}

/// Counters for everything the wire has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub sent: usize,
    pub dropped: usize,
    pub duplicated: usize,
    pub corrupted: usize,
    pub reordered: usize,
    pub delivered: usize,
}

#[derive(Debug, Default)]
struct App {
    input: VecDeque<u8>,
    input_closed: bool,
    output: Vec<u8>,
    eof_writes: usize,
    writes_after_eof: usize,
    conduit_released: bool,
}

#[derive(Debug)]
struct Wire {
    faults: FaultConfig,
    rng: StdRng,
    queue: VecDeque<(Side, Vec<u8>)>,
    apps: [App; 2],
    refuse_open: bool,
    stats: SimStats,
}

impl Wire {
    fn transmit(&mut self, from: Side, bytes: &[u8]) {
        self.stats.sent += 1;
        if self.rng.random_bool(self.faults.loss_rate) {
            self.stats.dropped += 1;
            log::trace!("[sim] {from}→{} dropped {} bytes", from.peer(), bytes.len());
            return;
        }
        let copies = if self.rng.random_bool(self.faults.duplicate_rate) {
            self.stats.duplicated += 1;
            2
        } else {
            1
        };
        for _ in 0..copies {
            let mut copy = bytes.to_vec();
            if !copy.is_empty() && self.rng.random_bool(self.faults.corrupt_rate) {
                let bit = self.rng.random_range(0..copy.len() * 8);
                copy[bit / 8] ^= 1 << (bit % 8);
                self.stats.corrupted += 1;
            }
            self.queue.push_back((from.peer(), copy));
        }
    }
}

/// Handle to a shared simulated wire.  Clones refer to the same wire.
#[derive(Debug, Clone)]
pub struct Simulator {
    wire: Rc<RefCell<Wire>>,
}

impl Simulator {
    /// Create a wire with the given fault model and RNG seed.
    ///
    /// # Panics
    ///
    /// If any fault probability lies outside `[0.0, 1.0]`.
    pub fn new(faults: FaultConfig, seed: u64) -> Self {
        faults.assert_valid();
        Self {
            wire: Rc::new(RefCell::new(Wire {
                faults,
                rng: StdRng::seed_from_u64(seed),
                queue: VecDeque::new(),
                apps: Default::default(),
                refuse_open: false,
                stats: SimStats::default(),
            })),
        }
    }

    /// A conduit for `side`, already established.
    pub fn conduit(&self, side: Side) -> SimConduit {
        SimConduit {
            wire: Rc::clone(&self.wire),
            side,
        }
    }

    /// An endpoint through which [`Conduit::open`] reaches `side`.
    pub fn endpoint(&self, side: Side) -> SimEndpoint {
        SimEndpoint {
            sim: self.clone(),
            side,
        }
    }

    /// Make subsequent [`Conduit::open`] calls fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.wire.borrow_mut().refuse_open = refuse;
    }

    /// Make `bytes` available to `side`'s application input.
    pub fn feed_input(&self, side: Side, bytes: &[u8]) {
        self.wire.borrow_mut().apps[side.index()].input.extend(bytes);
    }

    /// `side`'s application will produce no more input.
    pub fn close_input(&self, side: Side) {
        self.wire.borrow_mut().apps[side.index()].input_closed = true;
    }

    /// Put raw bytes on the wire towards `to`, bypassing the fault model.
    pub fn inject(&self, to: Side, bytes: Vec<u8>) {
        self.wire.borrow_mut().queue.push_back((to, bytes));
    }

    /// Take the next datagram off the wire, with its destination.
    pub fn pop_next(&self) -> Option<(Side, Vec<u8>)> {
        let mut wire = self.wire.borrow_mut();
        let len = wire.queue.len();
        if len == 0 {
            return None;
        }
        let index = if len > 1 {
            let reorder = wire.faults.reorder_rate;
            if wire.rng.random_bool(reorder) {
                wire.rng.random_range(0..len)
            } else {
                0
            }
        } else {
            0
        };
        if index != 0 {
            wire.stats.reordered += 1;
        }
        let next = wire.queue.remove(index);
        if next.is_some() {
            wire.stats.delivered += 1;
        }
        next
    }

    /// Throw away everything currently on the wire.
    pub fn drain_wire(&self) -> usize {
        let mut wire = self.wire.borrow_mut();
        let n = wire.queue.len();
        wire.queue.clear();
        wire.stats.dropped += n;
        n
    }

    /// Datagrams currently on the wire.
    pub fn in_transit(&self) -> usize {
        self.wire.borrow().queue.len()
    }

    /// Everything delivered to `side`'s application so far.
    pub fn output(&self, side: Side) -> Vec<u8> {
        self.wire.borrow().apps[side.index()].output.clone()
    }

    /// How many times `side`'s application has seen end of stream.
    pub fn eof_count(&self, side: Side) -> usize {
        self.wire.borrow().apps[side.index()].eof_writes
    }

    /// Writes `side`'s application received after end of stream.
    pub fn writes_after_eof(&self, side: Side) -> usize {
        self.wire.borrow().apps[side.index()].writes_after_eof
    }

    /// `true` once `side`'s conduit has been dropped.
    pub fn released(&self, side: Side) -> bool {
        self.wire.borrow().apps[side.index()].conduit_released
    }

    pub fn stats(&self) -> SimStats {
        self.wire.borrow().stats
    }
}

/// Where [`SimConduit::open`] connects.
#[derive(Debug, Clone)]
pub struct SimEndpoint {
    sim: Simulator,
    side: Side,
}

/// One side's view of the simulated wire.
#[derive(Debug)]
pub struct SimConduit {
    wire: Rc<RefCell<Wire>>,
    side: Side,
}

impl SimConduit {
    pub fn side(&self) -> Side {
        self.side
    }
}

impl Conduit for SimConduit {
    type Endpoint = SimEndpoint;

    fn open(endpoint: SimEndpoint) -> Result<Self, ConduitError> {
        if endpoint.sim.wire.borrow().refuse_open {
            return Err(ConduitError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "simulator refused connection",
            )));
        }
        Ok(endpoint.sim.conduit(endpoint.side))
    }

    fn send_framed(&mut self, bytes: &[u8]) -> Result<(), ConduitError> {
        self.wire.borrow_mut().transmit(self.side, bytes);
        Ok(())
    }

    fn read_app_input(&mut self, max: usize) -> AppInput {
        let mut wire = self.wire.borrow_mut();
        let app = &mut wire.apps[self.side.index()];
        if !app.input.is_empty() {
            let n = max.min(app.input.len());
            return AppInput::Data(app.input.drain(..n).collect());
        }
        if app.input_closed {
            AppInput::EndOfStream
        } else {
            AppInput::NoDataYet
        }
    }

    fn write_app_output(&mut self, bytes: &[u8]) -> Result<(), ConduitError> {
        let mut wire = self.wire.borrow_mut();
        let app = &mut wire.apps[self.side.index()];
        if app.eof_writes > 0 {
            app.writes_after_eof += 1;
            return Err(ConduitError::OutputClosed);
        }
        if bytes.is_empty() {
            app.eof_writes += 1;
        } else {
            app.output.extend_from_slice(bytes);
        }
        Ok(())
    }
}

impl Drop for SimConduit {
    fn drop(&mut self) {
        self.wire.borrow_mut().apps[self.side.index()].conduit_released = true;
    }
}
