//! End-to-end tests for two sessions talking over the in-memory simulator.
//!
//! Time is virtual: the driver advances a fake clock by one timeout per round
//! and runs the retransmission sweep, so lossy runs finish instantly and the
//! same seed always replays the same schedule.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use reliable_udp::packet::{encode_ack, DataSegment, Segment};
use reliable_udp::simulator::{FaultConfig, SimConduit, Side, Simulator};
use reliable_udp::{Attach, Config, CreateError, Disposition, Registry, RegistryError, SessionId};

const TIMEOUT: Duration = Duration::from_millis(100);

/// Two sessions, one per side of a simulated wire.
struct Pair {
    sim: Simulator,
    reg: Registry<SimConduit>,
    a: SessionId,
    b: SessionId,
    now: Instant,
}

impl Pair {
    fn new(faults: FaultConfig, seed: u64, window: u32) -> Self {
        let sim = Simulator::new(faults, seed);
        let config = Config::new(window, TIMEOUT);
        let mut reg = Registry::new();
        let a = reg
            .create(Attach::Conduit(sim.conduit(Side::A)), &config)
            .expect("create A");
        let b = reg
            .create(Attach::Endpoint(sim.endpoint(Side::B)), &config)
            .expect("create B");
        Self {
            sim,
            reg,
            a,
            b,
            now: Instant::now(),
        }
    }

    fn id(&self, side: Side) -> SessionId {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }

    /// Tell both sessions new input may be available.
    fn kick(&mut self) {
        for id in [self.a, self.b] {
            if self.reg.contains(id) {
                self.reg.trigger_send(id, self.now).unwrap();
            }
        }
    }

    /// Deliver one datagram; `None` when the wire is empty.
    fn step(&mut self) -> Option<Result<Disposition, RegistryError>> {
        let (to, bytes) = self.sim.pop_next()?;
        let id = self.id(to);
        Some(self.reg.on_packet(id, &bytes, self.now))
    }

    /// Deliver everything currently on the wire (and whatever it provokes).
    fn flush(&mut self) {
        while let Some(result) = self.step() {
            // A datagram for a destroyed session has nowhere to go.
            let _ = result;
            self.assert_window_respected();
        }
    }

    /// Alternate flushing and timeout sweeps until `done` holds.
    fn run_until(&mut self, max_rounds: usize, mut done: impl FnMut(&Self) -> bool) {
        for _ in 0..max_rounds {
            self.flush();
            if done(self) {
                return;
            }
            self.now += TIMEOUT;
            self.reg.run_periodic_sweep(self.now);
        }
        panic!(
            "no convergence after {max_rounds} rounds: stats={:?} A={} B={}",
            self.sim.stats(),
            self.sim.output(Side::A).len(),
            self.sim.output(Side::B).len()
        );
    }

    fn assert_window_respected(&self) {
        for id in [self.a, self.b] {
            if let Some(s) = self.reg.get(id) {
                assert!(
                    s.send_buffer().len() <= s.window() as usize,
                    "{id}: {} unacked, window {}",
                    s.send_buffer().len(),
                    s.window()
                );
            }
        }
    }

    fn both_streams_complete(&self, a_to_b: usize, b_to_a: usize) -> bool {
        self.sim.eof_count(Side::A) == 1
            && self.sim.eof_count(Side::B) == 1
            && self.sim.output(Side::B).len() == a_to_b
            && self.sim.output(Side::A).len() == b_to_a
    }
}

fn random_bytes(rng: &mut StdRng, n: usize) -> Vec<u8> {
    (0..n).map(|_| rng.random::<u8>()).collect()
}

// ---------------------------------------------------------------------------
// One segment out, one ack back
// ---------------------------------------------------------------------------

#[test]
fn single_segment_is_delivered_and_acked() {
    let mut p = Pair::new(FaultConfig::clean(), 1, 1);
    p.sim.feed_input(Side::A, b"hello");
    p.kick();
    assert_eq!(p.sim.in_transit(), 1);

    assert_eq!(p.step(), Some(Ok(Disposition::DataAcked)));
    assert_eq!(p.sim.output(Side::B), b"hello");
    assert_eq!(p.reg.get(p.b).unwrap().rcv_nxt(), 2);

    assert_eq!(p.step(), Some(Ok(Disposition::AckApplied)));
    let a = p.reg.get(p.a).unwrap();
    assert_eq!(a.snd_una(), 2);
    assert_eq!(a.snd_nxt(), 2);
    assert!(a.send_buffer().is_empty());
    assert_eq!(p.sim.in_transit(), 0);
}

// ---------------------------------------------------------------------------
// Both sides finish; the next datagram tears each down once
// ---------------------------------------------------------------------------

#[test]
fn finished_sessions_are_destroyed_exactly_once() {
    let mut p = Pair::new(FaultConfig::clean(), 1, 2);
    p.sim.feed_input(Side::A, b"ping");
    p.sim.close_input(Side::A);
    p.sim.feed_input(Side::B, b"pong");
    p.sim.close_input(Side::B);
    p.kick();
    p.flush();

    for side in [Side::A, Side::B] {
        let s = p.reg.get(p.id(side)).unwrap();
        assert!(s.is_finished(), "{side} not finished: {}", s.phase());
        assert!(!p.sim.released(side));
    }
    assert_eq!(p.sim.output(Side::A), b"pong");
    assert_eq!(p.sim.output(Side::B), b"ping");

    // A final duplicate ack is the teardown trigger.
    let ack = encode_ack(p.reg.get(p.a).unwrap().snd_nxt());
    assert_eq!(p.reg.on_packet(p.a, &ack, p.now), Ok(Disposition::Destroyed));
    assert!(p.sim.released(Side::A));
    assert!(!p.reg.contains(p.a));
    assert!(p.reg.contains(p.b));

    // Further traffic never reaches the destroyed session.
    assert_eq!(
        p.reg.on_packet(p.a, &ack, p.now),
        Err(RegistryError::UnknownSession(p.a))
    );
    assert_eq!(p.reg.run_periodic_sweep(p.now + TIMEOUT * 10), 0);
    assert_eq!(p.sim.eof_count(Side::A), 1);
    assert_eq!(p.sim.writes_after_eof(Side::A), 0);
}

#[test]
fn corrupt_datagram_does_not_trigger_teardown() {
    let mut p = Pair::new(FaultConfig::clean(), 1, 1);
    p.sim.close_input(Side::A);
    p.sim.close_input(Side::B);
    p.kick();
    p.flush();
    assert!(p.reg.get(p.a).unwrap().is_finished());

    let mut ack = encode_ack(2);
    ack[5] ^= 0x10;
    assert_eq!(p.reg.on_packet(p.a, &ack, p.now), Ok(Disposition::Dropped));
    assert!(p.reg.contains(p.a));
}

// ---------------------------------------------------------------------------
// Lost datagrams come back after one timeout
// ---------------------------------------------------------------------------

#[test]
fn lost_segment_is_retransmitted_after_timeout() {
    let mut p = Pair::new(FaultConfig::clean(), 1, 1);
    p.sim.feed_input(Side::A, b"retry me");
    p.kick();
    assert_eq!(p.sim.drain_wire(), 1);

    // Not yet due.
    assert_eq!(p.reg.run_periodic_sweep(p.now + TIMEOUT / 2), 0);
    assert_eq!(p.sim.in_transit(), 0);

    p.now += TIMEOUT;
    assert_eq!(p.reg.run_periodic_sweep(p.now), 1);
    let (to, bytes) = p.sim.pop_next().unwrap();
    assert_eq!(to, Side::B);
    assert_eq!(
        Segment::decode(&bytes),
        Ok(Segment::Data(DataSegment::new(1, b"retry me".to_vec())))
    );

    p.reg.on_packet(p.b, &bytes, p.now).unwrap();
    p.flush();
    assert_eq!(p.sim.output(Side::B), b"retry me");
    assert!(p.reg.get(p.a).unwrap().send_buffer().is_empty());
}

#[test]
fn lost_ack_causes_duplicate_that_is_not_redelivered() {
    let mut p = Pair::new(FaultConfig::clean(), 1, 1);
    p.sim.feed_input(Side::A, b"once");
    p.kick();
    p.step();
    // B's ack goes missing.
    assert_eq!(p.sim.drain_wire(), 1);

    p.now += TIMEOUT;
    p.reg.run_periodic_sweep(p.now);
    p.flush();

    assert_eq!(p.sim.output(Side::B), b"once");
    assert!(p.reg.get(p.a).unwrap().send_buffer().is_empty());
}

// ---------------------------------------------------------------------------
// Ordering under arbitrary arrival order and duplication
// ---------------------------------------------------------------------------

#[test]
fn shuffled_and_duplicated_segments_deliver_in_order() {
    const SEGMENTS: usize = 8;
    let mut rng = StdRng::seed_from_u64(99);
    let payload = random_bytes(&mut rng, 500 * SEGMENTS);

    for round in 0..20 {
        let mut p = Pair::new(FaultConfig::clean(), round, SEGMENTS as u32);
        p.sim.feed_input(Side::A, &payload);
        p.kick();

        let mut datagrams: Vec<Vec<u8>> = std::iter::from_fn(|| p.sim.pop_next())
            .map(|(_, bytes)| bytes)
            .collect();
        assert_eq!(datagrams.len(), SEGMENTS);
        let dups: Vec<Vec<u8>> = datagrams.iter().filter(|_| rng.random_bool(0.3)).cloned().collect();
        datagrams.extend(dups);
        datagrams.shuffle(&mut rng);

        for bytes in &datagrams {
            p.reg.on_packet(p.b, bytes, p.now).unwrap();
        }
        assert_eq!(p.sim.output(Side::B), payload, "round {round}");
        assert_eq!(p.reg.get(p.b).unwrap().rcv_nxt(), SEGMENTS as u32 + 1);
        assert!(p.reg.get(p.b).unwrap().recv_buffer().is_empty());
    }
}

// ---------------------------------------------------------------------------
// Full transfers over a faulty wire
// ---------------------------------------------------------------------------

fn lossy_transfer(seed: u64, window: u32, faults: FaultConfig) {
    let mut rng = StdRng::seed_from_u64(seed);
    let a_data = random_bytes(&mut rng, 7_000);
    let b_data = random_bytes(&mut rng, 3_333);

    let mut p = Pair::new(faults, seed, window);
    p.sim.feed_input(Side::A, &a_data);
    p.sim.close_input(Side::A);
    p.sim.feed_input(Side::B, &b_data);
    p.sim.close_input(Side::B);
    p.kick();

    p.run_until(20_000, |p| p.both_streams_complete(a_data.len(), b_data.len()));

    assert_eq!(p.sim.output(Side::B), a_data, "seed {seed}");
    assert_eq!(p.sim.output(Side::A), b_data, "seed {seed}");
    assert_eq!(p.sim.writes_after_eof(Side::A), 0);
    assert_eq!(p.sim.writes_after_eof(Side::B), 0);
}

#[test]
fn transfer_survives_loss_duplication_corruption_and_reordering() {
    let faults = FaultConfig {
        loss_rate: 0.2,
        duplicate_rate: 0.1,
        corrupt_rate: 0.1,
        reorder_rate: 0.3,
    };
    for seed in 0..8 {
        lossy_transfer(seed, 4, faults.clone());
    }
}

#[test]
fn stop_and_wait_transfer_over_lossy_wire() {
    let faults = FaultConfig {
        loss_rate: 0.3,
        ..FaultConfig::default()
    };
    lossy_transfer(1234, 1, faults);
}

#[test]
fn wide_window_transfer_over_reordering_wire() {
    let faults = FaultConfig {
        reorder_rate: 0.8,
        duplicate_rate: 0.2,
        ..FaultConfig::default()
    };
    lossy_transfer(77, 16, faults);
}

// ---------------------------------------------------------------------------
// Many sessions sharing one sweep
// ---------------------------------------------------------------------------

#[test]
fn sweep_visits_every_session_once() {
    let sim = Simulator::new(FaultConfig::clean(), 5);
    let config = Config::new(2, TIMEOUT);
    let mut reg = Registry::new();
    let t0 = Instant::now();

    sim.feed_input(Side::A, b"abc");
    sim.feed_input(Side::B, b"xyz");
    let ids: Vec<SessionId> = [Side::A, Side::B]
        .into_iter()
        .map(|side| reg.create(Attach::Conduit(sim.conduit(side)), &config).unwrap())
        .collect();
    for &id in &ids {
        reg.trigger_send(id, t0).unwrap();
    }
    sim.drain_wire();

    assert_eq!(reg.run_periodic_sweep(t0 + TIMEOUT), 2);
    assert_eq!(sim.in_transit(), 2);
    assert_eq!(reg.shutdown(), 2);
}

#[test]
fn refused_endpoint_creates_nothing() {
    let sim = Simulator::new(FaultConfig::clean(), 1);
    sim.refuse_connections(true);
    let mut reg: Registry<SimConduit> = Registry::new();
    let err = reg
        .create(Attach::Endpoint(sim.endpoint(Side::A)), &Config::default())
        .unwrap_err();
    assert!(matches!(err, CreateError::Conduit(_)));
    assert!(reg.is_empty());
}
