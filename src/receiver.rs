//! Receive side: inbound segments, cumulative acks, in-order delivery.
//!
//! - Acks move `snd_una`, purge the send buffer below it and may open the
//!   window for more data.
//! - Data segments within `rcv_nxt + window` are buffered; out-of-order ones
//!   wait for the gap to fill.  When the segment at `rcv_nxt` arrives the
//!   contiguous run is coalesced and handed to the application.
//! - Every accepted data segment (including stale duplicates) is answered
//!   with a cumulative ack carrying the current `rcv_nxt`.
//! - Segments beyond the window are dropped without an ack; the peer's
//!   retransmission timer resends them once the window has slid.
//!
//! Datagram validation and session teardown happen one level up, in
//! [`crate::registry::Registry::on_packet`].

use std::time::Instant;

use crate::conduit::Conduit;
use crate::packet::{encode_ack, DataSegment, Segment};
use crate::session::Session;

/// What became of one inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Malformed, corrupt, outside the window, or after end of stream.
    /// No state changed and nothing was sent.
    Dropped,
    /// An ack was applied to the send side.
    AckApplied,
    /// A data segment was processed and a cumulative ack sent.
    DataAcked,
    /// The session had already finished and has now been destroyed.
    Destroyed,
}

impl<C: Conduit> Session<C> {
    /// Apply one validated segment.
    pub fn on_segment(&mut self, segment: Segment, now: Instant) -> Disposition {
        match segment {
            Segment::Ack { ackno } => {
                self.on_ack(ackno, now);
                Disposition::AckApplied
            }
            Segment::Data(seg) => self.on_data(seg, now),
        }
    }

    fn on_ack(&mut self, ackno: u32, now: Instant) {
        // The peer is trusted; ackno is not checked against [snd_una, snd_nxt].
        self.snd_una = ackno;
        let purged = self.send_buffer.remove_below(ackno);
        log::debug!(
            "[rel] ← ACK ack={ackno} purged={purged} in_flight={}",
            self.in_flight()
        );
        self.trigger_send(now);
    }

    fn on_data(&mut self, seg: DataSegment, now: Instant) -> Disposition {
        if self.recv_done {
            log::trace!("[rel] ← DATA seq={} after end of stream; dropped", seg.seqno);
            return Disposition::Dropped;
        }
        if seg.seqno > self.rcv_nxt.saturating_add(self.window) {
            log::trace!(
                "[rel] ← DATA seq={} beyond window (rcv_nxt={}); dropped",
                seg.seqno,
                self.rcv_nxt
            );
            return Disposition::Dropped;
        }

        let seqno = seg.seqno;
        log::debug!("[rel] ← DATA seq={seqno} len={}", seg.payload.len());

        if seqno >= self.rcv_nxt && !self.recv_buffer.contains(seqno) {
            self.recv_buffer.insert(seqno, seg, now);
        }

        if seqno == self.rcv_nxt {
            while self.recv_buffer.contains(self.rcv_nxt) {
                self.rcv_nxt += 1;
            }
            self.deliver();
        }

        self.send_ack();
        Disposition::DataAcked
    }

    /// Hand the contiguous prefix of the receive buffer to the application.
    ///
    /// Stops at the terminal marker, which is left in the buffer.
    pub fn deliver(&mut self) {
        if self.recv_done {
            return;
        }
        while let Some((seqno, entry)) = self.recv_buffer.first() {
            if seqno >= self.rcv_nxt {
                break;
            }
            if let Err(e) = self.conduit.write_app_output(&entry.item.payload) {
                log::warn!("[rel] delivery of seq={seqno} failed: {e}");
            }
            if entry.item.is_terminal() {
                log::debug!("[rel] peer stream ended at seq={seqno}");
                self.recv_done = true;
                return;
            }
            self.recv_buffer.remove_first();
        }
    }

    fn send_ack(&mut self) {
        log::trace!("[rel] → ACK ack={}", self.rcv_nxt);
        if let Err(e) = self.conduit.send_framed(&encode_ack(self.rcv_nxt)) {
            log::warn!("[rel] ack send failed: {e}");
        }
    }
}
