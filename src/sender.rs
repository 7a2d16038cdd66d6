//! Send side: window-bounded transmission of new application data.
//!
//! # Window contract
//!
//! - At most `window` segments may be unacknowledged at once.
//! - Each segment carries up to [`MAX_PAYLOAD`] bytes and consumes exactly
//!   one sequence number.
//! - Every transmitted segment is kept, encoded, in the send buffer until a
//!   cumulative ack covers it; [`crate::timer`] resends it from there.
//! - End of application input is signalled by one zero-length terminal
//!   segment, after which nothing new is ever sent.

use std::time::Instant;

use crate::conduit::{AppInput, Conduit};
use crate::packet::{DataSegment, MAX_PAYLOAD};
use crate::session::Session;

impl<C: Conduit> Session<C> {
    /// Number of segments sent but not yet acknowledged.
    ///
    /// Before the first ack `snd_una` is 0 while sequence numbers start at
    /// 1, so the left window edge is never taken below 1.
    pub fn in_flight(&self) -> u32 {
        self.snd_nxt.saturating_sub(self.snd_una.max(1))
    }

    /// `true` when one more segment fits in the window.
    pub fn can_send(&self) -> bool {
        !self.send_done && self.in_flight() < self.window
    }

    /// Transmit as much new application data as the window allows.
    ///
    /// Call after creation, after an ack opens the window, and whenever the
    /// application has produced more input.  Returns the number of new
    /// segments sent.
    pub fn trigger_send(&mut self, now: Instant) -> usize {
        let mut sent = 0;
        while self.can_send() {
            match self.conduit.read_app_input(MAX_PAYLOAD) {
                AppInput::NoDataYet => break,
                AppInput::EndOfStream => {
                    self.send_done = true;
                    let seg = DataSegment::terminal(self.snd_nxt);
                    log::debug!("[rel] → EOF seq={}", seg.seqno);
                    self.transmit_new(seg, now);
                    sent += 1;
                    break;
                }
                AppInput::Data(bytes) if bytes.is_empty() => break,
                AppInput::Data(bytes) => {
                    debug_assert!(bytes.len() <= MAX_PAYLOAD);
                    let seg = DataSegment::new(self.snd_nxt, bytes);
                    log::debug!(
                        "[rel] → DATA seq={} len={} in_flight={}",
                        seg.seqno,
                        seg.payload.len(),
                        self.in_flight() + 1
                    );
                    self.transmit_new(seg, now);
                    sent += 1;
                }
            }
        }
        sent
    }

    /// Buffer, send, and consume a sequence number for a brand-new segment.
    fn transmit_new(&mut self, seg: DataSegment, now: Instant) {
        let bytes = seg.encode();
        if let Err(e) = self.conduit.send_framed(&bytes) {
            // Buffered anyway; the sweep will resend it.
            log::warn!("[rel] send of seq={} failed: {e}", seg.seqno);
        }
        self.send_buffer.insert(seg.seqno, bytes, now);
        self.snd_nxt += 1;
    }
}
