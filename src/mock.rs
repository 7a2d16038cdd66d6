//! Scriptable conduit for unit tests.

use std::collections::VecDeque;

use crate::conduit::{AppInput, Conduit, ConduitError};
use crate::packet::Segment;

#[derive(Debug, Default)]
pub(crate) struct MockConduit {
    pub input: VecDeque<u8>,
    pub input_closed: bool,
    /// Every datagram handed to the network, in order.
    pub sent: Vec<Vec<u8>>,
    /// Every application write, in order (empty = end of stream).
    pub output: Vec<Vec<u8>>,
    pub fail_sends: bool,
}

impl MockConduit {
    pub fn with_input(bytes: &[u8]) -> Self {
        Self {
            input: bytes.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn closed_after(bytes: &[u8]) -> Self {
        Self {
            input_closed: true,
            ..Self::with_input(bytes)
        }
    }

    /// Decode and clear everything sent so far.
    pub fn take_sent(&mut self) -> Vec<Segment> {
        self.sent
            .drain(..)
            .map(|b| Segment::decode(&b).expect("session sent a malformed segment"))
            .collect()
    }

    /// Concatenated application output.
    pub fn delivered(&self) -> Vec<u8> {
        self.output.concat()
    }
}

impl Conduit for MockConduit {
    type Endpoint = bool;

    /// `true` opens successfully, `false` fails.
    fn open(ok: bool) -> Result<Self, ConduitError> {
        if ok {
            Ok(Self::default())
        } else {
            Err(ConduitError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock refused",
            )))
        }
    }

    fn send_framed(&mut self, bytes: &[u8]) -> Result<(), ConduitError> {
        if self.fail_sends {
            return Err(ConduitError::Io(std::io::Error::other("mock send failure")));
        }
        self.sent.push(bytes.to_vec());
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
        self.output.push(bytes.to_vec());
        Ok(())
    }
}
