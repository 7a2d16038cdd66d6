//! Wire-format definitions for protocol segments.
//!
//! Two segment kinds travel between peers:
//! - [`DataSegment`] — carries up to [`MAX_PAYLOAD`] bytes of application
//!   data (or nothing, for the terminal marker).
//! - an acknowledgment — a bare cumulative `ackno`.
//!
//! [`Segment`] is the decoded form of either.  No I/O happens here; this
//! module only turns segments into bytes and back, verifying the length
//! field and checksum on the way in.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            Checksum           |             Length            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Acknowledgment Number                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 Sequence Number (data only)                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 Payload ... (data only, ≤ 500)                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! An ack is exactly [`ACK_LEN`] = 8 bytes.  A data segment is
//! [`DATA_HEADER_LEN`] = 12 bytes of header plus its payload.

use thiserror::Error;

/// Byte length of an acknowledgment segment.
pub const ACK_LEN: usize = 8;

/// Byte length of a data segment's header.
pub const DATA_HEADER_LEN: usize = 12;

/// Largest payload a single data segment may carry.
pub const MAX_PAYLOAD: usize = 500;

/// Largest valid segment on the wire.
pub const MAX_SEGMENT_LEN: usize = DATA_HEADER_LEN + MAX_PAYLOAD;

// Byte offsets of each field within a serialised segment.
const OFF_CHECKSUM: usize = 0;
const OFF_LEN: usize = 2;
const OFF_ACK: usize = 4;
const OFF_SEQ: usize = 8;

/// A data segment: one slice of the application byte stream.
///
/// An empty payload is the terminal marker: the sender has no more data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSegment {
    /// 1-based, monotonically increasing, never reused.
    pub seqno: u32,
    pub payload: Vec<u8>,
}

impl DataSegment {
    /// Build a segment carrying `payload`.
    ///
    /// The caller is responsible for keeping `payload` within
    /// [`MAX_PAYLOAD`]; [`DataSegment::encode`] debug-asserts it.
    pub fn new(seqno: u32, payload: Vec<u8>) -> Self {
        Self { seqno, payload }
    }

    /// Build the zero-length end-of-stream marker.
    pub fn terminal(seqno: u32) -> Self {
        Self {
            seqno,
            payload: Vec::new(),
        }
    }

    /// `true` for the end-of-stream marker.
    pub fn is_terminal(&self) -> bool {
        self.payload.is_empty()
    }

    /// Value of the length field: header plus payload.
    pub fn wire_len(&self) -> usize {
        DATA_HEADER_LEN + self.payload.len()
    }

    /// Serialise into a newly allocated, checksummed byte vector.
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(
            self.payload.len() <= MAX_PAYLOAD,
            "payload of {} bytes exceeds the {MAX_PAYLOAD}-byte limit",
            self.payload.len()
        );
        let len = self.wire_len();
        let mut buf = vec![0u8; len];

        buf[OFF_LEN..OFF_LEN + 2].copy_from_slice(&(len as u16).to_be_bytes());
        // ackno is unused in data segments and stays zero.
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seqno.to_be_bytes());
        buf[DATA_HEADER_LEN..].copy_from_slice(&self.payload);

        seal(&mut buf);
        buf
    }
}

/// Build the 8-byte cumulative acknowledgment for `ackno`.
///
/// `ackno` means "every sequence number below this one has arrived".
pub fn encode_ack(ackno: u32) -> Vec<u8> {
    let mut buf = vec![0u8; ACK_LEN];
    buf[OFF_LEN..OFF_LEN + 2].copy_from_slice(&(ACK_LEN as u16).to_be_bytes());
    buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&ackno.to_be_bytes());
    seal(&mut buf);
    buf
}

/// A validated, decoded segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Ack { ackno: u32 },
    Data(DataSegment),
}

impl Segment {
    /// Parse a segment from one received datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is neither [`ACK_LEN`] bytes nor within
    ///   `DATA_HEADER_LEN..=MAX_SEGMENT_LEN`,
    /// - the length field disagrees with `buf.len()`, or
    /// - the checksum does not verify.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        let n = buf.len();
        if n != ACK_LEN && !(DATA_HEADER_LEN..=MAX_SEGMENT_LEN).contains(&n) {
            return Err(PacketError::BadSize(n));
        }

        let declared = usize::from(read_u16(buf, OFF_LEN));
        if declared != n {
            return Err(PacketError::LengthMismatch {
                declared,
                actual: n,
            });
        }

        let stored = read_u16(buf, OFF_CHECKSUM);
        if checksum_with_field_zeroed(buf) != stored {
            return Err(PacketError::ChecksumFailed);
        }

        let ackno = read_u32(buf, OFF_ACK);
        if n == ACK_LEN {
            return Ok(Segment::Ack { ackno });
        }

        Ok(Segment::Data(DataSegment {
            seqno: read_u32(buf, OFF_SEQ),
            payload: buf[DATA_HEADER_LEN..].to_vec(),
        }))
    }
}

/// Reasons a datagram is rejected by [`Segment::decode`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram of {0} bytes is neither an ack nor a data segment")]
    BadSize(usize),
    #[error("length field says {declared} bytes but {actual} arrived")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum verification failed")]
    ChecksumFailed,
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Compute and write the checksum of a fully populated segment.
fn seal(buf: &mut [u8]) {
    buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&[0, 0]);
    let csum = internet_checksum(buf);
    buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());
}

/// Checksum of `buf` as if its checksum field were zero.
fn checksum_with_field_zeroed(buf: &[u8]) -> u16 {
    let mut sum = fold_words(&buf[..OFF_CHECKSUM]);
    sum += fold_words(&buf[OFF_CHECKSUM + 2..]);
    finish(sum)
}

/// Compute the Internet checksum (RFC 1071) over `data`.
///
/// Sum consecutive 16-bit big-endian words, fold the carry, return the
/// one's-complement.  The caller must zero any checksum field within `data`
/// before calling this function.
pub fn internet_checksum(data: &[u8]) -> u16 {
    finish(fold_words(data))
}

// The checksum field sits at an even offset, so summing the halves on either
// side of it separately keeps every word aligned.
fn fold_words(data: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    // Odd trailing byte: pad with a zero byte on the right.
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    sum
}

fn finish(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
