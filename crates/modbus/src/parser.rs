//! Byte-at-a-time Modbus RTU frame parser with sliding-window resync.
//!
//! Grounded on the donor codebase's general shape of a receive state
//! machine driven off a ring buffer (`console.rs`); the state alphabet and
//! resync algorithm below come directly from the Modbus RTU framing rules
//! this workspace targets. Structural and CRC mismatches never propagate as
//! errors: they discard exactly one byte and the candidate frame start
//! slides forward by one, which the `poll_frame` loop below implements by
//! re-attempting the parse from the ring buffer's current read position
//! after every failed candidate.

use arrayvec::ArrayVec;
use ring_buffer::RingBuffer;

use crate::crc;

/// Maximum Modbus RTU frame length, CRC included.
pub const MAX_FRAME: usize = 256;

pub const FUNC_READ_HOLDING: u8 = 0x03;
pub const FUNC_WRITE_MULTIPLE: u8 = 0x10;

const MAX_READ_REGS: u16 = 125;
const MAX_WRITE_REGS: u16 = 123;

enum Outcome {
    NeedMore,
    Mismatch,
    /// A structurally and CRC-valid frame of this many bytes, CRC excluded.
    Frame(usize),
}

/// Attempts to parse one Modbus PDU (address through CRC) starting at the
/// beginning of `window`. `accepts_addr` gates the ADDR state; everything
/// else is pure frame-shape and CRC validation.
fn try_parse(window: &[u8], accepts_addr: &impl Fn(u8) -> bool) -> Outcome {
    let Some(&addr) = window.first() else {
        return Outcome::NeedMore;
    };
    if !accepts_addr(addr) {
        return Outcome::Mismatch;
    }

    let Some(&func) = window.get(1) else {
        return Outcome::NeedMore;
    };
    let header_len = match func {
        FUNC_READ_HOLDING => 4,
        FUNC_WRITE_MULTIPLE => 5,
        _ => return Outcome::Mismatch,
    };

    if window.len() < 2 + header_len {
        return Outcome::NeedMore;
    }
    let header = &window[2..2 + header_len];
    let n_regs = u16::from_be_bytes([header[2], header[3]]);

    let payload_len = if func == FUNC_WRITE_MULTIPLE {
        let byte_count = usize::from(header[4]);
        if byte_count != usize::from(n_regs) * 2 {
            return Outcome::Mismatch;
        }
        byte_count
    } else {
        0
    };

    let pdu_len = 2 + header_len + payload_len;
    if pdu_len + 2 > MAX_FRAME {
        return Outcome::Mismatch;
    }
    if window.len() < pdu_len + 2 {
        return Outcome::NeedMore;
    }

    let expected = crc::checksum(&window[..pdu_len]);
    let actual = crc::from_wire_bytes(window[pdu_len], window[pdu_len + 1]);
    if expected != actual {
        return Outcome::Mismatch;
    }

    Outcome::Frame(pdu_len)
}

/// Returns the valid register-count range for a function code, for callers
/// that need to reject oversized requests with an application exception
/// rather than a structural parse failure.
#[must_use]
pub const fn max_regs_for(func: u8) -> u16 {
    if func == FUNC_WRITE_MULTIPLE {
        MAX_WRITE_REGS
    } else {
        MAX_READ_REGS
    }
}

/// Scans `rx` for the next frame whose address satisfies `accepts_addr`.
///
/// Returns the frame bytes (address through the end of the payload, CRC
/// excluded) and consumes exactly the bytes that made up the frame.
/// Returns `None` when the buffered bytes don't yet contain a full frame;
/// every byte identified as part of a failed candidate is consumed so the
/// next call resumes scanning from the following byte.
pub fn poll_frame<const CAP: usize>(
    rx: &mut RingBuffer<u8, CAP>,
    accepts_addr: impl Fn(u8) -> bool,
) -> Option<ArrayVec<u8, MAX_FRAME>> {
    loop {
        let mut window = [0u8; MAX_FRAME];
        let available = rx.peek(&mut window);
        match try_parse(&window[..available], &accepts_addr) {
            Outcome::NeedMore => return None,
            Outcome::Mismatch => {
                rx.advance_rd(1);
            }
            Outcome::Frame(len) => {
                rx.advance_rd(len + 2);
                let mut frame = ArrayVec::new();
                frame
                    .try_extend_from_slice(&window[..len])
                    .expect("len <= MAX_FRAME by construction");
                return Some(frame);
            }
        }
    }
}
