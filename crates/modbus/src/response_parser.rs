//! Parses Modbus RTU **responses**, as received by a [`crate::Master`].
//!
//! Response framing is not the same shape as request framing (see
//! `parser.rs`): a 0x03 response carries a byte count followed directly by
//! the read data, while a 0x10 response simply echoes back the register
//! address and count it was asked to write. Grounded on the original
//! master's `_recv_parser` response state machine (`RX_STATE_DATA_LEN` /
//! `RX_STATE_DATA` for reads, `RX_STATE_REG` / `RX_STATE_REG_LEN` for
//! writes) — the request parser's header shape does not apply here.

use arrayvec::ArrayVec;
use ring_buffer::RingBuffer;

use crate::crc;
use crate::parser::{FUNC_READ_HOLDING, FUNC_WRITE_MULTIPLE, MAX_FRAME};

enum Outcome {
    NeedMore,
    Mismatch,
    /// A structurally and CRC-valid frame of this many bytes, CRC excluded.
    Frame(usize),
}

/// Attempts to parse one Modbus response PDU starting at the beginning of
/// `window`. `accepts_addr` gates the ADDR state; a function code other
/// than 0x03/0x10 (notably an exception reply, `func | 0x80`) is a
/// mismatch, not a distinct shape — the master has no decode path for
/// exception responses and treats them as line noise to resync past.
fn try_parse_response(window: &[u8], accepts_addr: &impl Fn(u8) -> bool) -> Outcome {
    let Some(&addr) = window.first() else {
        return Outcome::NeedMore;
    };
    if !accepts_addr(addr) {
        return Outcome::Mismatch;
    }

    let Some(&func) = window.get(1) else {
        return Outcome::NeedMore;
    };

    let pdu_len = match func {
        FUNC_READ_HOLDING => {
            let Some(&byte_count) = window.get(2) else {
                return Outcome::NeedMore;
            };
            3 + usize::from(byte_count)
        }
        FUNC_WRITE_MULTIPLE => 6, // addr, func, reg_hi, reg_lo, count_hi, count_lo
        _ => return Outcome::Mismatch,
    };

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

/// Scans `rx` for the next response frame whose address satisfies
/// `accepts_addr`. Same resync contract as [`crate::parser::poll_frame`]: a
/// mismatched candidate discards exactly one byte and scanning resumes from
/// the next, so a frame straddling garbage is never lost, only delayed.
pub fn poll_response_frame<const CAP: usize>(
    rx: &mut RingBuffer<u8, CAP>,
    accepts_addr: impl Fn(u8) -> bool,
) -> Option<ArrayVec<u8, MAX_FRAME>> {
    loop {
        let mut window = [0u8; MAX_FRAME];
        let available = rx.peek(&mut window);
        match try_parse_response(&window[..available], &accepts_addr) {
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
