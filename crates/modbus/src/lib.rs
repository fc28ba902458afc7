//! Modbus RTU master and slave over a half-duplex serial transport.
//!
//! Grounded on the donor codebase's UART driver shape (`uart.rs`) for the
//! [`Transport`] boundary: init/read/write plus a direction-control hook for
//! RS-485 half-duplex lines. The framing, CRC, and request/response state
//! machines have no donor analogue and are built directly from the Modbus
//! RTU wire format.

#![cfg_attr(not(test), no_std)]

mod crc;
mod master;
mod parser;
mod response_parser;
mod slave;

pub use master::{Master, RequestSpec};
pub use parser::{max_regs_for, poll_frame, FUNC_READ_HOLDING, FUNC_WRITE_MULTIPLE, MAX_FRAME};
pub use slave::{Handler, Slave, WorkEntry};

/// Line direction for half-duplex (RS-485) transceivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Idle,
    RxOnly,
    TxOnly,
}

/// The serial boundary a [`Master`] or [`Slave`] drives.
///
/// `check_send` lets a transport report transmit completion explicitly
/// (e.g. a UART TX-empty interrupt flag); transports without that signal
/// return `None` and callers treat `write` as having completed synchronously.
pub trait Transport {
    /// One-time hardware bring-up, e.g. baud rate and line discipline.
    /// Callers run this once, before the first `poll`.
    fn init(&mut self) -> bool {
        true
    }

    fn read(&mut self, buf: &mut [u8]) -> usize;
    fn write(&mut self, buf: &[u8]) -> usize;
    fn dir_ctrl(&mut self, dir: Direction);

    fn check_send(&mut self) -> Option<bool> {
        None
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{Direction, Transport};
    use arrayvec::ArrayVec;

    /// An in-memory loopback-free transport: bytes written by the device
    /// under test land in `tx`, and `feed_rx` stages bytes for its next
    /// `read`.
    pub struct FakeTransport {
        rx: ArrayVec<u8, 512>,
        tx: ArrayVec<u8, 512>,
        last_dir: Direction,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self {
                rx: ArrayVec::new(),
                tx: ArrayVec::new(),
                last_dir: Direction::Idle,
            }
        }

        pub fn feed_rx(&mut self, bytes: &[u8]) {
            self.rx.try_extend_from_slice(bytes).unwrap();
        }

        pub fn sent(&self) -> &[u8] {
            &self.tx
        }

        pub fn clear_sent(&mut self) {
            self.tx.clear();
        }

        pub fn last_dir(&self) -> Direction {
            self.last_dir
        }
    }

    impl Transport for FakeTransport {
        fn read(&mut self, buf: &mut [u8]) -> usize {
            let n = self.rx.len().min(buf.len());
            buf[..n].copy_from_slice(&self.rx[..n]);
            let remaining: ArrayVec<u8, 512> = self.rx[n..].iter().copied().collect();
            self.rx = remaining;
            n
        }

        fn write(&mut self, buf: &[u8]) -> usize {
            let n = buf.len().min(self.tx.capacity() - self.tx.len());
            self.tx.try_extend_from_slice(&buf[..n]).unwrap();
            n
        }

        fn dir_ctrl(&mut self, dir: Direction) {
            self.last_dir = dir;
        }
    }
}
