//! Modbus RTU slave: a register-range work table, request decode, response
//! synthesis.

use arrayvec::ArrayVec;
use ring_buffer::RingBuffer;
use status::ModbusException;

use crate::{
    crc,
    parser::{self, poll_frame, FUNC_READ_HOLDING, FUNC_WRITE_MULTIPLE, MAX_FRAME},
    Transport,
};

/// A register range handler. Framework-decoded data (for writes) is passed
/// in; the handler fills the array in place (for reads). An `Err` return
/// becomes an application-level exception response.
pub type Handler = fn(&mut [u16]) -> Result<(), ModbusException>;

/// One entry of a slave's work table: `[start, end)` maps to `handler`.
#[derive(Clone, Copy)]
pub struct WorkEntry {
    pub start: u16,
    pub end: u16,
    pub handler: Handler,
}

/// A Modbus RTU slave endpoint: fixed address, a work table of up to
/// `MAX_ENTRIES` register ranges, and a receive buffer of `RX_CAP` bytes.
pub struct Slave<const MAX_ENTRIES: usize, const RX_CAP: usize> {
    address: u8,
    table: ArrayVec<WorkEntry, MAX_ENTRIES>,
    rx: RingBuffer<u8, RX_CAP>,
}

impl<const MAX_ENTRIES: usize, const RX_CAP: usize> Slave<MAX_ENTRIES, RX_CAP> {
    /// Creates a slave with an empty work table.
    #[must_use]
    pub fn new(address: u8) -> Self {
        Self {
            address,
            table: ArrayVec::new(),
            rx: RingBuffer::new(None, None),
        }
    }

    /// Adds a register-range handler. Ranges may not overlap with existing
    /// entries; the table has room for `MAX_ENTRIES` entries.
    pub fn add_work_entry(&mut self, entry: WorkEntry) -> status::Result<()> {
        let overlaps = self
            .table
            .iter()
            .any(|e| entry.start < e.end && e.start < entry.end);
        if overlaps {
            return Err(status::Error::InvalidArgument);
        }
        self.table
            .try_push(entry)
            .map_err(|_| status::Error::RegistryFull)
    }

    fn find_entry(&self, reg: u16, n_regs: u16) -> Option<&WorkEntry> {
        let end = reg.checked_add(n_regs)?;
        self.table
            .iter()
            .find(|e| e.start <= reg && end <= e.end)
    }

    /// Runs one iteration: drains available transport bytes, drives the
    /// parser, and on a complete matching frame, dispatches to the work
    /// table and writes a response.
    pub fn poll(&mut self, transport: &mut impl Transport) {
        let mut buf = [0u8; 64];
        let n = transport.read(&mut buf);
        if n > 0 {
            self.rx.add(&buf[..n]);
        }

        let Some(frame) = poll_frame(&mut self.rx, |addr| addr == self.address) else {
            return;
        };

        let response = self.handle_frame(&frame);
        transport.dir_ctrl(crate::Direction::TxOnly);
        transport.write(&response);
        transport.dir_ctrl(crate::Direction::RxOnly);
    }

    fn handle_frame(&self, frame: &[u8]) -> ArrayVec<u8, MAX_FRAME> {
        let func = frame[1];
        let reg = u16::from_be_bytes([frame[2], frame[3]]);
        let n_regs = u16::from_be_bytes([frame[4], frame[5]]);

        if n_regs == 0 || n_regs > parser::max_regs_for(func) {
            return self.exception(func, ModbusException::IllegalData);
        }

        let Some(entry) = (if self.table.is_empty() {
            return self.exception(func, ModbusException::Busy);
        } else {
            self.find_entry(reg, n_regs)
        }) else {
            return self.exception(func, ModbusException::IllegalRegisterAddress);
        };

        match func {
            FUNC_WRITE_MULTIPLE => self.handle_write(frame, reg, n_regs, entry),
            _ => self.handle_read(func, reg, n_regs, entry),
        }
    }

    fn handle_write(
        &self,
        frame: &[u8],
        reg: u16,
        n_regs: u16,
        entry: &WorkEntry,
    ) -> ArrayVec<u8, MAX_FRAME> {
        let payload = &frame[7..];
        let mut regs = [0u16; 123];
        for (i, slot) in regs.iter_mut().take(n_regs as usize).enumerate() {
            *slot = u16::from_be_bytes([payload[i * 2], payload[i * 2 + 1]]);
        }

        match (entry.handler)(&mut regs[..n_regs as usize]) {
            Ok(()) => {
                let mut response = ArrayVec::new();
                response.push(self.address);
                response.push(FUNC_WRITE_MULTIPLE);
                response.try_extend_from_slice(&reg.to_be_bytes()).unwrap();
                response
                    .try_extend_from_slice(&n_regs.to_be_bytes())
                    .unwrap();
                append_crc(&mut response);
                response
            }
            Err(exc) => self.exception(FUNC_WRITE_MULTIPLE, exc),
        }
    }

    fn handle_read(
        &self,
        func: u8,
        _reg: u16,
        n_regs: u16,
        entry: &WorkEntry,
    ) -> ArrayVec<u8, MAX_FRAME> {
        let mut regs = [0u16; 125];
        match (entry.handler)(&mut regs[..n_regs as usize]) {
            Ok(()) => {
                let mut response = ArrayVec::new();
                response.push(self.address);
                response.push(func);
                #[allow(clippy::cast_possible_truncation)]
                response.push((n_regs * 2) as u8);
                for &value in &regs[..n_regs as usize] {
                    response.try_extend_from_slice(&value.to_be_bytes()).unwrap();
                }
                append_crc(&mut response);
                response
            }
            Err(exc) => self.exception(func, exc),
        }
    }

    fn exception(&self, func: u8, code: ModbusException) -> ArrayVec<u8, MAX_FRAME> {
        let mut response = ArrayVec::new();
        response.push(self.address);
        response.push(func | 0x80);
        response.push(code.code());
        append_crc(&mut response);
        response
    }
}

fn append_crc(buf: &mut ArrayVec<u8, MAX_FRAME>) {
    let crc = crc::checksum(buf);
    buf.try_extend_from_slice(&crc::to_wire_bytes(crc)).unwrap();
}
