//! Modbus RTU master: a FIFO request queue with timeout and retry.

use arrayvec::ArrayVec;
use ring_buffer::RingBuffer;
use status::{Error, Result};

use crate::{
    crc,
    parser::{FUNC_READ_HOLDING, FUNC_WRITE_MULTIPLE, MAX_FRAME},
    response_parser::poll_response_frame,
    Direction, Transport,
};

/// Maximum number of retransmissions after the first send before a request
/// is abandoned and reported as a timeout.
const MAX_REPEATS: u8 = 3;

/// Invoked once per request: either with the decoded response (`timeout`
/// false) or, after exhausting retries, with an empty slice (`timeout`
/// true).
pub type Callback = fn(user_data: usize, timeout: bool, data: &[u16]);

/// A queued Modbus transaction.
pub struct RequestSpec {
    pub addr: u8,
    pub func: u8,
    pub reg: u16,
    pub n_regs: u16,
    pub write_data: ArrayVec<u16, 123>,
    pub timeout_ticks: u32,
    pub callback: Callback,
    pub user_data: usize,
}

struct Request {
    spec: RequestSpec,
    elapsed: u32,
    retries: u8,
    sent: bool,
    /// Set while a DMA-backed transport is still flushing the last `write`.
    /// Cleared once `Transport::check_send` reports completion.
    is_sending: bool,
}

/// A Modbus RTU master: submits requests into a fixed-size FIFO and drives
/// them to completion one at a time against a half-duplex [`Transport`].
pub struct Master<const MAX_REQUESTS: usize, const RX_CAP: usize> {
    queue: [Option<Request>; MAX_REQUESTS],
    head: usize,
    len: usize,
    rx: RingBuffer<u8, RX_CAP>,
}

impl<const MAX_REQUESTS: usize, const RX_CAP: usize> Master<MAX_REQUESTS, RX_CAP> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: [const { None }; MAX_REQUESTS],
            head: 0,
            len: 0,
            rx: RingBuffer::new(None, None),
        }
    }

    /// Validates and enqueues a request. Rejects invalid function codes,
    /// out-of-range register counts, mismatched write payload lengths, and
    /// a zero timeout.
    pub fn submit(&mut self, spec: RequestSpec) -> Result<()> {
        if spec.func != FUNC_READ_HOLDING && spec.func != FUNC_WRITE_MULTIPLE {
            return Err(Error::InvalidArgument);
        }
        if spec.n_regs == 0 || spec.n_regs > crate::max_regs_for(spec.func) {
            return Err(Error::InvalidRegisterCount);
        }
        if spec.func == FUNC_WRITE_MULTIPLE && spec.write_data.len() != spec.n_regs as usize {
            return Err(Error::InvalidArgument);
        }
        if spec.timeout_ticks == 0 {
            return Err(Error::InvalidArgument);
        }
        if self.len == MAX_REQUESTS {
            return Err(Error::RequestQueueFull);
        }

        let slot = (self.head + self.len) % MAX_REQUESTS;
        self.queue[slot] = Some(Request {
            spec,
            elapsed: 0,
            retries: 0,
            sent: false,
            is_sending: false,
        });
        self.len += 1;
        Ok(())
    }

    fn front(&self) -> Option<&Request> {
        if self.len == 0 {
            None
        } else {
            self.queue[self.head].as_ref()
        }
    }

    fn pop_front(&mut self) {
        self.queue[self.head] = None;
        self.head = (self.head + 1) % MAX_REQUESTS;
        self.len -= 1;
    }

    /// Drives the queue by one tick: while a DMA send is still in flight,
    /// only polls for its completion; otherwise sends the head request if
    /// it hasn't been sent yet, checks for a matching response, and
    /// otherwise ages the pending timeout, retransmitting or giving up as
    /// needed.
    pub fn poll(&mut self, transport: &mut impl Transport) {
        if self.front().is_none() {
            return;
        }

        if self.front().unwrap().is_sending {
            if transport.check_send() == Some(true) {
                transport.dir_ctrl(Direction::RxOnly);
                self.queue[self.head].as_mut().unwrap().is_sending = false;
            }
            return;
        }

        if !self.front().unwrap().sent {
            self.send_head(transport);
        }

        let mut buf = [0u8; 64];
        let n = transport.read(&mut buf);
        if n > 0 {
            self.rx.add(&buf[..n]);
        }

        let addr = self.front().unwrap().spec.addr;
        let func = self.front().unwrap().spec.func;
        if let Some(frame) = poll_response_frame(&mut self.rx, |a| a == addr) {
            if frame.len() >= 2 && frame[1] == func {
                self.complete(&frame);
                return;
            }
            // address matched but function didn't: not our response, drop it.
        }

        let request = self.queue[self.head].as_mut().expect("front checked above");
        request.elapsed += 1;
        if request.elapsed < request.spec.timeout_ticks {
            return;
        }

        if request.retries < MAX_REPEATS {
            request.retries += 1;
            self.send_head(transport);
        } else {
            let callback = request.spec.callback;
            let user_data = request.spec.user_data;
            self.pop_front();
            callback(user_data, true, &[]);
        }
    }

    fn send_head(&mut self, transport: &mut impl Transport) {
        let request = self.queue[self.head].as_mut().expect("caller checked front");
        let spec = &request.spec;

        let mut pdu = ArrayVec::<u8, MAX_FRAME>::new();
        pdu.push(spec.addr);
        pdu.push(spec.func);
        pdu.try_extend_from_slice(&spec.reg.to_be_bytes()).unwrap();
        pdu.try_extend_from_slice(&spec.n_regs.to_be_bytes())
            .unwrap();
        if spec.func == FUNC_WRITE_MULTIPLE {
            #[allow(clippy::cast_possible_truncation)]
            pdu.push((spec.n_regs * 2) as u8);
            for value in &spec.write_data {
                pdu.try_extend_from_slice(&value.to_be_bytes()).unwrap();
            }
        }
        let crc = crc::checksum(&pdu);
        pdu.try_extend_from_slice(&crc::to_wire_bytes(crc)).unwrap();

        transport.dir_ctrl(Direction::TxOnly);
        transport.write(&pdu);

        if transport.check_send() == Some(false) {
            // DMA still flushing the transmit buffer; stay in TX until a
            // later poll() observes completion.
            request.is_sending = true;
        } else {
            transport.dir_ctrl(Direction::RxOnly);
            request.is_sending = false;
        }

        request.sent = true;
        request.elapsed = 0;
    }

    fn complete(&mut self, frame: &[u8]) {
        let func = frame[1];
        let mut data = ArrayVec::<u16, 125>::new();
        if func == FUNC_READ_HOLDING {
            let byte_count = usize::from(frame[2]);
            let payload = &frame[3..3 + byte_count];
            for pair in payload.chunks_exact(2) {
                data.push(u16::from_be_bytes([pair[0], pair[1]]));
            }
        }

        let (callback, user_data) = {
            let request = self.front().expect("front checked by poll");
            (request.spec.callback, request.spec.user_data)
        };
        self.pop_front();
        callback(user_data, false, &data);
    }
}

impl<const MAX_REQUESTS: usize, const RX_CAP: usize> Default for Master<MAX_REQUESTS, RX_CAP> {
    fn default() -> Self {
        Self::new()
    }
}
