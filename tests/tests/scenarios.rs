//! End-to-end scenarios that exercise two or more workspace crates together,
//! the way the unit tests inside each crate deliberately don't.

use std::sync::atomic::{AtomicUsize, Ordering};

use arrayvec::ArrayVec;
use driver_registry::FileOps;
use modbus::{Direction, Master, RequestSpec, Slave, Transport, WorkEntry, FUNC_READ_HOLDING};
use status::ModbusException;

struct LoopbackTransport {
    rx: ArrayVec<u8, 512>,
    tx: ArrayVec<u8, 512>,
}

impl LoopbackTransport {
    fn new() -> Self {
        Self {
            rx: ArrayVec::new(),
            tx: ArrayVec::new(),
        }
    }

    fn feed_rx(&mut self, bytes: &[u8]) {
        self.rx.try_extend_from_slice(bytes).unwrap();
    }

    fn take_sent(&mut self) -> ArrayVec<u8, 512> {
        core::mem::take(&mut self.tx)
    }
}

impl Transport for LoopbackTransport {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = self.rx.len().min(buf.len());
        buf[..n].copy_from_slice(&self.rx[..n]);
        let remaining: ArrayVec<u8, 512> = self.rx[n..].iter().copied().collect();
        self.rx = remaining;
        n
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        self.tx.try_extend_from_slice(buf).unwrap();
        buf.len()
    }

    fn dir_ctrl(&mut self, _dir: Direction) {}
}

fn read_holding(regs: &mut [u16]) -> Result<(), ModbusException> {
    for (i, slot) in regs.iter_mut().enumerate() {
        *slot = 0x0A + (i as u16) * 0x0A;
    }
    Ok(())
}

/// A slave answers a master request carried over a shared in-memory serial
/// line, and the master's callback observes the decoded registers.
#[test]
fn a_master_request_round_trips_through_a_slave_over_one_line() {
    static SEEN: AtomicUsize = AtomicUsize::new(0);

    fn callback(_user_data: usize, timeout: bool, data: &[u16]) {
        assert!(!timeout);
        assert_eq!(data, &[0x0A, 0x14]);
        SEEN.fetch_add(1, Ordering::SeqCst);
    }

    let mut master: Master<4, 256> = Master::new();
    master
        .submit(RequestSpec {
            addr: 0x11,
            func: FUNC_READ_HOLDING,
            reg: 0,
            n_regs: 2,
            write_data: ArrayVec::new(),
            timeout_ticks: 20,
            callback,
            user_data: 0,
        })
        .unwrap();

    let mut slave: Slave<4, 256> = Slave::new(0x11);
    slave
        .add_work_entry(WorkEntry {
            start: 0,
            end: 10,
            handler: read_holding,
        })
        .unwrap();

    let mut line = LoopbackTransport::new();

    master.poll(&mut line); // sends the request
    let request = line.take_sent();

    let mut slave_line = LoopbackTransport::new();
    slave_line.feed_rx(&request);
    slave.poll(&mut slave_line); // answers it
    let response = slave_line.take_sent();

    line.feed_rx(&response);
    master.poll(&mut line); // matches the response, fires the callback

    assert_eq!(SEEN.load(Ordering::SeqCst), 1);
}

/// A slave with no registered work at all answers with a busy exception
/// rather than pretending to have data.
#[test]
fn an_idle_slave_answers_with_busy() {
    let mut slave: Slave<4, 256> = Slave::new(0x05);
    let mut frame = ArrayVec::<u8, 32>::new();
    frame.push(0x05);
    frame.push(FUNC_READ_HOLDING);
    frame.try_extend_from_slice(&0u16.to_be_bytes()).unwrap();
    frame.try_extend_from_slice(&1u16.to_be_bytes()).unwrap();
    let crc = modbus_crc_for_test(&frame);
    frame.try_extend_from_slice(&crc).unwrap();

    let mut line = LoopbackTransport::new();
    line.feed_rx(&frame);
    slave.poll(&mut line);

    let response = line.take_sent();
    assert_eq!(response[1], FUNC_READ_HOLDING | 0x80);
    assert_eq!(response[2], ModbusException::Busy.code());
}

/// A request answered too slowly (or not at all) exhausts its retries and
/// reports a timeout rather than hanging forever.
#[test]
fn an_unanswered_master_request_eventually_times_out() {
    static TIMED_OUT: AtomicUsize = AtomicUsize::new(0);
    fn callback(_user_data: usize, timeout: bool, _data: &[u16]) {
        if timeout {
            TIMED_OUT.fetch_add(1, Ordering::SeqCst);
        }
    }

    let mut master: Master<4, 128> = Master::new();
    master
        .submit(RequestSpec {
            addr: 0x11,
            func: FUNC_READ_HOLDING,
            reg: 0,
            n_regs: 1,
            write_data: ArrayVec::new(),
            timeout_ticks: 5,
            callback,
            user_data: 0,
        })
        .unwrap();

    let mut line = LoopbackTransport::new();
    for _ in 0..20 {
        master.poll(&mut line);
    }
    assert_eq!(TIMED_OUT.load(Ordering::SeqCst), 1);
}

fn counting_read(
    _dev: &driver_registry::Device,
    buf: &mut [u8],
    offset: &mut u64,
) -> status::Result<usize> {
    static READS: AtomicUsize = AtomicUsize::new(0);
    buf[0] = 0x42;
    *offset += 1;
    READS.fetch_add(1, Ordering::SeqCst);
    Ok(1)
}

fn sensor_init(registry: &runtime::Registry) -> status::Result<()> {
    let ops = FileOps {
        open: Some(|_| Ok(())),
        close: Some(|_| Ok(())),
        read: Some(counting_read),
        ..FileOps::EMPTY
    };
    registry.register("sensor", ops, 0, |_| Ok(())).map(|_| ())
}

/// A driver registered at boot is reachable through the runtime's own
/// descriptor table, and its reads interleave with the tick scheduler's run
/// loop the way a real `main` would drive both every iteration.
///
/// `runtime::boot` writes into a process-wide singleton, so this is the only
/// test in this binary allowed to call it.
#[test]
fn a_booted_runtime_drives_a_registered_device_through_its_scheduler() {
    runtime::boot(&[sensor_init]).unwrap();
    let mut rt = runtime::Runtime::new();

    rt.scheduler.register_periodic(|| {}, 2).unwrap();

    let fd = rt.descriptors.open("sensor").unwrap();
    let mut buf = [0u8; 1];
    for _ in 0..6 {
        rt.tick();
        rt.run_scheduler();
        assert_eq!(rt.descriptors.read(fd, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0x42);
    }

    rt.descriptors.close(fd).unwrap();
    assert_eq!(
        rt.descriptors.close(fd),
        Err(status::Error::InvalidDescriptor(fd))
    );
}

fn modbus_crc_for_test(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 == 0 {
                crc >>= 1;
            } else {
                crc = (crc >> 1) ^ 0xA001;
            }
        }
    }
    [(crc & 0xFF) as u8, (crc >> 8) as u8]
}
