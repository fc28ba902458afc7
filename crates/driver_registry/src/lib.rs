//! Name -> device registry and the per-device file-operations vtable.
//!
//! Mirrors the donor codebase's `DeviceTable`/`register_device` shape (a
//! lock-guarded fixed table, fn-pointer vtable fields copied out of the
//! guard before being called), generalized from a fixed `DeviceNo` index to
//! a bounded name -> device mapping.

#![cfg_attr(not(test), no_std)]

use core::cell::Cell;

use mutex_api::Mutex;
use status::Error;

pub use status::Result;

/// `lseek` origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Offset from the start of the device.
    Head,
    /// Offset from the current position.
    Cur,
    /// Offset from the end of the device.
    Tail,
}

/// The six file operations a device may implement. Every field is
/// optional; calling an absent operation yields [`Error::Exception`].
#[derive(Clone, Copy)]
pub struct FileOps {
    pub open: Option<fn(&Device) -> Result<()>>,
    pub close: Option<fn(&Device) -> Result<()>>,
    pub ioctl: Option<fn(&Device, cmd: u32, arg: usize) -> Result<i64>>,
    pub read: Option<fn(&Device, buf: &mut [u8], offset: &mut u64) -> Result<usize>>,
    pub write: Option<fn(&Device, buf: &[u8], offset: &mut u64) -> Result<usize>>,
    pub lseek: Option<fn(&Device, offset: i64, whence: Whence) -> Result<u64>>,
}

impl FileOps {
    /// A vtable with every operation absent.
    pub const EMPTY: Self = Self {
        open: None,
        close: None,
        ioctl: None,
        read: None,
        write: None,
        lseek: None,
    };
}

impl Default for FileOps {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A registered device: its operations, declared size, and an opaque
/// per-device value drivers may stash and retrieve.
pub struct Device {
    ops: FileOps,
    dev_size: u64,
    private: Cell<usize>,
}

impl Device {
    fn new(ops: FileOps, dev_size: u64) -> Self {
        Self {
            ops,
            dev_size,
            private: Cell::new(0),
        }
    }

    /// The device's vtable.
    #[must_use]
    pub const fn ops(&self) -> &FileOps {
        &self.ops
    }

    /// Declared size in bytes; `0` means streaming/unsized.
    #[must_use]
    pub const fn dev_size(&self) -> u64 {
        self.dev_size
    }

    /// Reads the opaque per-device value (`0` until set).
    #[must_use]
    pub fn private(&self) -> usize {
        self.private.get()
    }

    /// Stores the opaque per-device value.
    pub fn set_private(&self, value: usize) {
        self.private.set(value);
    }
}

/// The default `lseek` whence algorithm, for devices with a fixed
/// `dev_size` that don't need custom seek behavior.
pub fn default_lseek(dev_size: u64, cur: u64, offset: i64, whence: Whence) -> Result<u64> {
    let new = match whence {
        Whence::Head => {
            if offset < 0 {
                return Err(Error::InvalidSeek);
            }
            offset as u64
        }
        Whence::Cur => i64::try_from(cur)
            .ok()
            .and_then(|cur| cur.checked_add(offset))
            .filter(|&n| n >= 0)
            .ok_or(Error::InvalidSeek)? as u64,
        Whence::Tail => {
            if offset > 0 {
                return Err(Error::InvalidSeek);
            }
            i64::try_from(dev_size)
                .ok()
                .and_then(|size| size.checked_add(offset))
                .filter(|&n| n >= 0)
                .ok_or(Error::InvalidSeek)? as u64
        }
    };
    if new > dev_size {
        return Err(Error::InvalidSeek);
    }
    Ok(new)
}

/// A single registry table entry: a device and the name it was registered
/// under. Opaque to callers beyond naming it as part of [`Table`].
pub struct Slot<const MAX_NAME_LEN: usize> {
    name: [u8; MAX_NAME_LEN],
    name_len: usize,
    device: Device,
}

impl<const MAX_NAME_LEN: usize> Slot<MAX_NAME_LEN> {
    fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }
}

fn copy_name<const MAX_NAME_LEN: usize>(name: &str) -> ([u8; MAX_NAME_LEN], usize) {
    let mut buf = [0u8; MAX_NAME_LEN];
    let src = name.as_bytes();
    let n = src.len().min(MAX_NAME_LEN.saturating_sub(1));
    buf[..n].copy_from_slice(&src[..n]);
    (buf, n)
}

/// Opaque handle to a registered device, returned by [`DriverRegistry::register`]
/// and [`DriverRegistry::find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(usize);

/// The fixed backing array type for a given `(MAX_DEVICES, MAX_NAME_LEN)`
/// instantiation, exposed so callers can name a concrete [`Mutex::Data`].
pub type Table<const MAX_DEVICES: usize, const MAX_NAME_LEN: usize> =
    [Option<Slot<MAX_NAME_LEN>>; MAX_DEVICES];

/// Bounded name -> device registry, guarded by a caller-chosen [`Mutex`]
/// implementation (a spinlock on target, `std::sync::Mutex` under test).
pub struct DriverRegistry<Lock, const MAX_DEVICES: usize, const MAX_NAME_LEN: usize>
where
    Lock: Mutex<Data = Table<MAX_DEVICES, MAX_NAME_LEN>>,
{
    table: Lock,
}

impl<Lock, const MAX_DEVICES: usize, const MAX_NAME_LEN: usize>
    DriverRegistry<Lock, MAX_DEVICES, MAX_NAME_LEN>
where
    Lock: Mutex<Data = Table<MAX_DEVICES, MAX_NAME_LEN>>,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Lock::new([const { None }; MAX_DEVICES]),
        }
    }

    /// Allocates a device, calls `init` on it exactly once, then inserts
    /// `name -> device`. On duplicate name or capacity exhaustion, `close`
    /// is invoked on the freshly built device (if present) and the
    /// registration fails without touching the existing table state.
    pub fn register(
        &self,
        name: &str,
        ops: FileOps,
        dev_size: u64,
        init: impl FnOnce(&Device) -> Result<()>,
    ) -> Result<DeviceId> {
        let device = Device::new(ops, dev_size);
        init(&device)?;

        let (name_buf, name_len) = copy_name::<MAX_NAME_LEN>(name);
        let mut guard = self.table.lock();
        let duplicate = guard
            .iter()
            .flatten()
            .any(|slot| slot.name() == &name_buf[..name_len]);
        if duplicate {
            tear_down(&device);
            return Err(Error::Occupied);
        }

        let Some(index) = guard.iter().position(Option::is_none) else {
            tear_down(&device);
            return Err(Error::RegistryFull);
        };

        guard[index] = Some(Slot {
            name: name_buf,
            name_len,
            device,
        });
        Ok(DeviceId(index))
    }

    /// Looks up a device by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<DeviceId> {
        let (name_buf, name_len) = copy_name::<MAX_NAME_LEN>(name);
        let guard = self.table.lock();
        guard
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.name() == &name_buf[..name_len]))
            .map(DeviceId)
    }

    /// Runs `f` with the device identified by `id`, while the registry is
    /// locked. Returns `None` if the slot is empty (e.g. raced with a
    /// `register` call under a weaker mutex than the framework assumes).
    pub fn with<R>(&self, id: DeviceId, f: impl FnOnce(&Device) -> R) -> Option<R> {
        let guard = self.table.lock();
        guard[id.0].as_ref().map(|slot| f(&slot.device))
    }

    /// Enumerates registered names into `buffer`, separated by `\r\n`,
    /// truncating on overflow. Returns the number of bytes written.
    pub fn fill_all_names(&self, buffer: &mut [u8]) -> usize {
        let guard = self.table.lock();
        let mut written = 0;
        let mut first = true;
        for slot in guard.iter().flatten() {
            if !first {
                let sep = b"\r\n";
                if written + sep.len() > buffer.len() {
                    break;
                }
                buffer[written..written + sep.len()].copy_from_slice(sep);
                written += sep.len();
            }
            let name = slot.name();
            if written + name.len() > buffer.len() {
                break;
            }
            buffer[written..written + name.len()].copy_from_slice(name);
            written += name.len();
            first = false;
        }
        written
    }
}

impl<Lock, const MAX_DEVICES: usize, const MAX_NAME_LEN: usize> Default
    for DriverRegistry<Lock, MAX_DEVICES, MAX_NAME_LEN>
where
    Lock: Mutex<Data = Table<MAX_DEVICES, MAX_NAME_LEN>>,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Abstracts over a concrete [`DriverRegistry`] instantiation, so the
/// descriptor layer doesn't need to name its lock type or capacities.
pub trait DeviceDirectory {
    /// Looks up a device by name.
    fn find(&self, name: &str) -> Option<DeviceId>;
    /// Runs `f` with the device identified by `id`, while the registry is
    /// locked.
    fn with<R>(&self, id: DeviceId, f: impl FnOnce(&Device) -> R) -> Option<R>;
}

impl<Lock, const MAX_DEVICES: usize, const MAX_NAME_LEN: usize> DeviceDirectory
    for DriverRegistry<Lock, MAX_DEVICES, MAX_NAME_LEN>
where
    Lock: Mutex<Data = Table<MAX_DEVICES, MAX_NAME_LEN>>,
{
    fn find(&self, name: &str) -> Option<DeviceId> {
        Self::find(self, name)
    }

    fn with<R>(&self, id: DeviceId, f: impl FnOnce(&Device) -> R) -> Option<R> {
        Self::with(self, id, f)
    }
}

fn tear_down(device: &Device) {
    if let Some(close) = device.ops.close {
        let _ = close(device);
    }
}
