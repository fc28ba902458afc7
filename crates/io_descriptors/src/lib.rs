//! Integer descriptor table layered on top of [`driver_registry`].
//!
//! Grounded on the donor codebase's `NOFILE`/`NDEV`-style capacity constants
//! and its fd-validate-then-dispatch file syscalls: every entry point here
//! validates the descriptor before touching the device vtable.

#![cfg_attr(not(test), no_std)]

use driver_registry::{default_lseek, Device, DeviceDirectory, DeviceId, Whence};
use status::Error;

pub use status::Result;

/// Descriptors below this index are reserved by convention (e.g. stdio-like
/// slots managed outside this table) and never handed out by [`DescriptorTable::open`].
pub const RESERVED: usize = 3;

#[derive(Clone, Copy)]
struct Entry {
    device: DeviceId,
    offset: u64,
}

/// Fixed-capacity table mapping integer descriptors to open devices.
///
/// `CAPACITY` is the total slot count, including the `RESERVED` low range
/// that `open` never allocates into.
pub struct DescriptorTable<'r, Registry, const CAPACITY: usize>
where
    Registry: DeviceDirectory,
{
    registry: &'r Registry,
    entries: [Option<Entry>; CAPACITY],
}

impl<'r, Registry, const CAPACITY: usize> DescriptorTable<'r, Registry, CAPACITY>
where
    Registry: DeviceDirectory,
{
    /// Creates an empty table bound to `registry`.
    ///
    /// # Panics
    ///
    /// Panics if `CAPACITY <= RESERVED`.
    #[must_use]
    pub fn new(registry: &'r Registry) -> Self {
        assert!(
            CAPACITY > RESERVED,
            "descriptor table capacity must exceed the reserved range"
        );
        Self {
            registry,
            entries: [None; CAPACITY],
        }
    }

    fn validate(&self, fd: i32) -> Result<usize> {
        let idx = usize::try_from(fd).map_err(|_| Error::InvalidDescriptor(fd))?;
        if idx < RESERVED || idx >= CAPACITY || self.entries[idx].is_none() {
            return Err(Error::InvalidDescriptor(fd));
        }
        Ok(idx)
    }

    /// Resolves `name` via the registry, allocates the lowest unused index
    /// `>= RESERVED`, and opens the device. Releases the index without
    /// touching the table if the device's `open` fails or is absent.
    pub fn open(&mut self, name: &str) -> Result<i32> {
        let device = self.registry.find(name).ok_or(Error::NotExist)?;
        let index = (RESERVED..CAPACITY)
            .find(|&i| self.entries[i].is_none())
            .ok_or(Error::DescriptorTableFull)?;

        self.registry
            .with(device, |dev| match dev.ops().open {
                Some(open) => open(dev),
                None => Err(Error::Exception),
            })
            .ok_or(Error::NotExist)??;

        self.entries[index] = Some(Entry { device, offset: 0 });
        #[allow(clippy::cast_possible_wrap)]
        Ok(index as i32)
    }

    /// Validates `fd`, calls the device's `close`, and releases the slot
    /// only once that call succeeds.
    pub fn close(&mut self, fd: i32) -> Result<()> {
        let idx = self.validate(fd)?;
        let device = self.entries[idx].expect("validated above").device;

        self.registry
            .with(device, |dev| match dev.ops().close {
                Some(close) => close(dev),
                None => Err(Error::Exception),
            })
            .ok_or(Error::InvalidDescriptor(fd))??;

        self.entries[idx] = None;
        Ok(())
    }

    /// Reads into `buf`, clamping to the device's declared size when it has
    /// one, and advances the descriptor's offset.
    pub fn read(&mut self, fd: i32, buf: &mut [u8]) -> Result<usize> {
        let idx = self.validate(fd)?;
        let entry = self.entries[idx].as_mut().expect("validated above");
        let device = entry.device;
        let offset = &mut entry.offset;

        self.registry
            .with(device, |dev| {
                let len = clamp_to_remaining(dev, *offset, buf.len());
                match dev.ops().read {
                    Some(read) => read(dev, &mut buf[..len], offset),
                    None => Err(Error::Exception),
                }
            })
            .ok_or(Error::InvalidDescriptor(fd))?
    }

    /// Writes from `buf`, clamping to the device's declared size when it has
    /// one, and advances the descriptor's offset.
    pub fn write(&mut self, fd: i32, buf: &[u8]) -> Result<usize> {
        let idx = self.validate(fd)?;
        let entry = self.entries[idx].as_mut().expect("validated above");
        let device = entry.device;
        let offset = &mut entry.offset;

        self.registry
            .with(device, |dev| {
                let len = clamp_to_remaining(dev, *offset, buf.len());
                match dev.ops().write {
                    Some(write) => write(dev, &buf[..len], offset),
                    None => Err(Error::Exception),
                }
            })
            .ok_or(Error::InvalidDescriptor(fd))?
    }

    /// Forwards a device-defined control request.
    pub fn ioctl(&mut self, fd: i32, cmd: u32, arg: usize) -> Result<i64> {
        let idx = self.validate(fd)?;
        let device = self.entries[idx].expect("validated above").device;

        self.registry
            .with(device, |dev| match dev.ops().ioctl {
                Some(ioctl) => ioctl(dev, cmd, arg),
                None => Err(Error::Exception),
            })
            .ok_or(Error::InvalidDescriptor(fd))?
    }

    /// Repositions the descriptor's offset. Requires the device to have
    /// declared a non-zero size; streaming devices cannot be seeked.
    pub fn lseek(&mut self, fd: i32, offset: i64, whence: Whence) -> Result<u64> {
        let idx = self.validate(fd)?;
        let entry = self.entries[idx].expect("validated above");

        let new = self
            .registry
            .with(entry.device, |dev| {
                if dev.dev_size() == 0 {
                    return Err(Error::Exception);
                }
                match dev.ops().lseek {
                    Some(lseek) => lseek(dev, offset, whence),
                    None => default_lseek(dev.dev_size(), entry.offset, offset, whence),
                }
            })
            .ok_or(Error::InvalidDescriptor(fd))??;

        self.entries[idx].as_mut().expect("validated above").offset = new;
        Ok(new)
    }
}

fn clamp_to_remaining(dev: &Device, offset: u64, requested: usize) -> usize {
    if dev.dev_size() == 0 {
        return requested;
    }
    let remaining = dev.dev_size().saturating_sub(offset);
    let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
    requested.min(remaining)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use driver_registry::{DriverRegistry, FileOps};
    use mutex_api::Mutex;

    use super::*;

    struct StdLock<T>(StdMutex<T>);

    impl<T> Mutex for StdLock<T> {
        type Data = T;
        type Guard<'a>
            = std::sync::MutexGuard<'a, T>
        where
            T: 'a;

        fn new(data: T) -> Self {
            Self(StdMutex::new(data))
        }

        fn lock(&self) -> Self::Guard<'_> {
            self.0.lock().unwrap()
        }
    }

    type TestTable = driver_registry::Table<4, 16>;
    type TestRegistry = DriverRegistry<StdLock<TestTable>, 4, 16>;

    fn pattern_device_ops() -> FileOps {
        FileOps {
            open: Some(|_| Ok(())),
            close: Some(|_| Ok(())),
            read: Some(|_dev, buf, offset| {
                let pattern = [0x55u8, 0xAA];
                for (i, slot) in buf.iter_mut().enumerate() {
                    *slot = pattern[(*offset as usize + i) % pattern.len()];
                }
                *offset += buf.len() as u64;
                Ok(buf.len())
            }),
            ..FileOps::EMPTY
        }
    }

    #[test]
    fn descriptor_lifecycle_matches_the_documented_scenario() {
        let registry = TestRegistry::new();
        registry
            .register("dev/a", pattern_device_ops(), 4, |_| Ok(()))
            .unwrap();

        let mut table: DescriptorTable<'_, TestRegistry, 8> = DescriptorTable::new(&registry);
        let fd = table.open("dev/a").unwrap();
        assert_eq!(fd, RESERVED as i32);

        let mut buf = [0u8; 10];
        assert_eq!(table.read(fd, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], [0x55, 0xAA, 0x55, 0xAA]);

        assert_eq!(table.read(fd, &mut buf).unwrap(), 0);

        table.lseek(fd, 0, Whence::Head).unwrap();
        let mut buf2 = [0u8; 2];
        assert_eq!(table.read(fd, &mut buf2).unwrap(), 2);
        assert_eq!(buf2, [0x55, 0xAA]);

        table.close(fd).unwrap();
        assert_eq!(table.close(fd), Err(Error::InvalidDescriptor(fd)));
    }

    #[test]
    fn open_resolves_unknown_name_to_not_exist() {
        let registry = TestRegistry::new();
        let mut table: DescriptorTable<'_, TestRegistry, 8> = DescriptorTable::new(&registry);
        assert_eq!(table.open("missing"), Err(Error::NotExist));
    }

    #[test]
    fn open_reports_descriptor_table_full() {
        let registry = TestRegistry::new();
        registry
            .register("dev/a", pattern_device_ops(), 4, |_| Ok(()))
            .unwrap();
        let mut table: DescriptorTable<'_, TestRegistry, 4> = DescriptorTable::new(&registry);
        assert_eq!(table.open("dev/a"), Ok(3));
        assert_eq!(table.open("dev/a"), Err(Error::DescriptorTableFull));
    }

    #[test]
    fn lseek_rejects_out_of_bounds_targets() {
        let registry = TestRegistry::new();
        registry
            .register("dev/a", pattern_device_ops(), 4, |_| Ok(()))
            .unwrap();
        let mut table: DescriptorTable<'_, TestRegistry, 8> = DescriptorTable::new(&registry);
        let fd = table.open("dev/a").unwrap();
        assert_eq!(table.lseek(fd, 5, Whence::Head), Err(Error::InvalidSeek));
        assert_eq!(table.lseek(fd, 2, Whence::Head), Ok(2));
    }
}
