//! Boundary glue: wires the driver registry, descriptor table, tick
//! scheduler, and Modbus endpoints into one boot sequence.
//!
//! Grounded on `kernel/src/lib.rs`'s `main()` — a numbered, logged init
//! sequence run once on the one core that matters, followed by handing
//! control to a cooperative run loop (`proc::scheduler()` there,
//! [`Runtime::run_scheduler`] here).

#![cfg_attr(not(test), no_std)]

mod lock;

pub use lock::CooperativeLock;

use driver_registry::{DriverRegistry, Table as DeviceTable};
use io_descriptors::DescriptorTable;
use once_init::OnceInit;
use status::Result;
use tick_scheduler::{Scheduler, TickCounter};

/// Upper bound on simultaneously registered devices.
pub const MAX_DEVICES: usize = 16;
/// Upper bound on a device name's length, including the trailing NUL a
/// full name table entry reserves for truncation.
pub const MAX_NAME_LEN: usize = 16;
/// Upper bound on simultaneously open descriptors, reserved range included.
pub const FD_CAPACITY: usize = 16;
/// Timing wheel bucket count; must be a power of two.
pub const WHEEL_SIZE: usize = 64;
/// Upper bound on simultaneously registered periodic tasks.
pub const MAX_TASKS: usize = 16;
/// Upper bound on simultaneously pending deferred tasks.
pub const MAX_DEFER: usize = 8;

pub type Registry =
    DriverRegistry<CooperativeLock<DeviceTable<MAX_DEVICES, MAX_NAME_LEN>>, MAX_DEVICES, MAX_NAME_LEN>;
pub type Descriptors<'r> = DescriptorTable<'r, Registry, FD_CAPACITY>;
pub type TaskScheduler = Scheduler<WHEEL_SIZE, MAX_TASKS, MAX_DEFER>;

/// A driver's registration entry point, run once during [`boot`].
pub type DriverInit = fn(&Registry) -> Result<()>;

static REGISTRY: OnceInit<Registry> = OnceInit::new();

/// Runs each driver init function over the shared registry, in order,
/// stopping at the first failure. Must be called exactly once, before any
/// other function in this crate.
///
/// # Panics
///
/// Panics if called more than once.
pub fn boot(drivers: &[DriverInit]) -> Result<()> {
    REGISTRY.init(Registry::new());
    let registry = REGISTRY.get();

    for (i, init) in drivers.iter().enumerate() {
        if let Err(err) = init(registry) {
            log::error!("driver #{i} failed to initialize: {err}");
            return Err(err);
        }
        log::debug!("driver #{i} initialized");
    }
    log::info!("boot complete: {} driver(s) registered", drivers.len());
    Ok(())
}

/// Returns a descriptor table bound to the booted registry. Each call
/// returns an independent table with its own open-descriptor state; most
/// runtimes want exactly one, held inside a [`Runtime`].
///
/// # Panics
///
/// Panics if called before [`boot`].
#[must_use]
pub fn open_descriptors() -> Descriptors<'static> {
    DescriptorTable::new(REGISTRY.get())
}

/// The long-lived, per-runtime state built on top of the boot-time
/// singletons: one descriptor table and one tick scheduler.
pub struct Runtime {
    pub descriptors: Descriptors<'static>,
    pub scheduler: TaskScheduler,
    ticks: TickCounter,
}

impl Runtime {
    /// # Panics
    ///
    /// Panics if called before [`boot`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptors: open_descriptors(),
            scheduler: TaskScheduler::new(),
            ticks: TickCounter::new(),
        }
    }

    /// Records one tick having elapsed. Called from the tick source
    /// (typically a timer interrupt handler); never from the run loop.
    pub fn tick(&self) {
        self.ticks.tick();
    }

    /// Drains every tick recorded since the last call and dispatches ready
    /// periodic and deferred tasks. Called once per run-loop iteration.
    pub fn run_scheduler(&mut self) {
        self.scheduler.poll(&self.ticks);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
