//! The framework's typed error taxonomy and its bounded-integer status codes.
//!
//! Every fallible operation in the workspace returns `Result<T, Error>`.
//! `Error::code` recovers the small negative integer applications and FFI
//! boundaries see, matching the historical `NONE`/`INVALID`/... contract.

#![cfg_attr(not(test), no_std)]

/// Framework error taxonomy.
///
/// Each variant belongs to exactly one of the kinds described by the
/// error-handling design: argument errors, resource-exhaustion errors,
/// absence errors, state errors, and dispatch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A malformed argument: a bad `whence`, a null callback, an
    /// out-of-range register count, and so on.
    #[error("invalid argument")]
    InvalidArgument,
    /// A descriptor outside `[RESERVED, CAPACITY)`, or not currently open.
    #[error("descriptor {0} is out of range or not open")]
    InvalidDescriptor(i32),
    /// A `lseek` target that falls outside `[0, dev_size]`.
    #[error("seek target is out of bounds")]
    InvalidSeek,
    /// A Modbus register count outside the valid range for its function.
    #[error("register count is out of range for this function")]
    InvalidRegisterCount,
    /// The descriptor table has no free slot.
    #[error("descriptor table is full")]
    DescriptorTableFull,
    /// The driver registry has no free slot.
    #[error("driver registry is full")]
    RegistryFull,
    /// The Modbus master's request queue has no free slot.
    #[error("request queue is full")]
    RequestQueueFull,
    /// The scheduler's deferred-task pool has no free slot.
    #[error("deferred task pool is full")]
    DeferredPoolFull,
    /// The scheduler's periodic-task table has no free slot.
    #[error("periodic task table is full")]
    SchedulerFull,
    /// No device is registered under the requested name.
    #[error("no device registered under this name")]
    NotExist,
    /// A name or resource is already in use.
    #[error("already registered or already in use")]
    Occupied,
    /// The device is closed, or was never opened.
    #[error("device is closed or unavailable")]
    Unavailable,
    /// The vtable operation required for this call is absent.
    #[error("device does not implement this operation")]
    Exception,
}

/// Bounded integer status codes exposed to applications.
pub mod code {
    /// Operation succeeded.
    pub const NONE: i32 = 0;
    /// [`super::Error::InvalidArgument`], [`super::Error::InvalidDescriptor`],
    /// [`super::Error::InvalidSeek`], and [`super::Error::InvalidRegisterCount`].
    pub const INVALID: i32 = -1;
    /// [`super::Error::DescriptorTableFull`], [`super::Error::RegistryFull`],
    /// [`super::Error::RequestQueueFull`], and [`super::Error::DeferredPoolFull`].
    pub const OVERFLOW: i32 = -2;
    /// [`super::Error::Unavailable`].
    pub const UNAVAILABLE: i32 = -3;
    /// [`super::Error::Exception`].
    pub const EXCEPTION: i32 = -4;
    /// [`super::Error::Occupied`].
    pub const OCCUPIED: i32 = -5;
    /// [`super::Error::NotExist`].
    pub const NOT_EXIST: i32 = -6;
}

impl Error {
    /// The bounded integer code exposed to applications.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::InvalidArgument
            | Self::InvalidDescriptor(_)
            | Self::InvalidSeek
            | Self::InvalidRegisterCount => code::INVALID,
            Self::DescriptorTableFull
            | Self::RegistryFull
            | Self::RequestQueueFull
            | Self::DeferredPoolFull
            | Self::SchedulerFull => code::OVERFLOW,
            Self::NotExist => code::NOT_EXIST,
            Self::Occupied => code::OCCUPIED,
            Self::Unavailable => code::UNAVAILABLE,
            Self::Exception => code::EXCEPTION,
        }
    }
}

/// The framework's `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Modbus application-level exception codes, returned in the PDU of an
/// exception response (`func | 0x80`, code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModbusException {
    /// No exception (never placed on the wire).
    None = 0,
    /// Unsupported function code.
    IllegalFunction = 1,
    /// Register address outside any configured work entry.
    IllegalRegisterAddress = 2,
    /// Register count invalid, or payload length mismatched the header.
    IllegalData = 3,
    /// The device-specific handler failed.
    DeviceFailure = 4,
    /// The request is still being processed.
    Pending = 5,
    /// The device is busy and cannot service the request right now.
    Busy = 6,
}

impl ModbusException {
    /// The single-byte exception code transmitted on the wire.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}
