//! Fake SST control device for testing.
//!
//! This module simulates the `isst_if` driver and the PUNIT behind it, so code that consumes
//! Speed Select Technology information can be tested on any machine. The fake answers requests
//! from tables of scripted responses and records every exchange for later inspection.
//!
//! Only available when the `test-util` feature is enabled.
//!
//! # Example
//!
//! ```
//! use speed_select::SpeedSelect;
//! use speed_select::fake::FakeDevice;
//!
//! // PP version 2 hardware: nothing beyond the levels info is read.
//! let device = FakeDevice::new().with_mailbox_response(0x7f, 0x00, 0, 0x8000_0002);
//! let sst = SpeedSelect::fake(device.clone());
//!
//! let info = sst.package_info(&[0, 1, 2, 3]).unwrap();
//!
//! assert!(info.pp_supported);
//! assert_eq!(info.pp_version, 2);
//! assert_eq!(device.exchanges().len(), 1);
//! ```
//!
//! # Isolation
//!
//! Each fake device created via [`FakeDevice::new()`] is independent. Clones share state, which
//! is how a test keeps a handle for inspecting the exchanges made by a [`SpeedSelect`][1].
//!
//! [1]: crate::SpeedSelect

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use foldhash::{HashMap, HashMapExt};

use crate::pal::{Bindings, DeviceHandle};
use crate::records::{
    CPU_MAP_BUFFER_SIZE, CpuMapRecord, IO_REG_BUFFER_SIZE, IO_REG_READ, IoRegRecord,
    MAILBOX_BUFFER_SIZE, MailboxRecord, record_count,
};
use crate::{LogicalCpuId, PunitCoreId, RequestKind};

/// One request received by a [`FakeDevice`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Exchange {
    /// A logical processor to PUNIT core mapping request.
    PhysicalId {
        /// The processor being mapped.
        cpu: LogicalCpuId,
    },

    /// A mailbox command.
    Mailbox {
        /// The processor the command was sent through.
        cpu: LogicalCpuId,

        /// Main command code.
        command: u16,

        /// Sub-command code.
        sub_command: u16,

        /// Request data.
        request_data: u32,
    },

    /// A register read.
    RegisterRead {
        /// The processor the read was sent through.
        cpu: LogicalCpuId,

        /// Offset of the register.
        offset: u32,
    },
}

impl Exchange {
    /// The kind of request this exchange was.
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::PhysicalId { .. } => RequestKind::PhysicalId,
            Self::Mailbox { .. } => RequestKind::Mailbox,
            Self::RegisterRead { .. } => RequestKind::RegisterIo,
        }
    }
}

/// A simulated SST control device.
///
/// Requests that have no scripted response fail the same way the driver fails commands that the
/// firmware rejects. The device can also be configured as absent, in which case it cannot be
/// opened at all.
///
/// Mailbox responses and register values are per package: the processor that a request is sent
/// through does not affect the answer.
#[derive(Clone, Debug)]
pub struct FakeDevice {
    state: Arc<Mutex<FakeDeviceState>>,
}

#[derive(Debug)]
struct FakeDeviceState {
    present: bool,

    punit_cores: HashMap<LogicalCpuId, PunitCoreId>,

    // Number of upcoming mapping requests that fail, per processor.
    mapping_failures: HashMap<LogicalCpuId, usize>,

    mailbox_responses: HashMap<(u16, u16, u32), u32>,
    registers: HashMap<u32, u32>,

    exchanges: Vec<Exchange>,

    next_handle: DeviceHandle,
    open_handles: usize,
}

impl Default for FakeDevice {
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder to constructor.
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDevice {
    /// Creates a present device with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeDeviceState {
                present: true,
                punit_cores: HashMap::new(),
                mapping_failures: HashMap::new(),
                mailbox_responses: HashMap::new(),
                registers: HashMap::new(),
                exchanges: Vec::new(),
                next_handle: 100,
                open_handles: 0,
            })),
        }
    }

    /// Creates a device that does not exist, as on systems without SST support.
    #[must_use]
    pub fn absent() -> Self {
        let device = Self::new();
        device.state().present = false;
        device
    }

    /// Maps a logical processor to a PUNIT core.
    #[must_use]
    pub fn with_punit_core(self, cpu: LogicalCpuId, punit_core: PunitCoreId) -> Self {
        self.state().punit_cores.insert(cpu, punit_core);
        self
    }

    /// Makes the next `count` mapping requests for `cpu` fail, even if a mapping is configured.
    #[must_use]
    pub fn with_mapping_failures(self, cpu: LogicalCpuId, count: usize) -> Self {
        self.state().mapping_failures.insert(cpu, count);
        self
    }

    /// Scripts the response data of a mailbox command.
    ///
    /// The command codes are those used by the Linux `intel-speed-select` tool.
    #[must_use]
    pub fn with_mailbox_response(
        self,
        command: u16,
        sub_command: u16,
        request_data: u32,
        response: u32,
    ) -> Self {
        self.state()
            .mailbox_responses
            .insert((command, sub_command, request_data), response);
        self
    }

    /// Scripts the value of a PUNIT register.
    #[must_use]
    pub fn with_register(self, offset: u32, value: u32) -> Self {
        self.state().registers.insert(offset, value);
        self
    }

    /// All requests received so far, in order. Failed requests are included.
    #[must_use]
    pub fn exchanges(&self) -> Vec<Exchange> {
        self.state().exchanges.clone()
    }

    /// The number of requests of a specific kind received so far.
    #[must_use]
    pub fn exchange_count(&self, kind: RequestKind) -> usize {
        self.state()
            .exchanges
            .iter()
            .filter(|exchange| exchange.kind() == kind)
            .count()
    }

    /// The number of device handles that have been opened but not yet closed.
    #[must_use]
    pub fn open_handle_count(&self) -> usize {
        self.state().open_handles
    }

    fn state(&self) -> MutexGuard<'_, FakeDeviceState> {
        self.state
            .lock()
            .expect("poisoned lock indicates we are already panicking")
    }
}

impl FakeDeviceState {
    fn physical_id(&mut self, payload: &mut [u8]) -> io::Result<()> {
        let buffer: &mut [u8; CPU_MAP_BUFFER_SIZE] = single_record(payload)?;
        let mut record = CpuMapRecord::decode(buffer);

        self.exchanges.push(Exchange::PhysicalId {
            cpu: record.logical_cpu,
        });

        if let Some(remaining) = self.mapping_failures.get_mut(&record.logical_cpu) {
            if *remaining > 0 {
                *remaining = remaining.saturating_sub(1);
                return Err(rejected());
            }
        }

        record.physical_cpu = *self
            .punit_cores
            .get(&record.logical_cpu)
            .ok_or_else(rejected)?;

        *buffer = record.encode();
        Ok(())
    }

    fn mailbox(&mut self, payload: &mut [u8]) -> io::Result<()> {
        let buffer: &mut [u8; MAILBOX_BUFFER_SIZE] = single_record(payload)?;
        let mut record = MailboxRecord::decode(buffer);

        self.exchanges.push(Exchange::Mailbox {
            cpu: record.logical_cpu,
            command: record.command,
            sub_command: record.sub_command,
            request_data: record.request_data,
        });

        record.response_data = *self
            .mailbox_responses
            .get(&(record.command, record.sub_command, record.request_data))
            .ok_or_else(rejected)?;

        *buffer = record.encode();
        Ok(())
    }

    fn register_io(&mut self, payload: &mut [u8]) -> io::Result<()> {
        let buffer: &mut [u8; IO_REG_BUFFER_SIZE] = single_record(payload)?;
        let mut record = IoRegRecord::decode(buffer);

        if record.read_write != IO_REG_READ {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "fake SST device does not support register writes",
            ));
        }

        self.exchanges.push(Exchange::RegisterRead {
            cpu: record.logical_cpu,
            offset: record.register,
        });

        record.value = *self.registers.get(&record.register).ok_or_else(rejected)?;

        *buffer = record.encode();
        Ok(())
    }
}

impl Bindings for FakeDevice {
    fn device_exists(&self, _path: &Path) -> io::Result<bool> {
        Ok(self.state().present)
    }

    fn open_device(&self, _path: &Path) -> io::Result<DeviceHandle> {
        let mut state = self.state();

        if !state.present {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }

        let handle = state.next_handle;
        state.next_handle = handle.wrapping_add(1);
        state.open_handles = state
            .open_handles
            .checked_add(1)
            .expect("unrealistic number of open fake device handles");

        Ok(handle)
    }

    fn ioctl(&self, _handle: DeviceHandle, request: u32, payload: &mut [u8]) -> io::Result<()> {
        let mut state = self.state();

        match RequestKind::from_ioctl_request(request) {
            Some(RequestKind::PhysicalId) => state.physical_id(payload),
            Some(RequestKind::Mailbox) => state.mailbox(payload),
            Some(RequestKind::RegisterIo) => state.register_io(payload),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unknown SST ioctl request {request:#x}"),
            )),
        }
    }

    fn close_device(&self, _handle: DeviceHandle) {
        let mut state = self.state();

        state.open_handles = state
            .open_handles
            .checked_sub(1)
            .expect("fake device handle closed more times than it was opened");
    }
}

/// Validates that the request carries exactly one record of the expected size.
fn single_record<const N: usize>(payload: &mut [u8]) -> io::Result<&mut [u8; N]> {
    if record_count(payload) != Some(1) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "fake SST device only accepts single-record requests",
        ));
    }

    payload.try_into().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "request buffer size does not match the record layout",
        )
    })
}

fn rejected() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        "fake SST device has no scripted response for this request",
    )
}
