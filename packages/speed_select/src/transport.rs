use std::io;
use std::path::{Path, PathBuf};

use derive_more::Display;

use crate::pal::{Bindings, BindingsFacade};
use crate::{Error, Result};

/// Path of the control device created by the Linux `isst_if` driver.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/isst_interface";

// ioctl request codes from the Linux UAPI header `linux/isst_if.h`.
const ISST_IF_GET_PHY_ID: u32 = 0xc008_fe01;
const ISST_IF_IO_CMD: u32 = 0x4008_fe02;
const ISST_IF_MBOX_COMMAND: u32 = 0xc008_fe03;

/// The kinds of requests that can be sent to the SST control device.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum RequestKind {
    /// Maps a logical processor to its PUNIT core.
    #[display("physical id")]
    PhysicalId,

    /// Sends a mailbox command to the PUNIT.
    #[display("mailbox")]
    Mailbox,

    /// Reads or writes a PUNIT register.
    #[display("register I/O")]
    RegisterIo,
}

impl RequestKind {
    pub(crate) const fn ioctl_request(self) -> u32 {
        match self {
            Self::PhysicalId => ISST_IF_GET_PHY_ID,
            Self::Mailbox => ISST_IF_MBOX_COMMAND,
            Self::RegisterIo => ISST_IF_IO_CMD,
        }
    }

    #[cfg(any(test, feature = "test-util"))]
    pub(crate) const fn from_ioctl_request(request: u32) -> Option<Self> {
        match request {
            ISST_IF_GET_PHY_ID => Some(Self::PhysicalId),
            ISST_IF_MBOX_COMMAND => Some(Self::Mailbox),
            ISST_IF_IO_CMD => Some(Self::RegisterIo),
            _ => None,
        }
    }
}

/// Performs request/response exchanges with the SST control device.
///
/// The device is opened for each exchange and closed again before returning, whether the
/// exchange succeeded or not. No handle is retained between exchanges.
#[derive(Debug)]
pub(crate) struct Transport {
    device_path: PathBuf,
    bindings: BindingsFacade,
}

impl Transport {
    pub(crate) fn new(device_path: PathBuf, bindings: BindingsFacade) -> Self {
        Self {
            device_path,
            bindings,
        }
    }

    pub(crate) fn device_path(&self) -> &Path {
        &self.device_path
    }

    /// Whether the control device exists. No request is sent.
    pub(crate) fn is_available(&self) -> bool {
        match self.bindings.device_exists(&self.device_path) {
            Ok(exists) => {
                if !exists {
                    tracing::debug!(path = %self.device_path.display(), "SST device does not exist");
                }

                exists
            }
            Err(error) => {
                tracing::warn!(
                    path = %self.device_path.display(),
                    %error,
                    "failed to access SST device"
                );
                false
            }
        }
    }

    /// Sends the request held in `payload` and leaves the driver response in the same buffer.
    pub(crate) fn execute(&self, kind: RequestKind, payload: &mut [u8]) -> Result<()> {
        let handle = self
            .bindings
            .open_device(&self.device_path)
            .map_err(|source| Error::DeviceUnavailable {
                path: self.device_path.clone(),
                source,
            })?;

        let handle = scopeguard::guard(handle, |handle| self.bindings.close_device(handle));

        self.bindings
            .ioctl(*handle, kind.ioctl_request(), payload)
            .map_err(|source: io::Error| Error::RequestFailed { kind, source })
    }
}
