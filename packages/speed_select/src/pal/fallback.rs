use std::io;
use std::path::Path;

use crate::pal::{Bindings, DeviceHandle};

/// Bindings for platforms without the `isst_if` driver. The control device never exists.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetBindings;

impl Bindings for BuildTargetBindings {
    fn device_exists(&self, _path: &Path) -> io::Result<bool> {
        Ok(false)
    }

    fn open_device(&self, _path: &Path) -> io::Result<DeviceHandle> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    fn ioctl(&self, _handle: DeviceHandle, _request: u32, _payload: &mut [u8]) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    fn close_device(&self, _handle: DeviceHandle) {}
}
