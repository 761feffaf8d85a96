use std::fmt::Debug;
use std::io;
use std::path::Path;

/// An open handle to the SST control device, valid until passed to [`Bindings::close_device()`].
pub(crate) type DeviceHandle = i32;

/// Bindings for the operating system calls used to talk to the `isst_if` driver.
///
/// All PAL FFI calls must go through this trait, enabling them to be mocked.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Bindings: Debug + Send + Sync + 'static {
    /// Whether anything exists at `path`. Does not attempt to open it.
    fn device_exists(&self, path: &Path) -> io::Result<bool>;

    /// Opens the control device for issuing ioctls.
    fn open_device(&self, path: &Path) -> io::Result<DeviceHandle>;

    /// Issues one ioctl on an open device. The driver reads the request from `payload` and
    /// writes the response back into the same buffer.
    fn ioctl(&self, handle: DeviceHandle, request: u32, payload: &mut [u8]) -> io::Result<()>;

    /// Closes a handle returned by [`open_device()`][Bindings::open_device].
    fn close_device(&self, handle: DeviceHandle);
}
