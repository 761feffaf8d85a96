use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::pal::{Bindings, DeviceHandle};

/// FFI bindings that target the real operating system that the build is targeting.
///
/// You would only use different bindings in PAL unit tests that need to use mock bindings.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetBindings;

// Real OS bindings are excluded from coverage measurement because the driver they talk to only
// exists on machines with SST-capable processors, which test systems generally are not.
#[cfg_attr(coverage_nightly, coverage(off))]
impl Bindings for BuildTargetBindings {
    fn device_exists(&self, path: &Path) -> io::Result<bool> {
        path.try_exists()
    }

    fn open_device(&self, path: &Path) -> io::Result<DeviceHandle> {
        let path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: No safety requirements beyond passing a valid NUL-terminated path.
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY | libc::O_CLOEXEC) };

        if fd < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(fd)
        }
    }

    #[allow(
        clippy::cast_lossless,
        clippy::cast_possible_wrap,
        reason = "the ioctl request type is c_ulong on glibc and c_int on musl; the kernel treats it as 32 bits either way"
    )]
    fn ioctl(&self, handle: DeviceHandle, request: u32, payload: &mut [u8]) -> io::Result<()> {
        // SAFETY: The payload is a live, exclusively borrowed buffer sized for the record that
        // the request code describes, so the driver only reads and writes within its bounds.
        let result =
            unsafe { libc::ioctl(handle, request as libc::Ioctl, payload.as_mut_ptr()) };

        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn close_device(&self, handle: DeviceHandle) {
        // Nothing useful can be done if closing fails, the handle is gone either way.
        // SAFETY: The handle came from `open_device()` and is closed exactly once.
        _ = unsafe { libc::close(handle) };
    }
}
