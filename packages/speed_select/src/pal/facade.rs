#![cfg_attr(coverage_nightly, coverage(off))]

use std::fmt::Debug;
use std::io;
use std::path::Path;
#[cfg(test)]
use std::sync::Arc;

#[cfg(any(test, feature = "test-util"))]
use crate::fake::FakeDevice;
#[cfg(test)]
use crate::pal::MockBindings;
use crate::pal::{Bindings, BuildTargetBindings, DeviceHandle};

/// Enum to hide the real/fake/mock choice behind a single wrapper type.
#[derive(Clone)]
pub(crate) enum BindingsFacade {
    Target(&'static BuildTargetBindings),

    #[cfg(any(test, feature = "test-util"))]
    Fake(FakeDevice),

    #[cfg(test)]
    Mock(Arc<MockBindings>),
}

impl BindingsFacade {
    pub(crate) const fn target() -> Self {
        Self::Target(&BuildTargetBindings)
    }

    #[cfg(any(test, feature = "test-util"))]
    pub(crate) fn from_fake(device: FakeDevice) -> Self {
        Self::Fake(device)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockBindings) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Bindings for BindingsFacade {
    fn device_exists(&self, path: &Path) -> io::Result<bool> {
        match self {
            Self::Target(bindings) => bindings.device_exists(path),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(device) => device.device_exists(path),
            #[cfg(test)]
            Self::Mock(mock) => mock.device_exists(path),
        }
    }

    fn open_device(&self, path: &Path) -> io::Result<DeviceHandle> {
        match self {
            Self::Target(bindings) => bindings.open_device(path),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(device) => device.open_device(path),
            #[cfg(test)]
            Self::Mock(mock) => mock.open_device(path),
        }
    }

    fn ioctl(&self, handle: DeviceHandle, request: u32, payload: &mut [u8]) -> io::Result<()> {
        match self {
            Self::Target(bindings) => bindings.ioctl(handle, request, payload),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(device) => device.ioctl(handle, request, payload),
            #[cfg(test)]
            Self::Mock(mock) => mock.ioctl(handle, request, payload),
        }
    }

    fn close_device(&self, handle: DeviceHandle) {
        match self {
            Self::Target(bindings) => bindings.close_device(handle),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(device) => device.close_device(handle),
            #[cfg(test)]
            Self::Mock(mock) => mock.close_device(handle),
        }
    }
}

impl Debug for BindingsFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target(inner) => inner.fmt(f),
            #[cfg(any(test, feature = "test-util"))]
            Self::Fake(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Mock(inner) => inner.fmt(f),
        }
    }
}
