//! Platform Abstraction Layer (PAL). All communication with the operating system goes through
//! here, so the protocol logic above it can be exercised against mock or fake devices.

mod abstractions;
pub(crate) use abstractions::*;

mod facade;
pub(crate) use facade::*;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub(crate) use linux::*;

// The `isst_if` driver only exists on Linux. Elsewhere the device is simply never available.
#[cfg(not(target_os = "linux"))]
mod fallback;
#[cfg(not(target_os = "linux"))]
pub(crate) use fallback::*;
