#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Reads the Intel Speed Select Technology (SST) configuration of processor packages on Linux.
//!
//! SST lets the platform firmware (the PUNIT) run some processors at higher frequencies than
//! others. Which processors receive the boost depends on the active performance profile and on
//! the class of service (CLOS) each processor is associated with. Software that places work on
//! specific processors can use this information to put its most latency-sensitive work on the
//! fastest processors.
//!
//! The information is obtained from the `/dev/isst_interface` control device created by the
//! Linux `isst_if` driver. The device typically requires elevated privileges to open.
//!
//! # Features
//!
//! For each processor package, the following SST features are decoded into a [`PackageInfo`]:
//!
//! * Performance profile (PP): the available levels, the current level and whether it is locked.
//! * Base frequency (BF): the processors that receive a higher base frequency.
//! * Turbo frequency (TF): whether turbo frequency prioritization is supported and enabled.
//! * Core power (CP): whether CLOS-based prioritization is active and the parameters of each
//!   CLOS slot.
//!
//! The CLOS slot each processor is associated with is available via [`SpeedSelect::clos_id()`].
//!
//! # Example
//!
//! ```
//! use speed_select::SpeedSelect;
//!
//! let sst = SpeedSelect::current();
//!
//! if !sst.is_available() {
//!     println!("SST is not available on this system");
//!     return;
//! }
//!
//! // All the logical processors of the first package.
//! let package_cpus = [0, 1, 2, 3];
//!
//! match sst.package_info(&package_cpus) {
//!     Ok(info) => {
//!         println!("PP level {} of {}", info.pp_current_level, info.pp_max_level);
//!
//!         if info.bf_enabled {
//!             println!("High priority processors: {:?}", info.bf_cores);
//!         }
//!     }
//!     Err(e) => println!("Failed to read SST configuration: {e}"),
//! }
//! ```
//!
//! # Testing
//!
//! With the `test-util` feature enabled, [`SpeedSelect::fake()`] creates a handle backed by a
//! simulated device from the `fake` module, enabling code that consumes SST information to be
//! tested on any system.
//!
//! # Logging
//!
//! Every request sent to the device is logged at the `debug` level via the `tracing` crate.
//! Hardware configurations that prevent parts of a query from being performed are logged at the
//! `info` or `warn` level.

mod bits;
mod clos_assignment;
mod commands;
mod cpu_mapping;
mod error;
mod mailbox;
mod mmio;
mod package_info;
mod package_query;
mod pal;
mod primitive_types;
mod records;
mod speed_select;
mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use error::*;
pub use package_info::*;
pub use primitive_types::*;
pub use speed_select::*;
pub use transport::{DEFAULT_DEVICE_PATH, RequestKind};
