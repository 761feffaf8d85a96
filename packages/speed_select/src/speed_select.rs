//! Public handle to the SST control device, supporting both the real device and a fake one.
//!
//! All queries flow from a `SpeedSelect` instance. Each instance owns its own processor mapping
//! cache, so fake instances used by parallel tests do not interfere with each other or with the
//! real device.

use std::any::type_name;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::clos_assignment::query_clos_id;
use crate::cpu_mapping::CpuMappingCache;
#[cfg(any(test, feature = "test-util"))]
use crate::fake::FakeDevice;
use crate::package_query::query_package_info;
use crate::pal::BindingsFacade;
use crate::transport::Transport;
use crate::{ClosId, DEFAULT_DEVICE_PATH, Error, LogicalCpuId, PackageInfo, PunitCoreId};

/// Handle to the device at the default path, initialized on first access.
static CURRENT: OnceLock<SpeedSelect> = OnceLock::new();

/// Handle to the Intel Speed Select Technology (SST) control device.
///
/// Use [`SpeedSelect::current()`] for the device at the default path or
/// [`SpeedSelect::builder()`] to customize the handle. Clones are cheap and share the processor
/// mapping cache.
///
/// The device is not opened until a query is made. Systems without SST support (or without the
/// `isst_if` driver) are detected via [`SpeedSelect::is_available()`] or by checking query
/// errors with [`Error::is_device_unavailable()`].
///
/// # Example
///
/// ```
/// use speed_select::SpeedSelect;
///
/// let sst = SpeedSelect::current();
///
/// match sst.package_info(&[0]) {
///     Ok(info) => println!("SST PP version {}", info.pp_version),
///     Err(e) if e.is_device_unavailable() => println!("SST is not available"),
///     Err(e) => println!("SST query failed: {e}"),
/// }
/// ```
#[derive(Clone)]
pub struct SpeedSelect {
    inner: Arc<SpeedSelectInner>,
}

struct SpeedSelectInner {
    transport: Transport,
    cpu_mapping: CpuMappingCache,
}

impl SpeedSelect {
    /// Returns a handle to the SST control device at the default path.
    ///
    /// The instance is initialized on first access and reused thereafter.
    #[must_use]
    pub fn current() -> &'static Self {
        CURRENT.get_or_init(|| Self::builder().build())
    }

    /// Starts building a handle with custom settings.
    ///
    /// # Example
    ///
    /// ```
    /// use speed_select::SpeedSelect;
    ///
    /// let sst = SpeedSelect::builder()
    ///     .device_path("/dev/isst_interface")
    ///     .build();
    ///
    /// println!("SST available: {}", sst.is_available());
    /// ```
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Trivial forwarder to builder.
    pub fn builder() -> SpeedSelectBuilder {
        SpeedSelectBuilder::new()
    }

    /// Creates a handle backed by a fake device, for testing code that consumes SST state.
    ///
    /// This method is only available when the `test-util` feature is enabled. The fake device
    /// is shared with the caller's clones of it, which can be used to inspect the requests made.
    #[cfg(any(test, feature = "test-util"))]
    #[must_use]
    pub fn fake(device: FakeDevice) -> Self {
        Self::from_parts(
            PathBuf::from(DEFAULT_DEVICE_PATH),
            BindingsFacade::from_fake(device),
        )
    }

    fn from_parts(device_path: PathBuf, bindings: BindingsFacade) -> Self {
        Self {
            inner: Arc::new(SpeedSelectInner {
                transport: Transport::new(device_path, bindings),
                cpu_mapping: CpuMappingCache::new(),
            }),
        }
    }

    /// Path of the SST control device used by this handle.
    #[must_use]
    pub fn device_path(&self) -> &Path {
        self.inner.transport.device_path()
    }

    /// Whether the SST control device exists. No request is sent to the device.
    ///
    /// A device that exists may still reject requests, for example due to missing permissions.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.inner.transport.is_available()
    }

    /// Reads the SST state of one processor package.
    ///
    /// `cpus` must list the logical processors that belong to the package. Commands are sent
    /// through the lowest-numbered one and the full list is used to report which processors
    /// receive a higher base frequency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoProcessors`] if `cpus` is empty, otherwise [`Error::QueryFailed`]
    /// identifying the step that failed. No partial result is returned.
    pub fn package_info(&self, cpus: &[LogicalCpuId]) -> Result<PackageInfo, Error> {
        query_package_info(&self.inner.transport, &self.inner.cpu_mapping, cpus)
    }

    /// Reads the class-of-service slot that a logical processor is associated with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryFailed`] if the processor cannot be mapped to its PUNIT core or
    /// the association register cannot be read.
    pub fn clos_id(&self, cpu: LogicalCpuId) -> Result<ClosId, Error> {
        query_clos_id(&self.inner.transport, &self.inner.cpu_mapping, cpu)
    }

    /// Reads the class-of-service slot of each of the given logical processors, in order.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failure, as [`SpeedSelect::clos_id()`] would.
    pub fn clos_ids(&self, cpus: &[LogicalCpuId]) -> Result<Vec<ClosId>, Error> {
        cpus.iter().map(|&cpu| self.clos_id(cpu)).collect()
    }

    /// Returns the PUNIT core that a logical processor maps to.
    ///
    /// The result is cached for the lifetime of this handle and its clones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MappingFailed`] if the driver cannot map the processor.
    pub fn punit_core_id(&self, cpu: LogicalCpuId) -> Result<PunitCoreId, Error> {
        self.inner
            .cpu_mapping
            .resolve(&self.inner.transport, cpu)
    }
}

// We have no API contract for the Debug output format.
#[cfg_attr(coverage_nightly, coverage(off))]
impl std::fmt::Debug for SpeedSelect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("transport", &self.inner.transport)
            .field("cpu_mapping", &self.inner.cpu_mapping)
            .finish()
    }
}

/// Builds a [`SpeedSelect`] handle with custom settings.
///
/// Obtain one via [`SpeedSelect::builder()`].
#[derive(Clone, Debug)]
#[must_use]
pub struct SpeedSelectBuilder {
    device_path: PathBuf,
}

impl SpeedSelectBuilder {
    fn new() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
        }
    }

    /// Sets the path of the SST control device. Defaults to [`DEFAULT_DEVICE_PATH`].
    pub fn device_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.device_path = path.into();
        self
    }

    /// Creates the handle. The device is not accessed until the first query.
    pub fn build(self) -> SpeedSelect {
        SpeedSelect::from_parts(self.device_path, BindingsFacade::target())
    }
}
