use std::io;
use std::path::PathBuf;

use derive_more::Display;
use thiserror::Error;

use crate::{ClosId, LogicalCpuId, RequestKind};

/// Errors that can occur when querying Speed Select Technology state from the hardware.
///
/// Of these, only [`Error::DeviceUnavailable`] is expected in normal operation: it is how a
/// system without SST support (or without the `isst_if` driver loaded) presents itself. Use
/// [`Error::is_device_unavailable()`] to detect it, as it is usually wrapped in another variant
/// that identifies the operation that was attempted.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The SST control device could not be opened.
    #[error("SST control device {} is not available", path.display())]
    DeviceUnavailable {
        /// Path of the control device that we attempted to open.
        path: PathBuf,

        /// Why opening the device failed.
        #[source]
        source: io::Error,
    },

    /// The driver rejected a request sent to the SST control device.
    #[error("{kind} request to the SST control device failed")]
    RequestFailed {
        /// Which kind of request failed.
        kind: RequestKind,

        /// The error reported by the driver.
        #[source]
        source: io::Error,
    },

    /// A mailbox command sent to the PUNIT failed.
    #[error(
        "mailbox command {command:#04x}/{sub_command:#04x} with data {request_data:#x} failed on processor {cpu}"
    )]
    MailboxCommandFailed {
        /// The logical processor the command was sent through.
        cpu: LogicalCpuId,

        /// Main command code.
        command: u16,

        /// Sub-command code.
        sub_command: u16,

        /// Request data sent along with the command.
        request_data: u32,

        /// The underlying transport failure.
        #[source]
        source: Box<Self>,
    },

    /// A PUNIT register read failed.
    #[error("read of PUNIT register {offset:#x} failed on processor {cpu}")]
    MmioCommandFailed {
        /// The logical processor the read was sent through.
        cpu: LogicalCpuId,

        /// Offset of the register that was read.
        offset: u32,

        /// The underlying transport failure.
        #[source]
        source: Box<Self>,
    },

    /// Resolving the PUNIT core of a logical processor failed.
    #[error("failed to map processor {cpu} to its PUNIT core")]
    MappingFailed {
        /// The logical processor that could not be mapped.
        cpu: LogicalCpuId,

        /// The underlying transport failure.
        #[source]
        source: Box<Self>,
    },

    /// A step of a multi-command query failed, aborting the whole query.
    #[error("failed to read SST {step}")]
    QueryFailed {
        /// The step of the query that failed.
        step: QueryStep,

        /// Why the step failed.
        #[source]
        source: Box<Self>,
    },

    /// A package query was attempted with an empty set of processors.
    #[error("a package query requires at least one processor")]
    NoProcessors,
}

impl Error {
    /// Whether this error, or any error it wraps, means that the SST control device is absent
    /// or inaccessible.
    ///
    /// Callers typically treat this as "SST is not supported here" rather than as a failure.
    #[must_use]
    pub fn is_device_unavailable(&self) -> bool {
        match self {
            Self::DeviceUnavailable { .. } => true,
            Self::MailboxCommandFailed { source, .. }
            | Self::MmioCommandFailed { source, .. }
            | Self::MappingFailed { source, .. }
            | Self::QueryFailed { source, .. } => source.is_device_unavailable(),
            Self::RequestFailed { .. } | Self::NoProcessors => false,
        }
    }

    pub(crate) fn query_failed(step: QueryStep) -> impl FnOnce(Self) -> Self {
        move |source| Self::QueryFailed {
            step,
            source: Box::new(source),
        }
    }
}

/// Identifies the step of a package or processor query that failed.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum QueryStep {
    /// Reading the performance profile levels info.
    #[display("performance profile levels")]
    PerformanceProfileLevels,

    /// Reading the control state of the current performance profile level.
    #[display("performance profile control")]
    TdpControl,

    /// Mapping the package processors to PUNIT cores for base frequency decoding.
    #[display("base frequency core mapping")]
    BaseFrequencyCoreMapping,

    /// Reading one 32-core batch of the base frequency priority core mask.
    #[display("base frequency core mask (batch {batch})")]
    BaseFrequencyCoreMask {
        /// Index of the batch, each covering 32 PUNIT core pairs.
        batch: u32,
    },

    /// Reading the core power feature state.
    #[display("core power feature state")]
    CorePowerFeature,

    /// Reading the class-of-service QoS configuration.
    #[display("CLOS QoS configuration")]
    ClosQosConfig,

    /// Reading the tuning parameters of one class-of-service slot.
    #[display("CLOS {clos} parameters")]
    ClosParameters {
        /// The slot being read.
        clos: ClosId,
    },

    /// Reading the class-of-service slot assigned to a processor.
    #[display("CLOS association of processor {cpu}")]
    ClosAssociation {
        /// The processor whose association was being read.
        cpu: LogicalCpuId,
    },
}

/// A specialized `Result` type for SST operations, returning the crate's [`Error`] type as the
/// error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
