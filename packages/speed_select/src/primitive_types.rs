/// Identifies a logical processor as seen by the operating system.
///
/// This matches the numeric identifier used by standard operating system tooling (e.g. the
/// `N` in `/sys/devices/system/cpu/cpuN`). Values are not guaranteed to be contiguous.
pub type LogicalCpuId = u32;

/// Identifies a core as numbered by the power management unit (PUNIT) of a processor package.
///
/// PUNIT numbering is package-specific and unrelated to operating system numbering. Hardware
/// threads of the same physical core differ only in the lowest bit, so `id >> 1` identifies the
/// physical core itself.
pub type PunitCoreId = u32;

/// Identifies one of the [`CLOS_COUNT`] class-of-service slots of a processor package.
pub type ClosId = u8;

/// Number of class-of-service (CLOS) slots each processor package exposes.
pub const CLOS_COUNT: usize = 4;
