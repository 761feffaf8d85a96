use std::collections::BTreeSet;

use crate::bits::{extract_u8, is_bit_set};
use crate::{CLOS_COUNT, ClosId, LogicalCpuId};

/// How the core power feature arbitrates between classes of service.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "mirroring the single-bit encoding used by the hardware"
)]
pub enum PriorityMode {
    /// Frequency is distributed in proportion to the priority of each class of service.
    #[default]
    Proportional,

    /// Classes of service are served strictly in order of priority.
    Ordered,
}

impl PriorityMode {
    pub(crate) fn from_bit(set: bool) -> Self {
        if set { Self::Ordered } else { Self::Proportional }
    }
}

/// Tuning parameters of one class-of-service (CLOS) slot.
///
/// Frequencies are expressed in the ratio units used by the hardware (typically 100 MHz).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub struct ClosInfo {
    /// Energy performance preference.
    pub epp: u8,

    /// Relative weight used when the priority mode is [`PriorityMode::Proportional`].
    pub proportional_priority: u8,

    /// Minimum frequency ratio.
    pub min_frequency: u8,

    /// Maximum frequency ratio.
    pub max_frequency: u8,

    /// Desired frequency ratio.
    pub desired_frequency: u8,
}

impl ClosInfo {
    /// Decodes the `PM_CLOS` register of one slot.
    pub(crate) fn from_register(value: u32) -> Self {
        Self {
            epp: extract_u8(value, 0, 3),
            proportional_priority: extract_u8(value, 4, 7),
            min_frequency: extract_u8(value, 8, 15),
            max_frequency: extract_u8(value, 16, 23),
            desired_frequency: extract_u8(value, 24, 31),
        }
    }
}

/// Snapshot of the Speed Select Technology state of one processor package.
///
/// The performance profile (PP) fields are always populated. All other fields are only read
/// from the hardware when PP version is at least 3; on older hardware they keep their default
/// values. Similarly, feature-specific fields keep their defaults when the feature is not
/// supported.
///
/// The snapshot is not updated after creation; query again to observe changes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct PackageInfo {
    /// Whether the performance profile feature is supported.
    pub pp_supported: bool,

    /// Whether the performance profile level is locked against changes.
    pub pp_locked: bool,

    /// Version of the performance profile interface.
    pub pp_version: u8,

    /// The currently active performance profile level.
    pub pp_current_level: u8,

    /// The highest available performance profile level.
    pub pp_max_level: u8,

    /// Whether the core power feature is supported.
    pub cp_supported: bool,

    /// Whether the core power feature is enabled.
    pub cp_enabled: bool,

    /// How core power arbitrates between classes of service.
    pub cp_priority: PriorityMode,

    /// Whether the base frequency feature is supported at the current level.
    pub bf_supported: bool,

    /// Whether the base frequency feature is enabled at the current level.
    pub bf_enabled: bool,

    /// The processors that receive a higher base frequency when the base frequency feature
    /// is enabled. Empty if the feature is not supported.
    pub bf_cores: BTreeSet<LogicalCpuId>,

    /// Whether the turbo frequency feature is supported at the current level.
    pub tf_supported: bool,

    /// Whether the turbo frequency feature is enabled at the current level.
    pub tf_enabled: bool,

    /// Tuning parameters of each class-of-service slot, indexed by [`ClosId`].
    ///
    /// Only meaningful if `cp_supported` is true.
    pub clos: [ClosInfo; CLOS_COUNT],
}

impl PackageInfo {
    /// Returns the tuning parameters of a class-of-service slot, or `None` if the slot does
    /// not exist.
    ///
    /// # Example
    ///
    /// ```
    /// use speed_select::PackageInfo;
    ///
    /// let info = PackageInfo::default();
    ///
    /// assert!(info.clos_info(3).is_some());
    /// assert!(info.clos_info(4).is_none());
    /// ```
    #[must_use]
    pub fn clos_info(&self, clos: ClosId) -> Option<&ClosInfo> {
        self.clos.get(usize::from(clos))
    }

    /// Decodes the response to the `CONFIG_TDP`/`GET_LEVELS_INFO` mailbox command.
    pub(crate) fn decode_levels_info(&mut self, response: u32) {
        self.pp_supported = is_bit_set(response, 31);
        self.pp_locked = is_bit_set(response, 24);
        self.pp_current_level = extract_u8(response, 16, 23);
        self.pp_max_level = extract_u8(response, 8, 15);
        self.pp_version = extract_u8(response, 0, 7);
    }

    /// Decodes the response to the `CONFIG_TDP`/`GET_TDP_CONTROL` mailbox command.
    pub(crate) fn decode_tdp_control(&mut self, response: u32) {
        self.bf_supported = is_bit_set(response, 1);
        self.bf_enabled = is_bit_set(response, 17);

        self.tf_supported = is_bit_set(response, 0);
        self.tf_enabled = is_bit_set(response, 16);
    }

    /// Decodes the response to the `READ_PM_CONFIG`/`PM_FEATURE` mailbox command.
    pub(crate) fn decode_pm_feature(&mut self, response: u32) {
        self.cp_supported = is_bit_set(response, 0);
        self.cp_enabled = is_bit_set(response, 16);
    }
}
