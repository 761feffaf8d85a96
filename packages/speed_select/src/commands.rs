//! PUNIT mailbox command codes and register offsets, as used by the Linux `intel-speed-select`
//! tool (`tools/power/x86/intel-speed-select/isst.h`).

// Performance profile (TDP) commands.
pub(crate) const CONFIG_TDP: u16 = 0x7f;
pub(crate) const CONFIG_TDP_GET_LEVELS_INFO: u16 = 0x00;
pub(crate) const CONFIG_TDP_GET_TDP_CONTROL: u16 = 0x01;
pub(crate) const CONFIG_TDP_PBF_GET_CORE_MASK_INFO: u16 = 0x20;

// Class-of-service commands.
pub(crate) const CONFIG_CLOS: u16 = 0xd0;
pub(crate) const CLOS_PM_QOS_CONFIG: u16 = 0x02;

// Power management commands.
pub(crate) const READ_PM_CONFIG: u16 = 0x94;
pub(crate) const PM_FEATURE: u16 = 0x03;

// Register offsets for register I/O requests.
pub(crate) const PM_CLOS_OFFSET: u32 = 0x08;
pub(crate) const PQR_ASSOC_OFFSET: u32 = 0x20;
