use std::collections::BTreeSet;

use foldhash::{HashMap, HashMapExt};

use crate::bits::is_bit_set;
use crate::commands::{
    CLOS_PM_QOS_CONFIG, CONFIG_CLOS, CONFIG_TDP, CONFIG_TDP_GET_LEVELS_INFO,
    CONFIG_TDP_GET_TDP_CONTROL, CONFIG_TDP_PBF_GET_CORE_MASK_INFO, PM_CLOS_OFFSET, PM_FEATURE,
    READ_PM_CONFIG,
};
use crate::cpu_mapping::CpuMappingCache;
use crate::mailbox::send_mailbox;
use crate::mmio::send_mmio;
use crate::transport::Transport;
use crate::{ClosInfo, Error, LogicalCpuId, PackageInfo, PriorityMode, QueryStep, Result};

/// Oldest performance profile interface version whose feature state we know how to read.
const MIN_PP_VERSION: u8 = 3;

/// Number of PUNIT core pairs covered by one base frequency core mask response.
const CORE_PAIRS_PER_MASK: u32 = 32;

/// Reads the SST state of the package that the given processors belong to.
///
/// All commands are sent through the lowest-numbered processor. The full processor list is
/// only used to translate the base frequency core masks back into logical processors.
pub(crate) fn query_package_info(
    transport: &Transport,
    cache: &CpuMappingCache,
    cpus: &[LogicalCpuId],
) -> Result<PackageInfo> {
    let cpu = *cpus.iter().min().ok_or(Error::NoProcessors)?;

    let mut info = PackageInfo::default();

    let response = send_mailbox(transport, cpu, CONFIG_TDP, CONFIG_TDP_GET_LEVELS_INFO, 0)
        .map_err(Error::query_failed(QueryStep::PerformanceProfileLevels))?;
    info.decode_levels_info(response);

    if info.pp_version < MIN_PP_VERSION {
        tracing::info!(
            cpu,
            version = info.pp_version,
            "SST PP version {} is not supported, only PP levels are available",
            info.pp_version
        );
        return Ok(info);
    }

    let level = u32::from(info.pp_current_level);

    if info.pp_supported {
        let response = send_mailbox(transport, cpu, CONFIG_TDP, CONFIG_TDP_GET_TDP_CONTROL, level)
            .map_err(Error::query_failed(QueryStep::TdpControl))?;
        info.decode_tdp_control(response);
    }

    if info.bf_supported {
        info.bf_cores = query_bf_cores(transport, cache, cpu, level, cpus)?;
    }

    let response = send_mailbox(transport, cpu, READ_PM_CONFIG, PM_FEATURE, 0)
        .map_err(Error::query_failed(QueryStep::CorePowerFeature))?;
    info.decode_pm_feature(response);

    if info.cp_supported {
        let response = send_mailbox(transport, cpu, CONFIG_CLOS, CLOS_PM_QOS_CONFIG, 0)
            .map_err(Error::query_failed(QueryStep::ClosQosConfig))?;

        let clos_enabled = is_bit_set(response, 1);

        if clos_enabled != info.cp_enabled {
            tracing::warn!(
                cpu,
                pm_feature = info.cp_enabled,
                qos_config = clos_enabled,
                "SST CP enabled state differs between PM feature and CLOS QoS config, using CLOS QoS config"
            );
        }

        info.cp_enabled = clos_enabled;
        info.cp_priority = PriorityMode::from_bit(is_bit_set(response, 2));

        for (clos, slot) in (0..).zip(info.clos.iter_mut()) {
            let offset = (u32::from(clos) << 2) + PM_CLOS_OFFSET;

            let value = send_mmio(transport, cpu, offset)
                .map_err(Error::query_failed(QueryStep::ClosParameters { clos }))?;

            *slot = ClosInfo::from_register(value);
        }
    }

    Ok(info)
}

/// Collects the processors whose core pair is marked in the base frequency core masks.
///
/// Each mask response covers 32 core pairs. Enough batches are requested to cover the highest
/// core pair among the given processors.
fn query_bf_cores(
    transport: &Transport,
    cache: &CpuMappingCache,
    cpu: LogicalCpuId,
    level: u32,
    cpus: &[LogicalCpuId],
) -> Result<BTreeSet<LogicalCpuId>> {
    let mut cpus_by_core_pair: HashMap<u32, Vec<LogicalCpuId>> = HashMap::new();
    let mut max_core_pair = 0;

    for &package_cpu in cpus {
        let punit_core = cache
            .resolve(transport, package_cpu)
            .map_err(Error::query_failed(QueryStep::BaseFrequencyCoreMapping))?;

        let core_pair = punit_core >> 1;

        cpus_by_core_pair
            .entry(core_pair)
            .or_default()
            .push(package_cpu);
        max_core_pair = max_core_pair.max(core_pair);
    }

    // The shift above guarantees the increment cannot overflow.
    let batch_count = (max_core_pair + 1).div_ceil(CORE_PAIRS_PER_MASK);

    let mut bf_cores = BTreeSet::new();

    for batch in 0..batch_count {
        let mask = send_mailbox(
            transport,
            cpu,
            CONFIG_TDP,
            CONFIG_TDP_PBF_GET_CORE_MASK_INFO,
            level | (batch << 8),
        )
        .map_err(Error::query_failed(QueryStep::BaseFrequencyCoreMask { batch }))?;

        for bit in (0..CORE_PAIRS_PER_MASK).filter(|&bit| is_bit_set(mask, bit)) {
            let core_pair = batch * CORE_PAIRS_PER_MASK + bit;

            if let Some(pair_cpus) = cpus_by_core_pair.get(&core_pair) {
                bf_cores.extend(pair_cpus.iter().copied());
            }
        }
    }

    Ok(bf_cores)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::fake::{Exchange, FakeDevice};
    use crate::pal::BindingsFacade;
    use crate::{DEFAULT_DEVICE_PATH, RequestKind};

    // PP supported, level 1 of 4, version 3.
    const LEVELS_V3: u32 = 0x8001_0403;

    // BF and TF supported, BF enabled.
    const TDP_CONTROL_BF_TF: u32 = 0x0002_0003;

    // CP supported and enabled.
    const PM_FEATURE_CP_ENABLED: u32 = 0x0001_0001;

    // CLOS enabled, ordered priority.
    const QOS_ENABLED_ORDERED: u32 = 0b110;

    fn transport(device: &FakeDevice) -> Transport {
        Transport::new(
            PathBuf::from(DEFAULT_DEVICE_PATH),
            BindingsFacade::from_fake(device.clone()),
        )
    }

    fn query(device: &FakeDevice, cpus: &[LogicalCpuId]) -> Result<PackageInfo> {
        query_package_info(&transport(device), &CpuMappingCache::new(), cpus)
    }

    fn mailbox(command: u16, sub_command: u16, request_data: u32) -> Exchange {
        Exchange::Mailbox {
            cpu: 0,
            command,
            sub_command,
            request_data,
        }
    }

    /// A package with every feature supported: 4 processors on PUNIT cores 0-3 (core pairs 0
    /// and 1), of which core pair 1 has the higher base frequency.
    fn full_featured_device() -> FakeDevice {
        let mut device = FakeDevice::new()
            .with_mailbox_response(CONFIG_TDP, CONFIG_TDP_GET_LEVELS_INFO, 0, LEVELS_V3)
            .with_mailbox_response(CONFIG_TDP, CONFIG_TDP_GET_TDP_CONTROL, 1, TDP_CONTROL_BF_TF)
            .with_mailbox_response(CONFIG_TDP, CONFIG_TDP_PBF_GET_CORE_MASK_INFO, 1, 0b10)
            .with_mailbox_response(READ_PM_CONFIG, PM_FEATURE, 0, PM_FEATURE_CP_ENABLED)
            .with_mailbox_response(CONFIG_CLOS, CLOS_PM_QOS_CONFIG, 0, QOS_ENABLED_ORDERED);

        for cpu in 0..4 {
            device = device.with_punit_core(cpu, cpu);
        }

        for clos in 0..4_u32 {
            // epp = clos, min = 8 + clos, max = 30, desired = 20
            let value = 0x141e_0800 | (clos << 8) | clos;
            device = device.with_register((clos << 2) + PM_CLOS_OFFSET, value);
        }

        device
    }

    #[test]
    fn empty_processor_list_is_rejected() {
        let device = FakeDevice::new();

        let error = query(&device, &[]).unwrap_err();

        assert!(matches!(error, Error::NoProcessors));
        assert!(device.exchanges().is_empty());
    }

    #[test]
    fn old_version_stops_after_levels() {
        // Supported, locked, level 5 of 10, version 2.
        let device = FakeDevice::new().with_mailbox_response(
            CONFIG_TDP,
            CONFIG_TDP_GET_LEVELS_INFO,
            0,
            0x8105_0a02,
        );

        let info = query(&device, &[0, 1]).unwrap();

        assert!(info.pp_supported);
        assert!(info.pp_locked);
        assert_eq!(info.pp_current_level, 5);
        assert_eq!(info.pp_max_level, 10);
        assert_eq!(info.pp_version, 2);

        assert!(!info.bf_supported);
        assert!(!info.tf_supported);
        assert!(!info.cp_supported);
        assert!(info.bf_cores.is_empty());
        assert_eq!(info.clos, PackageInfo::default().clos);

        assert_eq!(
            device.exchanges(),
            vec![mailbox(CONFIG_TDP, CONFIG_TDP_GET_LEVELS_INFO, 0)]
        );
        assert_eq!(device.open_handle_count(), 0);
    }

    #[test]
    fn full_query() {
        let device = full_featured_device();

        let info = query(&device, &[3, 2, 1, 0]).unwrap();

        assert!(info.pp_supported);
        assert!(!info.pp_locked);
        assert_eq!(info.pp_current_level, 1);
        assert_eq!(info.pp_max_level, 4);
        assert_eq!(info.pp_version, 3);

        assert!(info.bf_supported);
        assert!(info.bf_enabled);
        assert!(info.tf_supported);
        assert!(!info.tf_enabled);
        assert_eq!(info.bf_cores, BTreeSet::from([2, 3]));

        assert!(info.cp_supported);
        assert!(info.cp_enabled);
        assert_eq!(info.cp_priority, PriorityMode::Ordered);

        for (clos, clos_info) in (0_u8..).zip(info.clos.iter()) {
            assert_eq!(clos_info.epp, clos);
            assert_eq!(clos_info.min_frequency, 8 + clos);
            assert_eq!(clos_info.max_frequency, 30);
            assert_eq!(clos_info.desired_frequency, 20);
        }

        assert_eq!(device.exchange_count(RequestKind::Mailbox), 5);
        assert_eq!(device.exchange_count(RequestKind::PhysicalId), 4);
        assert_eq!(device.exchange_count(RequestKind::RegisterIo), 4);
        assert_eq!(device.open_handle_count(), 0);
    }

    #[test]
    fn commands_go_through_lowest_processor() {
        let device = full_featured_device();

        query(&device, &[2, 0, 3, 1]).unwrap();

        for exchange in device.exchanges() {
            match exchange {
                Exchange::Mailbox { cpu, .. } | Exchange::RegisterRead { cpu, .. } => {
                    assert_eq!(cpu, 0);
                }
                _ => {}
            }
        }
    }

    #[test]
    fn tdp_control_uses_current_level() {
        // Supported, level 5 of 10, version 3. Nothing else supported.
        let device = FakeDevice::new()
            .with_mailbox_response(CONFIG_TDP, CONFIG_TDP_GET_LEVELS_INFO, 0, 0x8005_0a03)
            .with_mailbox_response(CONFIG_TDP, CONFIG_TDP_GET_TDP_CONTROL, 5, 0)
            .with_mailbox_response(READ_PM_CONFIG, PM_FEATURE, 0, 0);

        let info = query(&device, &[0]).unwrap();

        assert_eq!(info.pp_current_level, 5);
        assert!(!info.bf_supported);
        assert!(!info.cp_supported);

        assert_eq!(
            device.exchanges(),
            vec![
                mailbox(CONFIG_TDP, CONFIG_TDP_GET_LEVELS_INFO, 0),
                mailbox(CONFIG_TDP, CONFIG_TDP_GET_TDP_CONTROL, 5),
                mailbox(READ_PM_CONFIG, PM_FEATURE, 0),
            ]
        );
    }

    #[test]
    fn unsupported_pp_skips_tdp_control() {
        // Not supported, version 3.
        let device = FakeDevice::new()
            .with_mailbox_response(CONFIG_TDP, CONFIG_TDP_GET_LEVELS_INFO, 0, 0x0000_0003)
            .with_mailbox_response(READ_PM_CONFIG, PM_FEATURE, 0, 0);

        let info = query(&device, &[0]).unwrap();

        assert!(!info.pp_supported);
        assert_eq!(device.exchange_count(RequestKind::Mailbox), 2);
    }

    #[test]
    fn core_mask_batches_cover_highest_core_pair() {
        // Processor 0 on core pair 0, processor 1 on core pair 32.
        let device = FakeDevice::new()
            .with_mailbox_response(CONFIG_TDP, CONFIG_TDP_GET_LEVELS_INFO, 0, 0x8002_0403)
            .with_mailbox_response(CONFIG_TDP, CONFIG_TDP_GET_TDP_CONTROL, 2, 0b10)
            .with_mailbox_response(CONFIG_TDP, CONFIG_TDP_PBF_GET_CORE_MASK_INFO, 2, 0)
            .with_mailbox_response(CONFIG_TDP, CONFIG_TDP_PBF_GET_CORE_MASK_INFO, 0x102, 0b1)
            .with_mailbox_response(READ_PM_CONFIG, PM_FEATURE, 0, 0)
            .with_punit_core(0, 0)
            .with_punit_core(1, 65);

        let info = query(&device, &[0, 1]).unwrap();

        assert_eq!(info.bf_cores, BTreeSet::from([1]));

        let mask_requests: Vec<_> = device
            .exchanges()
            .into_iter()
            .filter_map(|exchange| match exchange {
                Exchange::Mailbox {
                    sub_command: CONFIG_TDP_PBF_GET_CORE_MASK_INFO,
                    request_data,
                    ..
                } => Some(request_data),
                _ => None,
            })
            .collect();

        assert_eq!(mask_requests, vec![0x002, 0x102]);
    }

    #[test]
    fn both_threads_of_a_core_pair_are_reported() {
        // Processors 0 and 4 share PUNIT core 2, processor 5 is on PUNIT core 3: all core pair 1.
        let device = FakeDevice::new()
            .with_mailbox_response(CONFIG_TDP, CONFIG_TDP_GET_LEVELS_INFO, 0, 0x8000_0003)
            .with_mailbox_response(CONFIG_TDP, CONFIG_TDP_GET_TDP_CONTROL, 0, 0b10)
            .with_mailbox_response(CONFIG_TDP, CONFIG_TDP_PBF_GET_CORE_MASK_INFO, 0, 0b10)
            .with_mailbox_response(READ_PM_CONFIG, PM_FEATURE, 0, 0)
            .with_punit_core(0, 2)
            .with_punit_core(4, 2)
            .with_punit_core(5, 3)
            .with_punit_core(6, 0);

        let info = query(&device, &[0, 4, 5, 6]).unwrap();

        assert_eq!(info.bf_cores, BTreeSet::from([0, 4, 5]));
    }

    #[test]
    fn qos_config_overrides_pm_feature_enabled_state() {
        let device = full_featured_device()
            // CP supported but not enabled according to PM feature.
            .with_mailbox_response(READ_PM_CONFIG, PM_FEATURE, 0, 0x0000_0001)
            // Enabled according to QoS config, proportional priority.
            .with_mailbox_response(CONFIG_CLOS, CLOS_PM_QOS_CONFIG, 0, 0b010);

        let info = query(&device, &[0, 1, 2, 3]).unwrap();

        assert!(info.cp_supported);
        assert!(info.cp_enabled);
        assert_eq!(info.cp_priority, PriorityMode::Proportional);
    }

    #[test]
    fn failures_identify_step() {
        let v3_without_pp = || {
            FakeDevice::new().with_mailbox_response(
                CONFIG_TDP,
                CONFIG_TDP_GET_LEVELS_INFO,
                0,
                0x0000_0003,
            )
        };

        let cases = [
            (FakeDevice::new(), QueryStep::PerformanceProfileLevels),
            (
                FakeDevice::new().with_mailbox_response(
                    CONFIG_TDP,
                    CONFIG_TDP_GET_LEVELS_INFO,
                    0,
                    LEVELS_V3,
                ),
                QueryStep::TdpControl,
            ),
            (
                full_featured_device().with_mapping_failures(2, 1),
                QueryStep::BaseFrequencyCoreMapping,
            ),
            (
                // Core pair 32 requires a second batch, which is not scripted.
                full_featured_device().with_punit_core(3, 64),
                QueryStep::BaseFrequencyCoreMask { batch: 1 },
            ),
            (v3_without_pp(), QueryStep::CorePowerFeature),
            (
                v3_without_pp().with_mailbox_response(READ_PM_CONFIG, PM_FEATURE, 0, 0b1),
                QueryStep::ClosQosConfig,
            ),
            (
                v3_without_pp()
                    .with_mailbox_response(READ_PM_CONFIG, PM_FEATURE, 0, 0b1)
                    .with_mailbox_response(CONFIG_CLOS, CLOS_PM_QOS_CONFIG, 0, 0)
                    .with_register(PM_CLOS_OFFSET, 0)
                    .with_register(PM_CLOS_OFFSET + 4, 0),
                QueryStep::ClosParameters { clos: 2 },
            ),
        ];

        for (device, expected_step) in cases {
            let error = query(&device, &[0, 1, 2, 3]).unwrap_err();

            match error {
                Error::QueryFailed { step, .. } => assert_eq!(step, expected_step),
                other => panic!("expected a query failure, got {other}"),
            }

            assert_eq!(device.open_handle_count(), 0);
        }
    }

    #[test]
    fn absent_device_is_reported_as_unavailable() {
        let device = FakeDevice::absent();

        let error = query(&device, &[0]).unwrap_err();

        assert!(error.is_device_unavailable());
        assert!(device.exchanges().is_empty());
    }
}
