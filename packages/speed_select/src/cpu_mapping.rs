use std::sync::Mutex;

use foldhash::{HashMap, HashMapExt};

use crate::records::{CPU_MAP_BUFFER_SIZE, CpuMapRecord};
use crate::transport::{RequestKind, Transport};
use crate::{Error, LogicalCpuId, PunitCoreId, Result};

/// Remembers which PUNIT core each logical processor maps to.
///
/// The mapping is fixed for the lifetime of the system, so entries are never invalidated. Only
/// successful lookups are stored; a failed lookup is attempted again the next time it is needed.
///
/// The lock is not held while talking to the hardware. Two threads resolving the same processor
/// at the same time may both issue a request, in which case the first stored result is kept.
#[derive(Debug)]
pub(crate) struct CpuMappingCache {
    entries: Mutex<HashMap<LogicalCpuId, PunitCoreId>>,
}

impl CpuMappingCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn resolve(&self, transport: &Transport, cpu: LogicalCpuId) -> Result<PunitCoreId> {
        if let Some(punit_core) = self.cached(cpu) {
            return Ok(punit_core);
        }

        let punit_core = request_mapping(transport, cpu)?;

        let mut entries = self
            .entries
            .lock()
            .expect("poisoned lock indicates we are already panicking");

        Ok(*entries.entry(cpu).or_insert(punit_core))
    }

    fn cached(&self, cpu: LogicalCpuId) -> Option<PunitCoreId> {
        self.entries
            .lock()
            .expect("poisoned lock indicates we are already panicking")
            .get(&cpu)
            .copied()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("poisoned lock indicates we are already panicking")
            .len()
    }
}

fn request_mapping(transport: &Transport, cpu: LogicalCpuId) -> Result<PunitCoreId> {
    let mut buffer: [u8; CPU_MAP_BUFFER_SIZE] = CpuMapRecord::request(cpu).encode();

    transport
        .execute(RequestKind::PhysicalId, &mut buffer)
        .map_err(|source| Error::MappingFailed {
            cpu,
            source: Box::new(source),
        })?;

    let punit_core = CpuMapRecord::decode(&buffer).physical_cpu;

    tracing::debug!(cpu, punit_core, "resolved PUNIT core");

    Ok(punit_core)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::io;
    use std::path::PathBuf;

    use mockall::Sequence;
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::DEFAULT_DEVICE_PATH;
    use crate::pal::{BindingsFacade, MockBindings};

    assert_impl_all!(CpuMappingCache: Send, Sync);

    fn transport(bindings: MockBindings) -> Transport {
        Transport::new(
            PathBuf::from(DEFAULT_DEVICE_PATH),
            BindingsFacade::from_mock(bindings),
        )
    }

    fn respond_with_punit_core(payload: &mut [u8], punit_core: PunitCoreId) {
        let payload: &mut [u8; CPU_MAP_BUFFER_SIZE] = payload
            .try_into()
            .expect("physical id request has the cpu map record size");

        let mut record = CpuMapRecord::decode(payload);
        record.physical_cpu = punit_core;
        *payload = record.encode();
    }

    #[test]
    fn repeated_resolve_issues_one_request() {
        let mut bindings = MockBindings::new();

        bindings.expect_open_device().returning(|_| Ok(1));
        bindings.expect_close_device().return_const(());
        bindings
            .expect_ioctl()
            .once()
            .returning(|_, _, payload| {
                respond_with_punit_core(payload, 13);
                Ok(())
            });

        let transport = transport(bindings);
        let cache = CpuMappingCache::new();

        assert_eq!(cache.resolve(&transport, 6).unwrap(), 13);
        assert_eq!(cache.resolve(&transport, 6).unwrap(), 13);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failure_is_not_cached() {
        let mut bindings = MockBindings::new();
        let mut seq = Sequence::new();

        bindings.expect_open_device().returning(|_| Ok(1));
        bindings.expect_close_device().return_const(());
        bindings
            .expect_ioctl()
            .once()
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(io::Error::from(io::ErrorKind::InvalidInput)));
        bindings
            .expect_ioctl()
            .once()
            .in_sequence(&mut seq)
            .returning(|_, _, payload| {
                respond_with_punit_core(payload, 4);
                Ok(())
            });

        let transport = transport(bindings);
        let cache = CpuMappingCache::new();

        let error = cache.resolve(&transport, 2).unwrap_err();
        assert!(matches!(error, Error::MappingFailed { cpu: 2, .. }));
        assert_eq!(cache.len(), 0);

        assert_eq!(cache.resolve(&transport, 2).unwrap(), 4);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_processors_are_resolved_separately() {
        let mut bindings = MockBindings::new();

        bindings.expect_open_device().returning(|_| Ok(1));
        bindings.expect_close_device().return_const(());
        bindings
            .expect_ioctl()
            .times(2)
            .returning(|_, _, payload| {
                let request: &[u8; CPU_MAP_BUFFER_SIZE] = (&*payload)
                    .try_into()
                    .expect("physical id request has the cpu map record size");
                let cpu = CpuMapRecord::decode(request).logical_cpu;

                respond_with_punit_core(payload, cpu * 2);
                Ok(())
            });

        let transport = transport(bindings);
        let cache = CpuMappingCache::new();

        assert_eq!(cache.resolve(&transport, 3).unwrap(), 6);
        assert_eq!(cache.resolve(&transport, 5).unwrap(), 10);
        assert_eq!(cache.resolve(&transport, 3).unwrap(), 6);
    }
}
