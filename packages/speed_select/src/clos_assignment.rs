use crate::bits::extract_u8;
use crate::commands::PQR_ASSOC_OFFSET;
use crate::cpu_mapping::CpuMappingCache;
use crate::mmio::send_mmio;
use crate::transport::Transport;
use crate::{ClosId, Error, LogicalCpuId, QueryStep, Result};

/// Reads the class-of-service slot that a logical processor is associated with.
///
/// Both hyperthreads of a PUNIT core pair share one association register.
pub(crate) fn query_clos_id(
    transport: &Transport,
    cache: &CpuMappingCache,
    cpu: LogicalCpuId,
) -> Result<ClosId> {
    let step = QueryStep::ClosAssociation { cpu };

    let punit_core = cache
        .resolve(transport, cpu)
        .map_err(Error::query_failed(step))?;

    let offset = association_register_offset(punit_core);

    let value = send_mmio(transport, cpu, offset).map_err(Error::query_failed(step))?;

    Ok(extract_u8(value, 16, 17))
}

fn association_register_offset(punit_core: u32) -> u32 {
    // One 4-byte register per core pair. Offsets wrap for PUNIT core ids no hardware produces.
    ((punit_core >> 1) << 2).wrapping_add(PQR_ASSOC_OFFSET)
}
