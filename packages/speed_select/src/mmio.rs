use crate::records::{IO_REG_BUFFER_SIZE, IoRegRecord};
use crate::transport::{RequestKind, Transport};
use crate::{Error, LogicalCpuId, Result};

/// Reads one PUNIT register of the package that `cpu` belongs to.
pub(crate) fn send_mmio(transport: &Transport, cpu: LogicalCpuId, offset: u32) -> Result<u32> {
    let mut buffer: [u8; IO_REG_BUFFER_SIZE] = IoRegRecord::read(cpu, offset).encode();

    tracing::debug!(cpu, "MMIO SEND reg: {offset:#x}");

    transport
        .execute(RequestKind::RegisterIo, &mut buffer)
        .map_err(|source| Error::MmioCommandFailed {
            cpu,
            offset,
            source: Box::new(source),
        })?;

    let value = IoRegRecord::decode(&buffer).value;

    tracing::debug!(cpu, "MMIO RECV data: {value:#x}");

    Ok(value)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::io;
    use std::path::PathBuf;

    use super::*;
    use crate::DEFAULT_DEVICE_PATH;
    use crate::pal::{BindingsFacade, MockBindings};
    use crate::records::IO_REG_READ;

    fn transport(bindings: MockBindings) -> Transport {
        Transport::new(
            PathBuf::from(DEFAULT_DEVICE_PATH),
            BindingsFacade::from_mock(bindings),
        )
    }

    #[test]
    fn reads_register_value() {
        let mut bindings = MockBindings::new();

        bindings.expect_open_device().returning(|_| Ok(3));
        bindings.expect_close_device().return_const(());
        bindings
            .expect_ioctl()
            .once()
            .returning(|_, request, payload| {
                assert_eq!(
                    RequestKind::from_ioctl_request(request),
                    Some(RequestKind::RegisterIo)
                );

                let payload: &mut [u8; IO_REG_BUFFER_SIZE] = payload
                    .try_into()
                    .expect("register request has the register record size");

                let mut record = IoRegRecord::decode(payload);
                assert_eq!(record.read_write, IO_REG_READ);
                assert_eq!(record.logical_cpu, 8);
                assert_eq!(record.register, 0x14);

                record.value = 0xdead_beef;
                *payload = record.encode();
                Ok(())
            });

        assert_eq!(send_mmio(&transport(bindings), 8, 0x14).unwrap(), 0xdead_beef);
    }

    #[test]
    fn failure_identifies_register() {
        let mut bindings = MockBindings::new();

        bindings
            .expect_open_device()
            .returning(|_| Err(io::Error::from(io::ErrorKind::NotFound)));

        let error = send_mmio(&transport(bindings), 2, 0x20).unwrap_err();

        assert!(matches!(
            error,
            Error::MmioCommandFailed {
                cpu: 2,
                offset: 0x20,
                ..
            }
        ));
        assert!(error.is_device_unavailable());
    }
}
