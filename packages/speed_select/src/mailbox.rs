use crate::records::{MAILBOX_BUFFER_SIZE, MailboxRecord};
use crate::transport::{RequestKind, Transport};
use crate::{Error, LogicalCpuId, Result};

/// Sends one mailbox command to the PUNIT of the package that `cpu` belongs to and returns the
/// 32-bit response data.
pub(crate) fn send_mailbox(
    transport: &Transport,
    cpu: LogicalCpuId,
    command: u16,
    sub_command: u16,
    request_data: u32,
) -> Result<u32> {
    let mut buffer: [u8; MAILBOX_BUFFER_SIZE] =
        MailboxRecord::request(cpu, command, sub_command, request_data).encode();

    tracing::debug!(
        cpu,
        "MBOX SEND cmd: {command:#04x} sub: {sub_command:#04x} data: {request_data:#x}"
    );

    transport
        .execute(RequestKind::Mailbox, &mut buffer)
        .map_err(|source| Error::MailboxCommandFailed {
            cpu,
            command,
            sub_command,
            request_data,
            source: Box::new(source),
        })?;

    let response = MailboxRecord::decode(&buffer).response_data;

    tracing::debug!(cpu, "MBOX RECV data: {response:#x}");

    Ok(response)
}
