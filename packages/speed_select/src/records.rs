//! Binary request/response records exchanged with the `isst_if` driver.
//!
//! Each ioctl takes a buffer holding a `u32` record count followed by that many fixed-layout
//! records, all in native byte order. We only ever send one record per request. The layouts
//! mirror `struct isst_if_cpu_maps`, `struct isst_if_mbox_cmds` and `struct isst_if_io_regs` from
//! the Linux UAPI header `linux/isst_if.h`.

use crate::LogicalCpuId;

const COUNT_SIZE: usize = size_of::<u32>();

/// Size of a physical id request with one record.
pub(crate) const CPU_MAP_BUFFER_SIZE: usize = COUNT_SIZE + 2 * size_of::<u32>();

/// Size of a mailbox request with one record.
pub(crate) const MAILBOX_BUFFER_SIZE: usize =
    COUNT_SIZE + 4 * size_of::<u32>() + 2 * size_of::<u16>() + size_of::<u32>();

/// Size of a register I/O request with one record.
pub(crate) const IO_REG_BUFFER_SIZE: usize = COUNT_SIZE + 4 * size_of::<u32>();

/// `read_write` value of an [`IoRegRecord`] that reads the register.
pub(crate) const IO_REG_READ: u32 = 0;

/// Maps a logical processor to its PUNIT core (`struct isst_if_cpu_map`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct CpuMapRecord {
    pub(crate) logical_cpu: LogicalCpuId,
    pub(crate) physical_cpu: u32,
}

impl CpuMapRecord {
    pub(crate) fn request(logical_cpu: LogicalCpuId) -> Self {
        Self {
            logical_cpu,
            physical_cpu: 0,
        }
    }

    pub(crate) fn encode(&self) -> [u8; CPU_MAP_BUFFER_SIZE] {
        let mut writer = RecordWriter::with_count();
        writer.u32(self.logical_cpu);
        writer.u32(self.physical_cpu);
        writer.finish()
    }

    pub(crate) fn decode(buffer: &[u8; CPU_MAP_BUFFER_SIZE]) -> Self {
        let mut reader = RecordReader::after_count(buffer);

        Self {
            logical_cpu: reader.u32(),
            physical_cpu: reader.u32(),
        }
    }
}

/// One PUNIT mailbox command and its response (`struct isst_if_mbox_cmd`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct MailboxRecord {
    pub(crate) logical_cpu: LogicalCpuId,
    pub(crate) parameter: u32,
    pub(crate) request_data: u32,
    pub(crate) response_data: u32,
    pub(crate) command: u16,
    pub(crate) sub_command: u16,
}

impl MailboxRecord {
    pub(crate) fn request(
        logical_cpu: LogicalCpuId,
        command: u16,
        sub_command: u16,
        request_data: u32,
    ) -> Self {
        Self {
            logical_cpu,
            parameter: 0,
            request_data,
            response_data: 0,
            command,
            sub_command,
        }
    }

    pub(crate) fn encode(&self) -> [u8; MAILBOX_BUFFER_SIZE] {
        let mut writer = RecordWriter::with_count();
        writer.u32(self.logical_cpu);
        writer.u32(self.parameter);
        writer.u32(self.request_data);
        writer.u32(self.response_data);
        writer.u16(self.command);
        writer.u16(self.sub_command);
        // Reserved.
        writer.u32(0);
        writer.finish()
    }

    pub(crate) fn decode(buffer: &[u8; MAILBOX_BUFFER_SIZE]) -> Self {
        let mut reader = RecordReader::after_count(buffer);

        Self {
            logical_cpu: reader.u32(),
            parameter: reader.u32(),
            request_data: reader.u32(),
            response_data: reader.u32(),
            command: reader.u16(),
            sub_command: reader.u16(),
        }
    }
}

/// One PUNIT register access (`struct isst_if_io_reg`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct IoRegRecord {
    pub(crate) read_write: u32,
    pub(crate) logical_cpu: LogicalCpuId,
    pub(crate) register: u32,
    pub(crate) value: u32,
}

impl IoRegRecord {
    pub(crate) fn read(logical_cpu: LogicalCpuId, register: u32) -> Self {
        Self {
            read_write: IO_REG_READ,
            logical_cpu,
            register,
            value: 0,
        }
    }

    pub(crate) fn encode(&self) -> [u8; IO_REG_BUFFER_SIZE] {
        let mut writer = RecordWriter::with_count();
        writer.u32(self.read_write);
        writer.u32(self.logical_cpu);
        writer.u32(self.register);
        writer.u32(self.value);
        writer.finish()
    }

    pub(crate) fn decode(buffer: &[u8; IO_REG_BUFFER_SIZE]) -> Self {
        let mut reader = RecordReader::after_count(buffer);

        Self {
            read_write: reader.u32(),
            logical_cpu: reader.u32(),
            register: reader.u32(),
            value: reader.u32(),
        }
    }
}

/// Reads the record count prefix of a request buffer.
#[cfg(any(test, feature = "test-util"))]
pub(crate) fn record_count(buffer: &[u8]) -> Option<u32> {
    buffer
        .first_chunk::<COUNT_SIZE>()
        .map(|bytes| u32::from_ne_bytes(*bytes))
}

/// Appends fields in declaration order. The record count is always 1.
struct RecordWriter {
    bytes: Vec<u8>,
}

impl RecordWriter {
    fn with_count() -> Self {
        let mut writer = Self { bytes: Vec::new() };
        writer.u32(1);
        writer
    }

    fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_ne_bytes());
    }

    fn finish<const N: usize>(self) -> [u8; N] {
        self.bytes
            .try_into()
            .expect("record layout does not match its buffer size")
    }
}

/// Consumes fields in declaration order, starting after the record count.
struct RecordReader<'a> {
    remaining: &'a [u8],
}

impl<'a> RecordReader<'a> {
    fn after_count(buffer: &'a [u8]) -> Self {
        let (_, remaining) = buffer
            .split_first_chunk::<COUNT_SIZE>()
            .expect("record buffer too small for the record count");

        Self { remaining }
    }

    fn u32(&mut self) -> u32 {
        let (bytes, remaining) = self
            .remaining
            .split_first_chunk::<4>()
            .expect("record layout does not match its buffer size");
        self.remaining = remaining;
        u32::from_ne_bytes(*bytes)
    }

    fn u16(&mut self) -> u16 {
        let (bytes, remaining) = self
            .remaining
            .split_first_chunk::<2>()
            .expect("record layout does not match its buffer size");
        self.remaining = remaining;
        u16::from_ne_bytes(*bytes)
    }
}
