use crate::error::{DnsError, Result};
use crate::name::DnsName;

/// Byte cursor over the complete message buffer. Name decompression needs
/// random access to earlier octets, so the reader always keeps the whole
/// buffer and an absolute position.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        WireReader { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let v = *self.buf.get(self.pos).ok_or(DnsError::TruncatedMessage)?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(DnsError::TruncatedMessage)?;
        let slice = self.buf.get(self.pos..end).ok_or(DnsError::TruncatedMessage)?;
        self.pos = end;
        Ok(slice)
    }

    /// Decode a possibly compressed name at the current position.
    pub fn read_name(&mut self) -> Result<DnsName> {
        let (name, consumed) = DnsName::parse_wire(self.buf, self.pos)?;
        self.pos += consumed;
        Ok(name)
    }
}

/// Growable big-endian writer. Encoding never compresses names, so output is
/// deterministic and byte-reproducible for signature canonicalization.
#[derive(Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_name(&mut self, name: &DnsName) {
        name.write_wire(&mut self.buf);
    }

    /// Patch a previously written big-endian u16 at `offset`, used for
    /// rdlength backfilling.
    pub fn patch_u16(&mut self, offset: usize, v: u16) {
        self.buf[offset..offset + 2].copy_from_slice(&v.to_be_bytes());
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
