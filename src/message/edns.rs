use crate::error::Result;
use crate::message::record::{Record, RecordClass, RecordData};
use crate::name::DnsName;

/// EDNS option codes we know by name (RFC 5001, RFC 7871).
pub const OPTION_NSID: u16 = 3;

/// One EDNS option as carried in the OPT rdata. Unrecognized codes are kept
/// verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdnsOption {
    pub code: u16,
    pub data: Vec<u8>,
}

/// The decoded view of the OPT pseudo-record (RFC 6891). The record itself
/// never appears in the message sections; decode lifts it into this struct
/// and encode lowers it back into the additional section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edns {
    /// Largest UDP payload the sender can reassemble, carried in the OPT
    /// class field.
    pub udp_payload_size: u16,
    /// Upper 8 bits of the 12-bit extended response code.
    pub extended_rcode: u8,
    pub version: u8,
    pub flags: u16,
    pub options: Vec<EdnsOption>,
}

impl Edns {
    pub const FLAG_DNSSEC_OK: u16 = 0x8000;

    pub fn new(udp_payload_size: u16) -> Self {
        Edns {
            udp_payload_size,
            extended_rcode: 0,
            version: 0,
            flags: 0,
            options: Vec::new(),
        }
    }

    pub fn dnssec_ok(&self) -> bool {
        self.flags & Self::FLAG_DNSSEC_OK != 0
    }

    pub fn set_dnssec_ok(&mut self, value: bool) {
        if value {
            self.flags |= Self::FLAG_DNSSEC_OK;
        } else {
            self.flags &= !Self::FLAG_DNSSEC_OK;
        }
    }

    pub fn option(&self, code: u16) -> Option<&EdnsOption> {
        self.options.iter().find(|o| o.code == code)
    }

    pub fn nsid(&self) -> Option<&[u8]> {
        self.option(OPTION_NSID).map(|o| o.data.as_slice())
    }

    /// Lift an OPT record into its decoded form. The class field carries the
    /// payload size and the TTL packs extended rcode, version and flags.
    pub(crate) fn from_record(record: &Record) -> Result<Self> {
        let raw = match &record.data {
            RecordData::Opt(raw) => raw,
            _ => return Ok(Edns::new(512)),
        };

        let mut options = Vec::new();
        let mut pos = 0;
        while pos + 4 <= raw.len() {
            let code = u16::from_be_bytes([raw[pos], raw[pos + 1]]);
            let len = u16::from_be_bytes([raw[pos + 2], raw[pos + 3]]) as usize;
            pos += 4;
            if pos + len > raw.len() {
                return Err(crate::error::DnsError::TruncatedMessage);
            }
            options.push(EdnsOption {
                code,
                data: raw[pos..pos + len].to_vec(),
            });
            pos += len;
        }
        if pos != raw.len() {
            return Err(crate::error::DnsError::TruncatedMessage);
        }

        Ok(Edns {
            udp_payload_size: record.class.to_u16(),
            extended_rcode: (record.ttl >> 24) as u8,
            version: (record.ttl >> 16) as u8,
            flags: record.ttl as u16,
            options,
        })
    }

    /// Lower this struct back into the OPT record placed in the additional
    /// section on encode.
    pub(crate) fn to_record(&self) -> Record {
        let mut raw = Vec::new();
        for option in &self.options {
            raw.extend_from_slice(&option.code.to_be_bytes());
            raw.extend_from_slice(&(option.data.len() as u16).to_be_bytes());
            raw.extend_from_slice(&option.data);
        }
        let ttl = (self.extended_rcode as u32) << 24
            | (self.version as u32) << 16
            | self.flags as u32;
        Record::new(
            DnsName::root(),
            RecordClass::from_u16(self.udp_payload_size),
            ttl,
            RecordData::Opt(raw),
        )
    }
}

impl Default for Edns {
    fn default() -> Self {
        Edns::new(1232)
    }
}
