use crate::error::Result;
use crate::message::wire::{WireReader, WireWriter};

/// DNS opcodes (RFC 1035 §4.1.1, RFC 1996, RFC 2136).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Opcode {
    #[default]
    Query,
    InverseQuery,
    Status,
    Notify,
    Update,
    Unassigned(u8),
}

impl Opcode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Opcode::Query,
            1 => Opcode::InverseQuery,
            2 => Opcode::Status,
            4 => Opcode::Notify,
            5 => Opcode::Update,
            other => Opcode::Unassigned(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Opcode::Query => 0,
            Opcode::InverseQuery => 1,
            Opcode::Status => 2,
            Opcode::Notify => 4,
            Opcode::Update => 5,
            Opcode::Unassigned(other) => other,
        }
    }
}

/// Response codes. The header field is 4 bits; with EDNS present the OPT
/// record contributes 8 more significant bits, so the full value is 12 bits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    #[default]
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    YxDomain,
    YxRrSet,
    NxRrSet,
    NotAuth,
    NotZone,
    BadVersOrSig,
    BadKey,
    BadTime,
    Unassigned(u16),
}

impl ResponseCode {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormErr,
            2 => ResponseCode::ServFail,
            3 => ResponseCode::NxDomain,
            4 => ResponseCode::NotImp,
            5 => ResponseCode::Refused,
            6 => ResponseCode::YxDomain,
            7 => ResponseCode::YxRrSet,
            8 => ResponseCode::NxRrSet,
            9 => ResponseCode::NotAuth,
            10 => ResponseCode::NotZone,
            16 => ResponseCode::BadVersOrSig,
            17 => ResponseCode::BadKey,
            18 => ResponseCode::BadTime,
            other => ResponseCode::Unassigned(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            ResponseCode::NoError => 0,
            ResponseCode::FormErr => 1,
            ResponseCode::ServFail => 2,
            ResponseCode::NxDomain => 3,
            ResponseCode::NotImp => 4,
            ResponseCode::Refused => 5,
            ResponseCode::YxDomain => 6,
            ResponseCode::YxRrSet => 7,
            ResponseCode::NxRrSet => 8,
            ResponseCode::NotAuth => 9,
            ResponseCode::NotZone => 10,
            ResponseCode::BadVersOrSig => 16,
            ResponseCode::BadKey => 17,
            ResponseCode::BadTime => 18,
            ResponseCode::Unassigned(other) => other,
        }
    }
}

/// The raw 12-byte header as it sits on the wire. Section counts live here
/// during codec work only; the message derives them from its section vectors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct RawHeader {
    pub id: u16,
    pub qr: bool,
    pub opcode: Opcode,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    pub ad: bool,
    pub cd: bool,
    /// Low 4 bits of the response code.
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl RawHeader {
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self> {
        let id = reader.read_u16()?;
        let flags = reader.read_u16()?;
        Ok(RawHeader {
            id,
            qr: flags & 0x8000 != 0,
            opcode: Opcode::from_u8(((flags >> 11) & 0x0F) as u8),
            aa: flags & 0x0400 != 0,
            tc: flags & 0x0200 != 0,
            rd: flags & 0x0100 != 0,
            ra: flags & 0x0080 != 0,
            ad: flags & 0x0020 != 0,
            cd: flags & 0x0010 != 0,
            rcode: (flags & 0x000F) as u8,
            qdcount: reader.read_u16()?,
            ancount: reader.read_u16()?,
            nscount: reader.read_u16()?,
            arcount: reader.read_u16()?,
        })
    }

    pub fn write(&self, writer: &mut WireWriter) {
        let mut flags: u16 = 0;
        if self.qr {
            flags |= 0x8000;
        }
        flags |= ((self.opcode.to_u8() & 0x0F) as u16) << 11;
        if self.aa {
            flags |= 0x0400;
        }
        if self.tc {
            flags |= 0x0200;
        }
        if self.rd {
            flags |= 0x0100;
        }
        if self.ra {
            flags |= 0x0080;
        }
        if self.ad {
            flags |= 0x0020;
        }
        if self.cd {
            flags |= 0x0010;
        }
        flags |= (self.rcode & 0x0F) as u16;

        writer.write_u16(self.id);
        writer.write_u16(flags);
        writer.write_u16(self.qdcount);
        writer.write_u16(self.ancount);
        writer.write_u16(self.nscount);
        writer.write_u16(self.arcount);
    }
}
