use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::{DnsError, Result};
use crate::message::wire::{WireReader, WireWriter};
use crate::name::DnsName;

/// Resource record types. Values without a variant are preserved in
/// `Unknown` so unrecognized records survive a decode/encode round trip.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Srv,
    Opt,
    Ds,
    Rrsig,
    Nsec,
    Dnskey,
    Nsec3,
    Nsec3Param,
    OpenPgpKey,
    Dlv,
    Unknown(u16),
}

impl RecordType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::Ns,
            5 => RecordType::Cname,
            6 => RecordType::Soa,
            12 => RecordType::Ptr,
            15 => RecordType::Mx,
            16 => RecordType::Txt,
            28 => RecordType::Aaaa,
            33 => RecordType::Srv,
            41 => RecordType::Opt,
            43 => RecordType::Ds,
            46 => RecordType::Rrsig,
            47 => RecordType::Nsec,
            48 => RecordType::Dnskey,
            50 => RecordType::Nsec3,
            51 => RecordType::Nsec3Param,
            61 => RecordType::OpenPgpKey,
            32769 => RecordType::Dlv,
            other => RecordType::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Ptr => 12,
            RecordType::Mx => 15,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Srv => 33,
            RecordType::Opt => 41,
            RecordType::Ds => 43,
            RecordType::Rrsig => 46,
            RecordType::Nsec => 47,
            RecordType::Dnskey => 48,
            RecordType::Nsec3 => 50,
            RecordType::Nsec3Param => 51,
            RecordType::OpenPgpKey => 61,
            RecordType::Dlv => 32769,
            RecordType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Unknown(v) => write!(f, "TYPE{v}"),
            other => write!(f, "{}", format!("{other:?}").to_uppercase()),
        }
    }
}

/// Record classes; almost always `In`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RecordClass {
    #[default]
    In,
    Ch,
    Hs,
    None,
    Any,
    Unknown(u16),
}

impl RecordClass {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => RecordClass::In,
            3 => RecordClass::Ch,
            4 => RecordClass::Hs,
            254 => RecordClass::None,
            255 => RecordClass::Any,
            other => RecordClass::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            RecordClass::In => 1,
            RecordClass::Ch => 3,
            RecordClass::Hs => 4,
            RecordClass::None => 254,
            RecordClass::Any => 255,
            RecordClass::Unknown(other) => other,
        }
    }
}

/// DNSKEY rdata. The SEP bit marks a key intended as a secure entry point
/// (typically the KSK).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dnskey {
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: Vec<u8>,
}

impl Dnskey {
    pub const FLAG_ZONE: u16 = 0x0100;
    pub const FLAG_SECURE_ENTRY_POINT: u16 = 0x0001;

    pub fn is_secure_entry_point(&self) -> bool {
        self.flags & Self::FLAG_SECURE_ENTRY_POINT != 0
    }

    pub fn is_zone_key(&self) -> bool {
        self.flags & Self::FLAG_ZONE != 0
    }

    /// The rdata in wire form, as digested for DS records and key tags.
    pub fn rdata_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.public_key.len());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.push(self.protocol);
        out.push(self.algorithm);
        out.extend_from_slice(&self.public_key);
        out
    }
}

/// RRSIG rdata covering one RRset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rrsig {
    pub type_covered: RecordType,
    pub algorithm: u8,
    pub labels: u8,
    pub original_ttl: u32,
    pub expiration: u32,
    pub inception: u32,
    pub key_tag: u16,
    pub signer: DnsName,
    pub signature: Vec<u8>,
}

impl Rrsig {
    /// The rdata prefix covered by the signature: everything up to but not
    /// including the signature bytes, with the signer name uncompressed.
    pub fn rdata_without_signature(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.type_covered.to_u16().to_be_bytes());
        out.push(self.algorithm);
        out.push(self.labels);
        out.extend_from_slice(&self.original_ttl.to_be_bytes());
        out.extend_from_slice(&self.expiration.to_be_bytes());
        out.extend_from_slice(&self.inception.to_be_bytes());
        out.extend_from_slice(&self.key_tag.to_be_bytes());
        self.signer.write_wire(&mut out);
        out
    }

    /// Whether `now` (seconds since the epoch) falls inside the validity
    /// window.
    pub fn is_active_at(&self, now: u32) -> bool {
        self.inception <= now && now <= self.expiration
    }
}

/// DS (and DLV) rdata: the parent-published digest of a child SEP key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ds {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    pub digest: Vec<u8>,
}

/// NSEC rdata: the next owner in canonical order plus the types present at
/// this owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nsec {
    pub next: DnsName,
    pub types: Vec<RecordType>,
}

/// NSEC3 rdata (RFC 5155).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nsec3 {
    pub algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
    pub next_hashed: Vec<u8>,
    pub types: Vec<RecordType>,
}

impl Nsec3 {
    pub fn opt_out(&self) -> bool {
        self.flags & 0x01 != 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nsec3Param {
    pub algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
}

/// The closed set of rdata variants. The variant always agrees with the
/// record type on the wire; `Record::rtype()` is derived from it, so a
/// mismatched (type, payload) pair cannot be constructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(DnsName),
    Cname(DnsName),
    Ptr(DnsName),
    Mx {
        preference: u16,
        exchange: DnsName,
    },
    Soa {
        mname: DnsName,
        rname: DnsName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: DnsName,
    },
    Txt(Vec<Vec<u8>>),
    Dnskey(Dnskey),
    Rrsig(Rrsig),
    Ds(Ds),
    Dlv(Ds),
    Nsec(Nsec),
    Nsec3(Nsec3),
    Nsec3Param(Nsec3Param),
    /// Raw OPT rdata; the interesting fields of the pseudo-record live in
    /// the class and TTL, handled by the EDNS layer.
    Opt(Vec<u8>),
    OpenPgpKey(Vec<u8>),
    Unknown {
        rtype: u16,
        data: Vec<u8>,
    },
}

impl RecordData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordData::A(_) => RecordType::A,
            RecordData::Aaaa(_) => RecordType::Aaaa,
            RecordData::Ns(_) => RecordType::Ns,
            RecordData::Cname(_) => RecordType::Cname,
            RecordData::Ptr(_) => RecordType::Ptr,
            RecordData::Mx { .. } => RecordType::Mx,
            RecordData::Soa { .. } => RecordType::Soa,
            RecordData::Srv { .. } => RecordType::Srv,
            RecordData::Txt(_) => RecordType::Txt,
            RecordData::Dnskey(_) => RecordType::Dnskey,
            RecordData::Rrsig(_) => RecordType::Rrsig,
            RecordData::Ds(_) => RecordType::Ds,
            RecordData::Dlv(_) => RecordType::Dlv,
            RecordData::Nsec(_) => RecordType::Nsec,
            RecordData::Nsec3(_) => RecordType::Nsec3,
            RecordData::Nsec3Param(_) => RecordType::Nsec3Param,
            RecordData::Opt(_) => RecordType::Opt,
            RecordData::OpenPgpKey(_) => RecordType::OpenPgpKey,
            RecordData::Unknown { rtype, .. } => RecordType::from_u16(*rtype),
        }
    }

    /// Decode rdata of the given type. The reader is positioned at the
    /// rdata start inside the full message buffer, which lets names inside
    /// rdata resolve compression pointers.
    pub(crate) fn parse(
        rtype: RecordType,
        reader: &mut WireReader<'_>,
        rdlength: usize,
    ) -> Result<Self> {
        let rdata_end = reader.pos() + rdlength;
        let data = match rtype {
            RecordType::A => {
                let octets = reader.read_bytes(4)?;
                RecordData::A(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
            }
            RecordType::Aaaa => {
                let octets: [u8; 16] = reader
                    .read_bytes(16)?
                    .try_into()
                    .map_err(|_| DnsError::TruncatedMessage)?;
                RecordData::Aaaa(Ipv6Addr::from(octets))
            }
            RecordType::Ns => RecordData::Ns(reader.read_name()?),
            RecordType::Cname => RecordData::Cname(reader.read_name()?),
            RecordType::Ptr => RecordData::Ptr(reader.read_name()?),
            RecordType::Mx => RecordData::Mx {
                preference: reader.read_u16()?,
                exchange: reader.read_name()?,
            },
            RecordType::Soa => RecordData::Soa {
                mname: reader.read_name()?,
                rname: reader.read_name()?,
                serial: reader.read_u32()?,
                refresh: reader.read_u32()?,
                retry: reader.read_u32()?,
                expire: reader.read_u32()?,
                minimum: reader.read_u32()?,
            },
            RecordType::Srv => RecordData::Srv {
                priority: reader.read_u16()?,
                weight: reader.read_u16()?,
                port: reader.read_u16()?,
                target: reader.read_name()?,
            },
            RecordType::Txt => {
                let mut segments = Vec::new();
                while reader.pos() < rdata_end {
                    let len = reader.read_u8()? as usize;
                    segments.push(reader.read_bytes(len)?.to_vec());
                }
                RecordData::Txt(segments)
            }
            RecordType::Dnskey => {
                let flags = reader.read_u16()?;
                let protocol = reader.read_u8()?;
                let algorithm = reader.read_u8()?;
                let public_key = reader.read_bytes(rest_of_rdata(reader, rdata_end)?)?.to_vec();
                RecordData::Dnskey(Dnskey {
                    flags,
                    protocol,
                    algorithm,
                    public_key,
                })
            }
            RecordType::Rrsig => {
                let type_covered = RecordType::from_u16(reader.read_u16()?);
                let algorithm = reader.read_u8()?;
                let labels = reader.read_u8()?;
                let original_ttl = reader.read_u32()?;
                let expiration = reader.read_u32()?;
                let inception = reader.read_u32()?;
                let key_tag = reader.read_u16()?;
                let signer = reader.read_name()?;
                let signature = reader.read_bytes(rest_of_rdata(reader, rdata_end)?)?.to_vec();
                RecordData::Rrsig(Rrsig {
                    type_covered,
                    algorithm,
                    labels,
                    original_ttl,
                    expiration,
                    inception,
                    key_tag,
                    signer,
                    signature,
                })
            }
            RecordType::Ds | RecordType::Dlv => {
                let ds = Ds {
                    key_tag: reader.read_u16()?,
                    algorithm: reader.read_u8()?,
                    digest_type: reader.read_u8()?,
                    digest: reader.read_bytes(rest_of_rdata(reader, rdata_end)?)?.to_vec(),
                };
                if rtype == RecordType::Ds {
                    RecordData::Ds(ds)
                } else {
                    RecordData::Dlv(ds)
                }
            }
            RecordType::Nsec => {
                let next = reader.read_name()?;
                let types = read_type_bitmap(reader, rdata_end)?;
                RecordData::Nsec(Nsec { next, types })
            }
            RecordType::Nsec3 => {
                let algorithm = reader.read_u8()?;
                let flags = reader.read_u8()?;
                let iterations = reader.read_u16()?;
                let salt_len = reader.read_u8()? as usize;
                let salt = reader.read_bytes(salt_len)?.to_vec();
                let hash_len = reader.read_u8()? as usize;
                let next_hashed = reader.read_bytes(hash_len)?.to_vec();
                let types = read_type_bitmap(reader, rdata_end)?;
                RecordData::Nsec3(Nsec3 {
                    algorithm,
                    flags,
                    iterations,
                    salt,
                    next_hashed,
                    types,
                })
            }
            RecordType::Nsec3Param => {
                let algorithm = reader.read_u8()?;
                let flags = reader.read_u8()?;
                let iterations = reader.read_u16()?;
                let salt_len = reader.read_u8()? as usize;
                let salt = reader.read_bytes(salt_len)?.to_vec();
                RecordData::Nsec3Param(Nsec3Param {
                    algorithm,
                    flags,
                    iterations,
                    salt,
                })
            }
            RecordType::Opt => RecordData::Opt(reader.read_bytes(rdlength)?.to_vec()),
            RecordType::OpenPgpKey => RecordData::OpenPgpKey(reader.read_bytes(rdlength)?.to_vec()),
            RecordType::Unknown(value) => RecordData::Unknown {
                rtype: value,
                data: reader.read_bytes(rdlength)?.to_vec(),
            },
        };
        Ok(data)
    }

    pub(crate) fn write(&self, writer: &mut WireWriter) {
        match self {
            RecordData::A(addr) => writer.write_bytes(&addr.octets()),
            RecordData::Aaaa(addr) => writer.write_bytes(&addr.octets()),
            RecordData::Ns(name) | RecordData::Cname(name) | RecordData::Ptr(name) => {
                writer.write_name(name)
            }
            RecordData::Mx {
                preference,
                exchange,
            } => {
                writer.write_u16(*preference);
                writer.write_name(exchange);
            }
            RecordData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                writer.write_name(mname);
                writer.write_name(rname);
                writer.write_u32(*serial);
                writer.write_u32(*refresh);
                writer.write_u32(*retry);
                writer.write_u32(*expire);
                writer.write_u32(*minimum);
            }
            RecordData::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                writer.write_u16(*priority);
                writer.write_u16(*weight);
                writer.write_u16(*port);
                writer.write_name(target);
            }
            RecordData::Txt(segments) => {
                for segment in segments {
                    writer.write_u8(segment.len() as u8);
                    writer.write_bytes(segment);
                }
            }
            RecordData::Dnskey(dnskey) => writer.write_bytes(&dnskey.rdata_wire()),
            RecordData::Rrsig(rrsig) => {
                writer.write_bytes(&rrsig.rdata_without_signature());
                writer.write_bytes(&rrsig.signature);
            }
            RecordData::Ds(ds) | RecordData::Dlv(ds) => {
                writer.write_u16(ds.key_tag);
                writer.write_u8(ds.algorithm);
                writer.write_u8(ds.digest_type);
                writer.write_bytes(&ds.digest);
            }
            RecordData::Nsec(nsec) => {
                writer.write_name(&nsec.next);
                write_type_bitmap(&nsec.types, writer);
            }
            RecordData::Nsec3(nsec3) => {
                writer.write_u8(nsec3.algorithm);
                writer.write_u8(nsec3.flags);
                writer.write_u16(nsec3.iterations);
                writer.write_u8(nsec3.salt.len() as u8);
                writer.write_bytes(&nsec3.salt);
                writer.write_u8(nsec3.next_hashed.len() as u8);
                writer.write_bytes(&nsec3.next_hashed);
                write_type_bitmap(&nsec3.types, writer);
            }
            RecordData::Nsec3Param(params) => {
                writer.write_u8(params.algorithm);
                writer.write_u8(params.flags);
                writer.write_u16(params.iterations);
                writer.write_u8(params.salt.len() as u8);
                writer.write_bytes(&params.salt);
            }
            RecordData::Opt(data) | RecordData::OpenPgpKey(data) => writer.write_bytes(data),
            RecordData::Unknown { data, .. } => writer.write_bytes(data),
        }
    }
}

/// One resource record. The type on the wire is derived from the payload
/// variant, so it can never disagree with the data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub name: DnsName,
    pub class: RecordClass,
    /// mDNS unicast-response / cache-flush bit carried in the class field.
    pub unicast: bool,
    pub ttl: u32,
    pub data: RecordData,
}

impl Record {
    pub fn new(name: DnsName, class: RecordClass, ttl: u32, data: RecordData) -> Self {
        Record {
            name,
            class,
            unicast: false,
            ttl,
            data,
        }
    }

    pub fn rtype(&self) -> RecordType {
        self.data.rtype()
    }

    pub(crate) fn parse(reader: &mut WireReader<'_>) -> Result<Self> {
        let name = reader.read_name()?;
        let rtype = RecordType::from_u16(reader.read_u16()?);
        let raw_class = reader.read_u16()?;
        let ttl = reader.read_u32()?;
        let rdlength = reader.read_u16()? as usize;
        if reader.remaining() < rdlength {
            return Err(DnsError::TruncatedMessage);
        }

        // OPT overloads the class field with the UDP payload size, so the
        // unicast bit only applies to real records.
        let (class, unicast) = if rtype == RecordType::Opt {
            (RecordClass::from_u16(raw_class), false)
        } else {
            (
                RecordClass::from_u16(raw_class & 0x7FFF),
                raw_class & 0x8000 != 0,
            )
        };

        let rdata_start = reader.pos();
        let data = RecordData::parse(rtype, reader, rdlength)?;
        if reader.pos() != rdata_start + rdlength {
            return Err(DnsError::TruncatedMessage);
        }

        Ok(Record {
            name,
            class,
            unicast,
            ttl,
            data,
        })
    }

    pub(crate) fn write(&self, writer: &mut WireWriter) {
        writer.write_name(&self.name);
        writer.write_u16(self.rtype().to_u16());
        let mut class = self.class.to_u16();
        if self.unicast && self.rtype() != RecordType::Opt {
            class |= 0x8000;
        }
        writer.write_u16(class);
        writer.write_u32(self.ttl);
        let length_at = writer.len();
        writer.write_u16(0);
        let rdata_start = writer.len();
        self.data.write(writer);
        writer.patch_u16(length_at, (writer.len() - rdata_start) as u16);
    }

    /// Full wire form of this single record (uncompressed), as used for
    /// RRset canonicalization.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut writer = WireWriter::new();
        self.write(&mut writer);
        writer.into_bytes()
    }
}

/// Octets left before the rdata boundary; a cursor already past it means
/// the rdlength lied about a field length.
fn rest_of_rdata(reader: &WireReader<'_>, rdata_end: usize) -> Result<usize> {
    rdata_end
        .checked_sub(reader.pos())
        .ok_or(DnsError::TruncatedMessage)
}

/// Decode an NSEC/NSEC3 type bitmap (RFC 4034 §4.1.2).
fn read_type_bitmap(reader: &mut WireReader<'_>, rdata_end: usize) -> Result<Vec<RecordType>> {
    let mut types = Vec::new();
    while reader.pos() < rdata_end {
        let window = reader.read_u8()? as u16;
        let len = reader.read_u8()? as usize;
        if len == 0 || len > 32 {
            return Err(DnsError::TruncatedMessage);
        }
        let bitmap = reader.read_bytes(len)?;
        for (i, byte) in bitmap.iter().enumerate() {
            for bit in 0..8 {
                if byte & (0x80 >> bit) != 0 {
                    types.push(RecordType::from_u16(window << 8 | (i as u16) << 3 | bit));
                }
            }
        }
    }
    Ok(types)
}

fn write_type_bitmap(types: &[RecordType], writer: &mut WireWriter) {
    let mut values: Vec<u16> = types.iter().map(|t| t.to_u16()).collect();
    values.sort_unstable();
    values.dedup();

    let mut index = 0;
    while index < values.len() {
        let window = values[index] >> 8;
        let mut bitmap = [0u8; 32];
        let mut max_byte = 0;
        while index < values.len() && values[index] >> 8 == window {
            let low = values[index] & 0xFF;
            let byte = (low >> 3) as usize;
            bitmap[byte] |= 0x80 >> (low & 7);
            max_byte = byte;
            index += 1;
        }
        writer.write_u8(window as u8);
        writer.write_u8(max_byte as u8 + 1);
        writer.write_bytes(&bitmap[..=max_byte]);
    }
}
