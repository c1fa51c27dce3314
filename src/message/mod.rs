pub mod edns;
pub mod header;
pub mod question;
pub mod record;
pub(crate) mod wire;

use std::hash::{Hash, Hasher};
use std::time::Instant;

use crate::error::{DnsError, Result};

pub use edns::{Edns, EdnsOption, OPTION_NSID};
pub use header::{Opcode, ResponseCode};
pub use question::Question;
pub use record::{
    Dnskey, Ds, Nsec, Nsec3, Nsec3Param, Record, RecordClass, RecordData, RecordType, Rrsig,
};

use header::RawHeader;
use wire::{WireReader, WireWriter};

/// One DNS message, query or response. Section counts are implicit in the
/// vector lengths, and the OPT pseudo-record is lifted out of the additional
/// section into `edns` on decode.
#[derive(Clone, Debug)]
pub struct DnsMessage {
    pub id: u16,
    pub opcode: Opcode,
    /// Full 12-bit response code; the upper 8 bits travel in the OPT record.
    pub rcode: ResponseCode,
    pub qr: bool,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub authentic_data: bool,
    pub checking_disabled: bool,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
    pub edns: Option<Edns>,
    /// When this message arrived from the network. Not part of equality.
    pub received_at: Option<Instant>,
}

impl Default for DnsMessage {
    fn default() -> Self {
        DnsMessage {
            id: 0,
            opcode: Opcode::Query,
            rcode: ResponseCode::NoError,
            qr: false,
            authoritative: false,
            truncated: false,
            recursion_desired: false,
            recursion_available: false,
            authentic_data: false,
            checking_disabled: false,
            questions: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
            edns: None,
            received_at: None,
        }
    }
}

impl DnsMessage {
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Decode a complete message from its wire form.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(buf);
        let raw = RawHeader::read(&mut reader)?;

        let mut questions = Vec::with_capacity(raw.qdcount as usize);
        for _ in 0..raw.qdcount {
            questions.push(Question::parse(&mut reader)?);
        }
        let mut answers = Vec::with_capacity(raw.ancount as usize);
        for _ in 0..raw.ancount {
            answers.push(Record::parse(&mut reader)?);
        }
        let mut authorities = Vec::with_capacity(raw.nscount as usize);
        for _ in 0..raw.nscount {
            authorities.push(Record::parse(&mut reader)?);
        }
        let mut additionals = Vec::with_capacity(raw.arcount as usize);
        for _ in 0..raw.arcount {
            additionals.push(Record::parse(&mut reader)?);
        }

        // Lift the first OPT record out of the additional section.
        let mut edns = None;
        additionals.retain(|record| {
            if record.rtype() == RecordType::Opt && edns.is_none() {
                edns = Some(record.clone());
                false
            } else {
                true
            }
        });
        let edns = match edns {
            Some(record) => Some(Edns::from_record(&record)?),
            None => None,
        };

        let extended = edns.as_ref().map(|e| e.extended_rcode).unwrap_or(0);
        let rcode = ResponseCode::from_u16((extended as u16) << 4 | raw.rcode as u16);

        Ok(DnsMessage {
            id: raw.id,
            opcode: raw.opcode,
            rcode,
            qr: raw.qr,
            authoritative: raw.aa,
            truncated: raw.tc,
            recursion_desired: raw.rd,
            recursion_available: raw.ra,
            authentic_data: raw.ad,
            checking_disabled: raw.cd,
            questions,
            answers,
            authorities,
            additionals,
            edns,
            received_at: None,
        })
    }

    /// Encode into wire form. Infallible: every constructible message has a
    /// wire representation. Response codes above 15 force an OPT record to
    /// carry the upper bits.
    pub fn encode(&self) -> Vec<u8> {
        let rcode = self.rcode.to_u16();
        let mut edns = self.edns.clone();
        if rcode > 0x0F && edns.is_none() {
            edns = Some(Edns::default());
        }
        if let Some(edns) = edns.as_mut() {
            edns.extended_rcode = (rcode >> 4) as u8;
        }

        let opt_record = edns.as_ref().map(Edns::to_record);
        let arcount = self.additionals.len() + opt_record.iter().len();

        let raw = RawHeader {
            id: self.id,
            qr: self.qr,
            opcode: self.opcode,
            aa: self.authoritative,
            tc: self.truncated,
            rd: self.recursion_desired,
            ra: self.recursion_available,
            ad: self.authentic_data,
            cd: self.checking_disabled,
            rcode: (rcode & 0x0F) as u8,
            qdcount: self.questions.len() as u16,
            ancount: self.answers.len() as u16,
            nscount: self.authorities.len() as u16,
            arcount: arcount as u16,
        };

        let mut writer = WireWriter::new();
        raw.write(&mut writer);
        for question in &self.questions {
            question.write(&mut writer);
        }
        for record in &self.answers {
            record.write(&mut writer);
        }
        for record in &self.authorities {
            record.write(&mut writer);
        }
        for record in &self.additionals {
            record.write(&mut writer);
        }
        if let Some(opt) = opt_record {
            opt.write(&mut writer);
        }
        writer.into_bytes()
    }

    /// A copy with the transaction id zeroed, for id-independent comparison.
    pub fn normalized(&self) -> Self {
        let mut copy = self.clone();
        copy.id = 0;
        copy.received_at = None;
        copy
    }

    pub fn question(&self) -> Option<&Question> {
        self.questions.first()
    }

    pub fn asking_for_dnssec(&self) -> bool {
        self.edns.as_ref().map(Edns::dnssec_ok).unwrap_or(false)
    }

    pub fn authorities_of_type(&self, rtype: RecordType) -> impl Iterator<Item = &Record> {
        self.authorities.iter().filter(move |r| r.rtype() == rtype)
    }

    /// Drop RRSIG records from all sections, used after successful
    /// validation when the caller asked for the plain data. NSEC/NSEC3
    /// records stay: for a negative answer they are the answer.
    pub fn strip_signature_records(&mut self) {
        let keep = |r: &Record| r.rtype() != RecordType::Rrsig;
        self.answers.retain(keep);
        self.authorities.retain(keep);
        self.additionals.retain(keep);
    }
}

impl PartialEq for DnsMessage {
    fn eq(&self, other: &Self) -> bool {
        self.encode() == other.encode()
    }
}

impl Eq for DnsMessage {}

impl Hash for DnsMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encode().hash(state);
    }
}

/// Incrementally assemble a message. Queries default to opcode QUERY with
/// recursion desired.
#[derive(Default)]
pub struct MessageBuilder {
    message: DnsMessage,
}

impl MessageBuilder {
    pub fn id(mut self, id: u16) -> Self {
        self.message.id = id;
        self
    }

    pub fn query(mut self) -> Self {
        self.message.qr = false;
        self.message.recursion_desired = true;
        self
    }

    pub fn response_to(mut self, query: &DnsMessage) -> Self {
        self.message.id = query.id;
        self.message.qr = true;
        self.message.opcode = query.opcode;
        self.message.recursion_desired = query.recursion_desired;
        self.message.questions = query.questions.clone();
        self
    }

    pub fn question(mut self, question: Question) -> Self {
        self.message.questions.push(question);
        self
    }

    pub fn answer(mut self, record: Record) -> Self {
        self.message.answers.push(record);
        self
    }

    pub fn authority(mut self, record: Record) -> Self {
        self.message.authorities.push(record);
        self
    }

    pub fn additional(mut self, record: Record) -> Self {
        self.message.additionals.push(record);
        self
    }

    pub fn rcode(mut self, rcode: ResponseCode) -> Self {
        self.message.rcode = rcode;
        self
    }

    pub fn authoritative(mut self, value: bool) -> Self {
        self.message.authoritative = value;
        self
    }

    pub fn recursion_available(mut self, value: bool) -> Self {
        self.message.recursion_available = value;
        self
    }

    pub fn recursion_desired(mut self, value: bool) -> Self {
        self.message.recursion_desired = value;
        self
    }

    pub fn checking_disabled(mut self, value: bool) -> Self {
        self.message.checking_disabled = value;
        self
    }

    pub fn edns(mut self, edns: Edns) -> Self {
        self.message.edns = Some(edns);
        self
    }

    /// Attach a default OPT record asking for DNSSEC records.
    pub fn dnssec_ok(mut self) -> Self {
        let mut edns = self.message.edns.take().unwrap_or_default();
        edns.set_dnssec_ok(true);
        self.message.edns = Some(edns);
        self
    }

    pub fn build(self) -> DnsMessage {
        self.message
    }
}
