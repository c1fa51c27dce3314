use crate::error::Result;
use crate::message::record::{RecordClass, RecordType};
use crate::message::wire::{WireReader, WireWriter};
use crate::name::DnsName;

/// One entry of the question section. Equality and hashing go through the
/// owner name's normalized form, so `WWW.Example.COM` and `www.example.com`
/// are the same question.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Question {
    pub name: DnsName,
    pub qtype: RecordType,
    pub qclass: RecordClass,
    /// mDNS unicast-response bit carried in the top bit of the class field.
    pub unicast: bool,
}

impl Question {
    pub fn new(name: DnsName, qtype: RecordType) -> Self {
        Question {
            name,
            qtype,
            qclass: RecordClass::In,
            unicast: false,
        }
    }

    pub(crate) fn parse(reader: &mut WireReader<'_>) -> Result<Self> {
        let name = reader.read_name()?;
        let qtype = RecordType::from_u16(reader.read_u16()?);
        let raw_class = reader.read_u16()?;
        Ok(Question {
            name,
            qtype,
            qclass: RecordClass::from_u16(raw_class & 0x7FFF),
            unicast: raw_class & 0x8000 != 0,
        })
    }

    pub(crate) fn write(&self, writer: &mut WireWriter) {
        writer.write_name(&self.name);
        writer.write_u16(self.qtype.to_u16());
        let mut class = self.qclass.to_u16();
        if self.unicast {
            class |= 0x8000;
        }
        writer.write_u16(class);
    }
}

impl std::fmt::Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {:?}", self.name, self.qtype, self.qclass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn case_insensitive_equality() {
        let a = Question::new(DnsName::parse("WWW.Example.COM").unwrap(), RecordType::A);
        let b = Question::new(DnsName::parse("www.example.com").unwrap(), RecordType::A);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn wire_round_trip() {
        let question = Question::new(DnsName::parse("example.com").unwrap(), RecordType::Aaaa);
        let mut writer = WireWriter::new();
        question.write(&mut writer);
        let bytes = writer.into_bytes();

        let parsed = Question::parse(&mut WireReader::new(&bytes)).unwrap();
        assert_eq!(parsed, question);
    }
}
