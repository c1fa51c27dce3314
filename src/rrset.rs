use crate::message::{Record, RecordClass, RecordType};
use crate::name::DnsName;

/// A set of records sharing owner, type and class. The first member fixes
/// the key; records that do not match it are refused, so a constructed set
/// can never be heterogeneous.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RrSet {
    name: DnsName,
    rtype: RecordType,
    class: RecordClass,
    records: Vec<Record>,
}

impl RrSet {
    pub fn new(first: Record) -> Self {
        RrSet {
            name: first.name.clone(),
            rtype: first.rtype(),
            class: first.class,
            records: vec![first],
        }
    }

    pub fn name(&self) -> &DnsName {
        &self.name
    }

    pub fn rtype(&self) -> RecordType {
        self.rtype
    }

    pub fn class(&self) -> RecordClass {
        self.class
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add a record if it belongs to this set's key; returns whether it was
    /// taken.
    pub fn try_insert(&mut self, record: Record) -> bool {
        if record.name == self.name && record.rtype() == self.rtype && record.class == self.class {
            self.records.push(record);
            true
        } else {
            false
        }
    }

    /// Group a flat record list into its RRsets, preserving first-seen
    /// order. RRSIGs are grouped like any other type; signature matching
    /// happens at validation time.
    pub fn partition(records: &[Record]) -> Vec<RrSet> {
        let mut sets: Vec<RrSet> = Vec::new();
        for record in records {
            if !sets.iter_mut().any(|set| set.try_insert(record.clone())) {
                sets.push(RrSet::new(record.clone()));
            }
        }
        sets
    }
}
