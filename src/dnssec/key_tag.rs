use crate::message::Dnskey;

/// Compute the key tag of a DNSKEY (RFC 4034 appendix B): a ones-complement
/// style checksum over the rdata. RSA/MD5 keys instead expose two octets of
/// the modulus (appendix B.1).
pub fn key_tag(dnskey: &Dnskey) -> u16 {
    let rdata = dnskey.rdata_wire();

    if dnskey.algorithm == super::algorithm::RSA_MD5 {
        if rdata.len() < 4 {
            return 0;
        }
        return u16::from_be_bytes([rdata[rdata.len() - 3], rdata[rdata.len() - 2]]);
    }

    let mut acc: u32 = 0;
    for (i, byte) in rdata.iter().enumerate() {
        acc += if i & 1 == 0 {
            (*byte as u32) << 8
        } else {
            *byte as u32
        };
    }
    acc += (acc >> 16) & 0xFFFF;
    (acc & 0xFFFF) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_over_rdata() {
        // rdata = 01 01 03 08 01 02 -> 0x0101 + 0x0308 + 0x0102 = 0x050B.
        let dnskey = Dnskey {
            flags: 0x0101,
            protocol: 3,
            algorithm: 8,
            public_key: vec![0x01, 0x02],
        };
        assert_eq!(key_tag(&dnskey), 0x050B);
    }

    #[test]
    fn odd_length_rdata() {
        // rdata = 01 01 03 08 FF -> 0x0101 + 0x0308 + 0xFF00 = 0x010309,
        // folded: 0x0309 + 0x01 = 0x030A.
        let dnskey = Dnskey {
            flags: 0x0101,
            protocol: 3,
            algorithm: 8,
            public_key: vec![0xFF],
        };
        assert_eq!(key_tag(&dnskey), 0x030A);
    }

    #[test]
    fn rsamd5_uses_modulus_octets() {
        let dnskey = Dnskey {
            flags: 0x0101,
            protocol: 3,
            algorithm: 1,
            public_key: vec![0x10, 0x20, 0x30, 0x40],
        };
        // Third- and second-to-last octets of the rdata: 0x20 0x30.
        assert_eq!(key_tag(&dnskey), 0x2030);
    }
}
