use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};

use crate::error::{DnsError, Result};

/// DNSSEC signature algorithm numbers (RFC 4034 appendix A.1 and updates).
pub const RSA_MD5: u8 = 1;
pub const DSA: u8 = 3;
pub const RSA_SHA1: u8 = 5;
pub const DSA_NSEC3_SHA1: u8 = 6;
pub const RSA_SHA1_NSEC3_SHA1: u8 = 7;
pub const RSA_SHA256: u8 = 8;
pub const RSA_SHA512: u8 = 10;
pub const ECDSA_P256_SHA256: u8 = 13;
pub const ECDSA_P384_SHA384: u8 = 14;
pub const ED25519: u8 = 15;
pub const ED448: u8 = 16;

/// Whether this build can verify signatures of the given algorithm.
pub fn is_supported(algorithm: u8) -> bool {
    matches!(
        algorithm,
        RSA_SHA1
            | RSA_SHA1_NSEC3_SHA1
            | RSA_SHA256
            | RSA_SHA512
            | ECDSA_P256_SHA256
            | ECDSA_P384_SHA384
            | ED25519
    )
}

/// Verify `signature` over `signed_data` with a DNSKEY public key. The key
/// is in its DNSKEY wire layout, which differs per algorithm family. Returns
/// an error both for malformed keys and for signatures that do not verify;
/// unsupported algorithms must be filtered out beforehand.
pub fn verify(
    algorithm: u8,
    public_key: &[u8],
    signed_data: &[u8],
    signature: &[u8],
) -> Result<()> {
    match algorithm {
        RSA_SHA1 | RSA_SHA1_NSEC3_SHA1 => verify_rsa(
            &signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY,
            public_key,
            signed_data,
            signature,
        ),
        RSA_SHA256 => verify_rsa(
            &signature::RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY,
            public_key,
            signed_data,
            signature,
        ),
        RSA_SHA512 => verify_rsa(
            &signature::RSA_PKCS1_1024_8192_SHA512_FOR_LEGACY_USE_ONLY,
            public_key,
            signed_data,
            signature,
        ),
        ECDSA_P256_SHA256 => verify_ecdsa(
            &signature::ECDSA_P256_SHA256_FIXED,
            64,
            public_key,
            signed_data,
            signature,
        ),
        ECDSA_P384_SHA384 => verify_ecdsa(
            &signature::ECDSA_P384_SHA384_FIXED,
            96,
            public_key,
            signed_data,
            signature,
        ),
        ED25519 => {
            UnparsedPublicKey::new(&signature::ED25519, public_key)
                .verify(signed_data, signature)
                .map_err(|_| bad_signature(algorithm))
        }
        other => Err(DnsError::ValidationFailed(format!(
            "algorithm {other} cannot be verified"
        ))),
    }
}

/// RSA keys use the RFC 3110 layout: a one- or three-octet exponent length,
/// the exponent, then the modulus.
fn verify_rsa(
    params: &'static signature::RsaParameters,
    public_key: &[u8],
    signed_data: &[u8],
    signature: &[u8],
) -> Result<()> {
    let (exponent, modulus) = split_rsa_key(public_key)?;
    RsaPublicKeyComponents {
        n: modulus,
        e: exponent,
    }
    .verify(params, signed_data, signature)
    .map_err(|_| DnsError::ValidationFailed("RSA signature does not verify".to_string()))
}

fn split_rsa_key(public_key: &[u8]) -> Result<(&[u8], &[u8])> {
    let malformed = || DnsError::ValidationFailed("malformed RSA public key".to_string());
    let first = *public_key.first().ok_or_else(malformed)?;
    let (exp_len, exp_start) = if first == 0 {
        if public_key.len() < 3 {
            return Err(malformed());
        }
        (
            u16::from_be_bytes([public_key[1], public_key[2]]) as usize,
            3,
        )
    } else {
        (first as usize, 1)
    };
    let mod_start = exp_start + exp_len;
    if mod_start >= public_key.len() {
        return Err(malformed());
    }
    Ok((
        &public_key[exp_start..mod_start],
        &public_key[mod_start..],
    ))
}

/// ECDSA keys on the wire are the bare x||y coordinates; ring wants the
/// uncompressed-point encoding with a 0x04 prefix. Signatures are the fixed
/// r||s concatenation either way.
fn verify_ecdsa(
    params: &'static signature::EcdsaVerificationAlgorithm,
    key_len: usize,
    public_key: &[u8],
    signed_data: &[u8],
    signature: &[u8],
) -> Result<()> {
    if public_key.len() != key_len {
        return Err(DnsError::ValidationFailed(
            "malformed ECDSA public key".to_string(),
        ));
    }
    let mut uncompressed = Vec::with_capacity(1 + key_len);
    uncompressed.push(0x04);
    uncompressed.extend_from_slice(public_key);
    UnparsedPublicKey::new(params, uncompressed)
        .verify(signed_data, signature)
        .map_err(|_| DnsError::ValidationFailed("ECDSA signature does not verify".to_string()))
}

fn bad_signature(algorithm: u8) -> DnsError {
    DnsError::ValidationFailed(format!(
        "signature with algorithm {algorithm} does not verify"
    ))
}
