//! Key generation and PKCS#10 certificate requests.
//!
//! The request subject carries the username as CN and one O attribute per
//! group, which is how the API server maps client certificates to users and
//! groups.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::{rand::SystemRandom, signature::RsaKeyPair};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use simple_asn1::{oid, ASN1Block, ASN1Class, BigInt, BigUint, OID};

use crate::errors::{Error, Result};

pub const RSA_KEY_BITS: usize = 2048;

const PEM_LINE_WIDTH: usize = 64;

/// Freshly generated private key and the request signed with it
#[derive(Clone)]
pub struct KeyMaterial {
    /// PKCS#1 `RSA PRIVATE KEY` PEM
    pub private_key_pem: String,
    /// PKCS#10 `CERTIFICATE REQUEST` PEM
    pub request_pem: String,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial").field("request_pem", &self.request_pem).finish_non_exhaustive()
    }
}

/// Generate an RSA key and a SHA-256 signed request for `common_name` / `organizations`.
///
/// CPU bound; call from a blocking task.
pub fn generate(common_name: &str, organizations: &[String]) -> Result<KeyMaterial> {
    let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_KEY_BITS)
        .map_err(|e| Error::issuance_with_source("failed to generate RSA key", Box::new(e)))?;

    let pkcs8 = private_key
        .to_pkcs8_der()
        .map_err(|e| Error::issuance_with_source("failed to encode private key", Box::new(e)))?;
    let key_pair = RsaKeyPair::from_pkcs8(pkcs8.as_bytes())
        .map_err(|e| Error::issuance(format!("failed to load generated key: {}", e)))?;

    let request_der = build_request(&key_pair, common_name, organizations)?;

    let private_key_pem = private_key
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| Error::issuance_with_source("failed to encode private key", Box::new(e)))?
        .to_string();

    Ok(KeyMaterial { private_key_pem, request_pem: pem_encode("CERTIFICATE REQUEST", &request_der) })
}

fn build_request(key_pair: &RsaKeyPair, common_name: &str, organizations: &[String]) -> Result<Vec<u8>> {
    let info = ASN1Block::Sequence(
        0,
        vec![
            ASN1Block::Integer(0, BigInt::from(0)),
            subject_name(common_name, organizations),
            public_key_info(key_pair),
            // attributes [0], empty
            ASN1Block::Unknown(ASN1Class::ContextSpecific, true, 0, BigUint::from(0u8), Vec::new()),
        ],
    );
    let info_der = to_der(&info)?;

    let rng = SystemRandom::new();
    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(&ring::signature::RSA_PKCS1_SHA256, &rng, &info_der, &mut signature)
        .map_err(|_| Error::issuance("failed to sign certificate request"))?;

    let request = ASN1Block::Sequence(
        0,
        vec![
            info,
            algorithm(oid!(1, 2, 840, 113549, 1, 1, 11)),
            ASN1Block::BitString(0, signature.len() * 8, signature),
        ],
    );
    to_der(&request)
}

fn subject_name(common_name: &str, organizations: &[String]) -> ASN1Block {
    let mut rdns = vec![attribute(oid!(2, 5, 4, 3), common_name)];
    rdns.extend(organizations.iter().map(|org| attribute(oid!(2, 5, 4, 10), org)));
    ASN1Block::Sequence(0, rdns)
}

fn attribute(kind: OID, value: &str) -> ASN1Block {
    ASN1Block::Set(
        0,
        vec![ASN1Block::Sequence(
            0,
            vec![ASN1Block::ObjectIdentifier(0, kind), ASN1Block::UTF8String(0, value.to_string())],
        )],
    )
}

fn algorithm(kind: OID) -> ASN1Block {
    ASN1Block::Sequence(0, vec![ASN1Block::ObjectIdentifier(0, kind), ASN1Block::Null(0)])
}

fn public_key_info(key_pair: &RsaKeyPair) -> ASN1Block {
    let public_key = key_pair.public().as_ref().to_vec();
    ASN1Block::Sequence(
        0,
        vec![
            algorithm(oid!(1, 2, 840, 113549, 1, 1, 1)),
            ASN1Block::BitString(0, public_key.len() * 8, public_key),
        ],
    )
}

fn to_der(block: &ASN1Block) -> Result<Vec<u8>> {
    simple_asn1::to_der(block)
        .map_err(|e| Error::issuance(format!("failed to encode certificate request: {}", e)))
}

/// Wrap DER bytes in a PEM block
pub fn pem_encode(label: &str, der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {}-----\n", label);
    for chunk in body.as_bytes().chunks(PEM_LINE_WIDTH) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {}-----\n", label));
    pem
}
