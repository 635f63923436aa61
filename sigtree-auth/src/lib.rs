use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sigtree_hash::{h_concat, keccak256, DIGEST_LEN};
use sigtree_merkle::verify_proof;
use thiserror::Error;

pub const SIGNATURE_LEN: usize = 65; // r (32) || s (32) || v (1)
pub const ADDRESS_LEN: usize = 20;

/// 20-byte signer identity: keccak256 of the uncompressed public key
/// (prefix byte dropped), last 20 bytes.
pub type Address = [u8; ADDRESS_LEN];

// Preimages for the structured-hash type constants
const DOMAIN_TYPE: &[u8] = b"Domain(string name,string version,bytes32 context)";
const ROOT_TYPE: &[u8] = b"AuthorizedRoot(bytes32 root)";

/// Field layout of the one claim shape the CLI ships: an order selected for
/// one account. Library callers bring their own type hashes.
pub const ORDER_CLAIM_TYPE: &[u8] = b"OrderClaim(bytes32 orderId,address account)";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The leaf digest does not recompute to the committed root.
    #[error("leaf is not a member of the committed tree")]
    NotInTree,
    /// Recovered signer differs from the expected one, or no signer could
    /// be recovered at all.
    #[error("signature does not authorize this root")]
    Unauthorized,
    /// Signature bytes violate the 65-byte r||s||v layout.
    #[error("malformed signature: {0}")]
    MalformedSignature(&'static str),
}

/// Hash binding a signing context (scheme name, version, verifying-context
/// identity) so signatures cannot be replayed across unrelated contexts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSeparator([u8; DIGEST_LEN]);

impl DomainSeparator {
    pub fn new(name: &str, version: &str, context: &[u8; DIGEST_LEN]) -> Self {
        let sep = h_concat(&[
            &keccak256(DOMAIN_TYPE),
            &keccak256(name.as_bytes()),
            &keccak256(version.as_bytes()),
            context,
        ]);
        Self(sep)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

/// Inner structured hash: type hash followed by the encoded fields in order.
pub fn struct_hash(type_hash: &[u8; DIGEST_LEN], fields: &[&[u8]]) -> [u8; DIGEST_LEN] {
    let mut parts: Vec<&[u8]> = Vec::with_capacity(fields.len() + 1);
    parts.push(type_hash);
    parts.extend_from_slice(fields);
    h_concat(&parts)
}

/// Outer structured hash: `keccak256(0x19 || 0x01 || domain || inner)`.
pub fn typed_digest(domain: &DomainSeparator, inner: &[u8; DIGEST_LEN]) -> [u8; DIGEST_LEN] {
    h_concat(&[&[0x19, 0x01], domain.as_bytes(), inner])
}

/// ECDSA signature in recoverable wire form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoverableSignature {
    r: [u8; 32],
    s: [u8; 32],
    v: u8, // normalized to 0 or 1
}

impl RecoverableSignature {
    /// Strict parse of the 65-byte `r || s || v` layout. `v` of 27/28 is
    /// normalized to 0/1; anything outside {0, 1, 27, 28} is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AuthError> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(AuthError::MalformedSignature("expected 65 bytes"));
        }
        let v = match bytes[64] {
            v @ (0 | 1) => v,
            v @ (27 | 28) => v - 27,
            _ => return Err(AuthError::MalformedSignature("recovery id out of range")),
        };
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v })
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        let mut out = [0u8; SIGNATURE_LEN];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    /// Recover the signing address over a prehashed digest. Scalars that do
    /// not form a valid signature yield `Unauthorized`: no signer can be
    /// attributed to them.
    pub fn recover(&self, digest: &[u8; DIGEST_LEN]) -> Result<Address, AuthError> {
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r);
        rs[32..].copy_from_slice(&self.s);
        let sig = Signature::from_slice(&rs).map_err(|_| AuthError::Unauthorized)?;
        let recid = RecoveryId::from_byte(self.v).ok_or(AuthError::Unauthorized)?;
        let key = VerifyingKey::recover_from_prehash(digest, &sig, recid)
            .map_err(|_| AuthError::Unauthorized)?;
        Ok(signer_address(&key))
    }
}

/// Address of a verifying key: last 20 bytes of the keccak256 of the
/// uncompressed SEC1 encoding without its 0x04 prefix.
pub fn signer_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut addr = [0u8; ADDRESS_LEN];
    addr.copy_from_slice(&digest[DIGEST_LEN - ADDRESS_LEN..]);
    addr
}

/// Composite membership + signature check bound to one domain separator.
///
/// A producer signs the digest of the tree root once ("batch
/// authorization"); a verifier holding one leaf, its proof, the root and
/// that signature establishes membership and authorization in one call. The
/// signature deliberately covers the root rather than the leaf: the proof
/// narrows the batch down to the presented leaf.
#[derive(Clone, Copy, Debug)]
pub struct Authorizer {
    domain: DomainSeparator,
}

impl Authorizer {
    pub fn new(domain: DomainSeparator) -> Self {
        Self { domain }
    }

    pub fn domain(&self) -> &DomainSeparator {
        &self.domain
    }

    /// Digest used as the tree leaf for one authorization request, binding
    /// the request's semantic fields to this domain.
    pub fn leaf_digest(&self, type_hash: &[u8; DIGEST_LEN], fields: &[&[u8]]) -> [u8; DIGEST_LEN] {
        typed_digest(&self.domain, &struct_hash(type_hash, fields))
    }

    /// Digest a producer signs to authorize every leaf under `root`.
    pub fn root_digest(&self, root: &[u8]) -> [u8; DIGEST_LEN] {
        typed_digest(&self.domain, &struct_hash(&keccak256(ROOT_TYPE), &[root]))
    }

    /// Sign a root with an explicit key handle. Producer-side counterpart
    /// of `authorize`; key material is always passed in, never ambient.
    pub fn sign_root(
        &self,
        key: &SigningKey,
        root: &[u8],
    ) -> Result<RecoverableSignature, AuthError> {
        let digest = self.root_digest(root);
        let (sig, recid) = key
            .sign_prehash_recoverable(&digest)
            .map_err(|_| AuthError::Unauthorized)?;
        let rs = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&rs[..32]);
        s.copy_from_slice(&rs[32..]);
        Ok(RecoverableSignature { r, s, v: recid.to_byte() })
    }

    /// Two-factor check: leaf membership under `root`, then signer recovery
    /// over the root digest. Short-circuits on the first failure; retains
    /// no state between calls.
    pub fn authorize(
        &self,
        type_hash: &[u8; DIGEST_LEN],
        fields: &[&[u8]],
        proof: &[Vec<u8>],
        root: &[u8],
        signature: &[u8],
        expected_signer: &Address,
    ) -> Result<(), AuthError> {
        let leaf = self.leaf_digest(type_hash, fields);
        if !verify_proof(&leaf, proof, root) {
            return Err(AuthError::NotInTree);
        }
        let sig = RecoverableSignature::from_bytes(signature)?;
        let recovered = sig.recover(&self.root_digest(root))?;
        if recovered != *expected_signer {
            return Err(AuthError::Unauthorized);
        }
        Ok(())
    }
}
