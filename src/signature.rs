//! Signature and public key checks
//!
//! Two halves:
//! - encoding rules applied by the interpreter before any curve arithmetic
//!   (strict DER, low S, hash type, pubkey type, Schnorr sizes)
//! - the [`SignatureVerifier`] seam that does the curve arithmetic
//!
//! ECDSA goes through libsecp256k1 with lax DER parsing and S normalized
//! before verification. BCH Schnorr (64-byte `r || s`) is verified with k256:
//! `e = H(r || P || m)`, `R = sG - eP`, accept when `R` is finite, `x(R) = r`
//! and `y(R)` is a quadratic residue.

use crate::error::{CryptoError, ScriptError};
use crate::flags::ScriptFlags;
use crate::hashing::sha256;
use crate::sighash::SigHashType;
use crate::types::Hash;
use k256::elliptic_curve::bigint::U256;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, FieldElement, ProjectivePoint, Scalar};
use secp256k1::{ecdsa, Message, PublicKey, Secp256k1, VerifyOnly};

/// Length of a BCH Schnorr signature without its hash type byte.
pub const SCHNORR_SIGNATURE_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    Ecdsa,
    Schnorr,
}

impl SignatureScheme {
    /// Scheme of a signature with its hash type byte already removed.
    pub fn for_signature(signature: &[u8]) -> Self {
        if signature.len() == SCHNORR_SIGNATURE_SIZE {
            SignatureScheme::Schnorr
        } else {
            SignatureScheme::Ecdsa
        }
    }
}

/// Curve-level verification of a signature over a 32-byte digest.
///
/// `Ok(false)` is an honest mismatch; `Err` reports inputs that could not be
/// parsed. The interpreter treats both as a failed check.
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        scheme: SignatureScheme,
        pubkey: &[u8],
        signature: &[u8],
        digest: &Hash,
    ) -> Result<bool, CryptoError>;
}

/// Default verifier backed by libsecp256k1 and k256.
pub struct Secp256k1Verifier {
    secp: Secp256k1<VerifyOnly>,
}

impl Secp256k1Verifier {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }

    fn verify_ecdsa(&self, pubkey: &[u8], der: &[u8], digest: &Hash) -> Result<bool, CryptoError> {
        let pubkey = PublicKey::from_slice(pubkey).map_err(|_| CryptoError::InvalidPublicKey)?;
        let mut signature =
            ecdsa::Signature::from_der_lax(der).map_err(|_| CryptoError::InvalidSignature)?;
        // libsecp256k1 only accepts low S
        signature.normalize_s();
        let message = Message::from_digest(*digest);
        Ok(self.secp.verify_ecdsa(&message, &signature, &pubkey).is_ok())
    }
}

impl Default for Secp256k1Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Secp256k1Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secp256k1Verifier")
    }
}

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(
        &self,
        scheme: SignatureScheme,
        pubkey: &[u8],
        signature: &[u8],
        digest: &Hash,
    ) -> Result<bool, CryptoError> {
        match scheme {
            SignatureScheme::Ecdsa => self.verify_ecdsa(pubkey, signature, digest),
            SignatureScheme::Schnorr => verify_schnorr(pubkey, signature, digest),
        }
    }
}

/// Challenge `e = SHA256(r || compressed(P) || m) mod n`.
pub fn schnorr_challenge(r: &[u8], compressed_pubkey: &[u8], digest: &Hash) -> Scalar {
    let mut preimage = Vec::with_capacity(32 + 33 + 32);
    preimage.extend_from_slice(r);
    preimage.extend_from_slice(compressed_pubkey);
    preimage.extend_from_slice(digest);
    let e = sha256(&preimage);
    <Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(&e))
}

/// BCH Schnorr verification.
pub fn verify_schnorr(pubkey: &[u8], signature: &[u8], digest: &Hash) -> Result<bool, CryptoError> {
    if signature.len() != SCHNORR_SIGNATURE_SIZE {
        return Err(CryptoError::InvalidSignature);
    }
    let point =
        k256::PublicKey::from_sec1_bytes(pubkey).map_err(|_| CryptoError::InvalidPublicKey)?;
    let (r, s) = signature.split_at(32);

    // s >= n is rejected outright
    let s = match Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(s))) {
        Some(s) => s,
        None => return Ok(false),
    };

    let compressed = point.to_encoded_point(true);
    let e = schnorr_challenge(r, compressed.as_bytes(), digest);
    let big_r = ProjectivePoint::GENERATOR * s - ProjectivePoint::from(*point.as_affine()) * e;
    let encoded = big_r.to_affine().to_encoded_point(false);

    let (x, y) = match (encoded.x(), encoded.y()) {
        (Some(x), Some(y)) => (x, y),
        // Point at infinity
        _ => return Ok(false),
    };
    if x.as_slice() != r {
        return Ok(false);
    }
    let y = match Option::<FieldElement>::from(FieldElement::from_bytes(y)) {
        Some(y) => y,
        None => return Ok(false),
    };
    Ok(bool::from(y.sqrt().is_some()))
}

/// Strict DER layout of an ECDSA signature without hash type byte:
/// `0x30 len 0x02 lenR R 0x02 lenS S`, with minimal, positive integers.
pub fn is_valid_der_encoding(sig: &[u8]) -> bool {
    let len = sig.len();
    if !(8..=72).contains(&len) {
        return false;
    }
    if sig[0] != 0x30 || usize::from(sig[1]) != len - 2 {
        return false;
    }
    let len_r = usize::from(sig[3]);
    if 5 + len_r >= len {
        return false;
    }
    let len_s = usize::from(sig[5 + len_r]);
    if len_r + len_s + 6 != len {
        return false;
    }

    if sig[2] != 0x02 || len_r == 0 || sig[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }

    if sig[len_r + 4] != 0x02 || len_s == 0 || sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0 {
        return false;
    }
    true
}

/// S is at most half the curve order.
pub fn is_low_der_signature(sig: &[u8]) -> Result<bool, ScriptError> {
    if !is_valid_der_encoding(sig) {
        return Err(ScriptError::SigDer);
    }
    let parsed = ecdsa::Signature::from_der_lax(sig).map_err(|_| ScriptError::SigDer)?;
    let mut normalized = parsed;
    normalized.normalize_s();
    Ok(normalized == parsed)
}

/// 33-byte 02/03 or 65-byte 04 SEC1 encoding.
pub fn is_compressed_or_uncompressed_pubkey(pubkey: &[u8]) -> bool {
    match pubkey.first() {
        Some(0x02 | 0x03) => pubkey.len() == 33,
        Some(0x04) => pubkey.len() == 65,
        _ => false,
    }
}

pub fn is_schnorr_signature(sig: &[u8]) -> bool {
    sig.len() == SCHNORR_SIGNATURE_SIZE
}

fn check_raw_signature_encoding(sig: &[u8], flags: ScriptFlags) -> Result<(), ScriptError> {
    if is_schnorr_signature(sig) {
        return Ok(());
    }
    let der_rules = ScriptFlags::DERSIG | ScriptFlags::LOW_S | ScriptFlags::STRICTENC;
    if flags.bits() & der_rules.bits() != 0 && !is_valid_der_encoding(sig) {
        return Err(ScriptError::SigDer);
    }
    if flags.contains(ScriptFlags::LOW_S) && !is_low_der_signature(sig)? {
        return Err(ScriptError::SigHighS);
    }
    Ok(())
}

fn check_sighash_encoding(sig: &[u8], flags: ScriptFlags) -> Result<(), ScriptError> {
    if !flags.contains(ScriptFlags::STRICTENC) {
        return Ok(());
    }
    let hash_type = SigHashType::from_signature(sig).ok_or(ScriptError::SigHashType)?;
    if !hash_type.is_defined() {
        return Err(ScriptError::SigHashType);
    }
    let forkid_enabled = flags.contains(ScriptFlags::SIGHASH_FORKID);
    if !forkid_enabled && hash_type.has_forkid() {
        return Err(ScriptError::IllegalForkId);
    }
    if forkid_enabled && !hash_type.has_forkid() {
        return Err(ScriptError::MustUseForkId);
    }
    if hash_type.has_utxos()
        && (!flags.contains(ScriptFlags::TOKENS) || hash_type.has_anyone_can_pay())
    {
        return Err(ScriptError::SigHashType);
    }
    Ok(())
}

/// Checks for a signature consumed by OP_CHECKDATASIG: no hash type byte.
pub fn check_data_signature_encoding(sig: &[u8], flags: ScriptFlags) -> Result<(), ScriptError> {
    if sig.is_empty() {
        return Ok(());
    }
    check_raw_signature_encoding(sig, flags)
}

/// Checks for a transaction signature (last byte is the hash type).
pub fn check_transaction_signature_encoding(
    sig: &[u8],
    flags: ScriptFlags,
) -> Result<(), ScriptError> {
    let Some((_, raw)) = sig.split_last() else {
        // Empty signatures are allowed and simply fail
        return Ok(());
    };
    check_raw_signature_encoding(raw, flags)?;
    check_sighash_encoding(sig, flags)
}

/// Legacy CHECKMULTISIG: Schnorr-sized signatures are refused.
pub fn check_transaction_ecdsa_signature_encoding(
    sig: &[u8],
    flags: ScriptFlags,
) -> Result<(), ScriptError> {
    if sig.is_empty() {
        return Ok(());
    }
    if is_schnorr_signature(&sig[..sig.len() - 1]) {
        return Err(ScriptError::SigBadLength);
    }
    check_transaction_signature_encoding(sig, flags)
}

/// Bitfield CHECKMULTISIG: only Schnorr signatures.
pub fn check_transaction_schnorr_signature_encoding(
    sig: &[u8],
    flags: ScriptFlags,
) -> Result<(), ScriptError> {
    if sig.len() != SCHNORR_SIGNATURE_SIZE + 1 {
        return Err(ScriptError::SigNonSchnorr);
    }
    check_transaction_signature_encoding(sig, flags)
}

pub fn check_pubkey_encoding(pubkey: &[u8], flags: ScriptFlags) -> Result<(), ScriptError> {
    if flags.contains(ScriptFlags::STRICTENC) && !is_compressed_or_uncompressed_pubkey(pubkey) {
        return Err(ScriptError::PubkeyType);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::*;
    use crate::sighash::{SIGHASH_ALL, SIGHASH_FORKID};
    use secp256k1::SecretKey;

    fn strict() -> ScriptFlags {
        ScriptFlags::from_verify_flags(VERIFY_STRICTENC | VERIFY_DERSIG | VERIFY_LOW_S | VERIFY_SIGHASH_FORKID)
    }

    fn schnorr_sign(secret: &[u8; 32], digest: &Hash) -> Vec<u8> {
        let x = Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(secret))).unwrap();
        let pubkey = (ProjectivePoint::GENERATOR * x).to_affine().to_encoded_point(true);
        let nonce = sha256(&[secret.as_slice(), digest.as_slice()].concat());
        let mut k = <Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(&nonce));
        let r_point = (ProjectivePoint::GENERATOR * k).to_affine().to_encoded_point(false);
        let y = FieldElement::from_bytes(r_point.y().unwrap()).unwrap();
        if !bool::from(y.sqrt().is_some()) {
            k = -k;
        }
        let r = r_point.x().unwrap().to_vec();
        let e = schnorr_challenge(&r, pubkey.as_bytes(), digest);
        let s = k + e * x;
        [r, s.to_bytes().to_vec()].concat()
    }

    fn ecdsa_fixture() -> (Vec<u8>, Vec<u8>, Hash) {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x21; 32]).unwrap();
        let pubkey = PublicKey::from_secret_key(&secp, &secret).serialize().to_vec();
        let digest = sha256(b"ecdsa fixture");
        let sig = secp.sign_ecdsa(&Message::from_digest(digest), &secret);
        (pubkey, sig.serialize_der().to_vec(), digest)
    }

    #[test]
    fn test_ecdsa_verifies() {
        let (pubkey, der, digest) = ecdsa_fixture();
        let verifier = Secp256k1Verifier::new();
        assert!(verifier.verify(SignatureScheme::Ecdsa, &pubkey, &der, &digest).unwrap());
        let other = sha256(b"something else");
        assert!(!verifier.verify(SignatureScheme::Ecdsa, &pubkey, &der, &other).unwrap());
        assert_eq!(
            verifier.verify(SignatureScheme::Ecdsa, &[0x02; 5], &der, &digest),
            Err(CryptoError::InvalidPublicKey)
        );
    }

    #[test]
    fn test_schnorr_verifies() {
        let secret = [0x42u8; 32];
        let digest = sha256(b"schnorr fixture");
        let sig = schnorr_sign(&secret, &digest);
        let x = Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(&secret))).unwrap();
        let pubkey = (ProjectivePoint::GENERATOR * x).to_affine().to_encoded_point(true);

        assert_eq!(SignatureScheme::for_signature(&sig), SignatureScheme::Schnorr);
        assert!(verify_schnorr(pubkey.as_bytes(), &sig, &digest).unwrap());

        let mut tampered = sig.clone();
        tampered[63] ^= 0x01;
        assert!(!verify_schnorr(pubkey.as_bytes(), &tampered, &digest).unwrap());
        assert!(!verify_schnorr(pubkey.as_bytes(), &sig, &sha256(b"x")).unwrap());
    }

    #[test]
    fn test_schnorr_rejects_s_above_order() {
        let secret = [0x42u8; 32];
        let digest = sha256(b"schnorr fixture");
        let mut sig = schnorr_sign(&secret, &digest);
        sig[32..].copy_from_slice(&[0xff; 32]);
        let x = Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(&secret))).unwrap();
        let pubkey = (ProjectivePoint::GENERATOR * x).to_affine().to_encoded_point(true);
        assert!(!verify_schnorr(pubkey.as_bytes(), &sig, &digest).unwrap());
    }

    #[test]
    fn test_der_encoding_rules() {
        let (_, der, _) = ecdsa_fixture();
        assert!(is_valid_der_encoding(&der));
        assert!(is_low_der_signature(&der).unwrap());

        let mut bad = der.clone();
        bad[0] = 0x31;
        assert!(!is_valid_der_encoding(&bad));
        assert!(!is_valid_der_encoding(&der[..7]));
        // Negative R
        let mut negative = der.clone();
        negative[4] |= 0x80;
        assert!(!is_valid_der_encoding(&negative));
    }

    #[test]
    fn test_transaction_signature_encoding() {
        let (_, der, _) = ecdsa_fixture();
        let flags = strict();

        let mut sig = der.clone();
        sig.push((SIGHASH_ALL | SIGHASH_FORKID) as u8);
        assert_eq!(check_transaction_signature_encoding(&sig, flags), Ok(()));

        let mut no_forkid = der.clone();
        no_forkid.push(SIGHASH_ALL as u8);
        assert_eq!(
            check_transaction_signature_encoding(&no_forkid, flags),
            Err(ScriptError::MustUseForkId)
        );

        let legacy = ScriptFlags::from_verify_flags(VERIFY_STRICTENC);
        assert_eq!(
            check_transaction_signature_encoding(&sig, legacy),
            Err(ScriptError::IllegalForkId)
        );

        let mut undefined = der.clone();
        undefined.push(0x44);
        assert_eq!(
            check_transaction_signature_encoding(&undefined, flags),
            Err(ScriptError::SigHashType)
        );

        let mut utxos = der;
        utxos.push(0x61);
        assert_eq!(
            check_transaction_signature_encoding(&utxos, flags),
            Err(ScriptError::SigHashType)
        );
        let with_tokens = flags | ScriptFlags::TOKENS;
        assert_eq!(check_transaction_signature_encoding(&utxos, with_tokens), Ok(()));

        assert_eq!(check_transaction_signature_encoding(&[], flags), Ok(()));
    }

    #[test]
    fn test_multisig_size_rules() {
        let flags = strict();
        let mut schnorr_sized = vec![0u8; 64];
        schnorr_sized.push(0x41);
        assert_eq!(
            check_transaction_ecdsa_signature_encoding(&schnorr_sized, flags),
            Err(ScriptError::SigBadLength)
        );
        assert_eq!(
            check_transaction_schnorr_signature_encoding(&schnorr_sized[..10], flags),
            Err(ScriptError::SigNonSchnorr)
        );
        assert_eq!(check_transaction_schnorr_signature_encoding(&schnorr_sized, flags), Ok(()));
    }

    #[test]
    fn test_pubkey_encoding() {
        let flags = strict();
        assert!(check_pubkey_encoding(&[0x02; 33], flags).is_ok());
        let mut uncompressed = vec![0x04];
        uncompressed.extend_from_slice(&[1u8; 64]);
        assert!(check_pubkey_encoding(&uncompressed, flags).is_ok());
        assert_eq!(check_pubkey_encoding(&[0x05; 33], flags), Err(ScriptError::PubkeyType));
        assert_eq!(check_pubkey_encoding(&[0x02; 32], flags), Err(ScriptError::PubkeyType));
        assert!(check_pubkey_encoding(&[0x05; 3], ScriptFlags::empty()).is_ok());
    }

    #[test]
    fn test_high_s_rejected() {
        let (_, der, _) = ecdsa_fixture();
        let parsed = ecdsa::Signature::from_der(&der).unwrap();
        let compact = parsed.serialize_compact();
        // n - s
        let order: [u8; 32] = [
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xfe, 0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c,
            0xd0, 0x36, 0x41, 0x41,
        ];
        let mut high_s = [0u8; 32];
        let mut borrow = 0i16;
        for i in (0..32).rev() {
            let diff = i16::from(order[i]) - i16::from(compact[32 + i]) - borrow;
            borrow = i16::from(diff < 0);
            high_s[i] = (diff + 256 * borrow) as u8;
        }
        let mut compact_high = compact;
        compact_high[32..].copy_from_slice(&high_s);
        let high = ecdsa::Signature::from_compact(&compact_high).unwrap();
        let high_der = high.serialize_der().to_vec();

        assert!(!is_low_der_signature(&high_der).unwrap());
        let mut sig = high_der;
        sig.push((SIGHASH_ALL | SIGHASH_FORKID) as u8);
        assert_eq!(
            check_transaction_signature_encoding(&sig, strict()),
            Err(ScriptError::SigHighS)
        );
    }
}
