//! Shared fixtures: keys, standard scripts and signing helpers

#![allow(dead_code)]

use cash_consensus::context::ScriptExecutionContext;
use cash_consensus::hashing::{hash160, sha256};
use cash_consensus::opcodes::*;
use cash_consensus::script::{Script, ScriptBuilder};
use cash_consensus::sighash::{compute_sighash, SigHashType};
use cash_consensus::signature::schnorr_challenge;
use cash_consensus::{Hash, Input, OutPoint, Output, ScriptFlags, Transaction};
use k256::elliptic_curve::bigint::U256;
use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, FieldElement, ProjectivePoint, Scalar};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

pub struct Key {
    pub secret: [u8; 32],
}

impl Key {
    pub fn new(seed: u8) -> Self {
        Self { secret: [seed; 32] }
    }

    /// Compressed SEC1 public key.
    pub fn pubkey(&self) -> Vec<u8> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&self.secret).unwrap();
        PublicKey::from_secret_key(&secp, &secret).serialize().to_vec()
    }

    pub fn uncompressed_pubkey(&self) -> Vec<u8> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&self.secret).unwrap();
        PublicKey::from_secret_key(&secp, &secret)
            .serialize_uncompressed()
            .to_vec()
    }

    /// Low-S DER signature over `digest`, without hash type.
    pub fn sign_ecdsa(&self, digest: &Hash) -> Vec<u8> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&self.secret).unwrap();
        secp.sign_ecdsa(&Message::from_digest(*digest), &secret)
            .serialize_der()
            .to_vec()
    }

    /// 64-byte BCH Schnorr signature over `digest`, without hash type.
    pub fn sign_schnorr(&self, digest: &Hash) -> Vec<u8> {
        let x = Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(&self.secret)))
            .unwrap();
        let pubkey = self.pubkey();
        let nonce = sha256(&[self.secret.as_slice(), digest.as_slice()].concat());
        let mut k = <Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(&nonce));
        let r_point = (ProjectivePoint::GENERATOR * k)
            .to_affine()
            .to_encoded_point(false);
        let y = FieldElement::from_bytes(r_point.y().unwrap()).unwrap();
        if !bool::from(y.sqrt().is_some()) {
            k = -k;
        }
        let r = r_point.x().unwrap().to_vec();
        let e = schnorr_challenge(&r, &pubkey, digest);
        let s = k + e * x;
        [r, s.to_bytes().to_vec()].concat()
    }
}

pub fn p2pkh(pubkey: &[u8]) -> Script {
    ScriptBuilder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(&hash160(pubkey))
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

pub fn p2sh(redeem_script: &Script) -> Script {
    ScriptBuilder::new()
        .push_opcode(OP_HASH160)
        .push_slice(&hash160(redeem_script.as_bytes()))
        .push_opcode(OP_EQUAL)
        .into_script()
}

/// One-input, one-output version 2 transaction with an empty unlocking script.
pub fn spending_tx() -> Transaction {
    Transaction {
        version: 2,
        inputs: vec![Input {
            prevout: OutPoint {
                hash: [0xab; 32],
                index: 0,
            },
            script: Script::default(),
            sequence: 0xffff_fffe,
        }],
        outputs: vec![Output::new(90_000, p2pkh(&Key::new(0x77).pubkey()))],
        lock_time: 0,
    }
}

/// Signature digest for input 0 of `tx` with the given script code.
pub fn sighash(
    tx: &Transaction,
    prevout: &Output,
    script_code: &Script,
    hash_type: u32,
    verify_flags: u32,
) -> Hash {
    let ctx = ScriptExecutionContext::new(tx, 0, prevout).unwrap();
    compute_sighash(
        &ctx,
        script_code,
        SigHashType::from_raw(hash_type),
        ScriptFlags::from_verify_flags(verify_flags),
    )
    .unwrap()
}

/// Transaction signature: raw signature followed by the hash type byte.
pub fn with_hash_type(mut sig: Vec<u8>, hash_type: u32) -> Vec<u8> {
    sig.push(hash_type as u8);
    sig
}
