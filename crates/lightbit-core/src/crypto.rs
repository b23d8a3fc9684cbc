//! ECDSA verification over secp256k1.

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, VerifyOnly};
use std::sync::OnceLock;

fn secp() -> &'static Secp256k1<VerifyOnly> {
    static SECP: OnceLock<Secp256k1<VerifyOnly>> = OnceLock::new();
    SECP.get_or_init(Secp256k1::verification_only)
}

/// Verify a DER signature over a 32-byte message hash.
///
/// Never fails with an error: malformed hashes, signatures or public keys
/// simply return `false`. Historical chain signatures are accepted via lax
/// DER parsing, and high-S signatures are normalized before verification.
pub fn ecdsa_verify(hash: &[u8], sig_der: &[u8], pubkey: &[u8]) -> bool {
    let Ok(message) = Message::from_digest_slice(hash) else {
        return false;
    };
    let Ok(mut signature) = Signature::from_der_lax(sig_der) else {
        return false;
    };
    let Ok(key) = PublicKey::from_slice(pubkey) else {
        return false;
    };
    signature.normalize_s();
    secp().verify_ecdsa(&message, &signature, &key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;
    use secp256k1::SecretKey;

    fn keypair() -> (SecretKey, PublicKey) {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x42u8; 32]).unwrap();
        let public = PublicKey::from_secret_key(&secp, &secret);
        (secret, public)
    }

    #[test]
    fn test_valid_signature() {
        let secp = Secp256k1::new();
        let (secret, public) = keypair();
        let hash = sha256(b"spend");
        let message = Message::from_digest_slice(&hash).unwrap();
        let signature = secp.sign_ecdsa(&message, &secret).serialize_der();

        assert!(ecdsa_verify(&hash, &signature, &public.serialize()));
    }

    #[test]
    fn test_corrupt_signature_returns_false() {
        let secp = Secp256k1::new();
        let (secret, public) = keypair();
        let hash = sha256(b"spend");
        let message = Message::from_digest_slice(&hash).unwrap();
        let mut signature = secp.sign_ecdsa(&message, &secret).serialize_der().to_vec();
        let last = signature.len() - 1;
        signature[last] ^= 0x01;

        assert!(!ecdsa_verify(&hash, &signature, &public.serialize()));
    }

    #[test]
    fn test_malformed_inputs_return_false() {
        let (_, public) = keypair();
        let hash = sha256(b"spend");
        assert!(!ecdsa_verify(&hash, &[], &public.serialize()));
        assert!(!ecdsa_verify(&hash, &[0x30, 0x00], &public.serialize()));
        assert!(!ecdsa_verify(&hash, &[0x30, 0x00], &[]));
        assert!(!ecdsa_verify(b"short", &[0x30, 0x00], &public.serialize()));
    }
}
