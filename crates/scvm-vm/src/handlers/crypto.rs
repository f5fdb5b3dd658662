//! Hashing and signature commands.

use super::eth_proof::{keccak256 as keccak, verify_storage_proof, RlpItem};
use super::{arg_str, check_args};
use crate::error::VmError;
use crate::wire::decode_list;
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use scvm_types::{decode_address, ENCODED_ADDRESS_LENGTH};
use sha2::{Digest, Sha256};

const RLP_STRING: u8 = 0;
const RLP_LIST: u8 = 1;
const COMPACT_SIGNATURE_LENGTH: usize = 65;

fn strip_hex_prefix(s: &[u8]) -> Option<&[u8]> {
    s.strip_prefix(b"0x").or_else(|| s.strip_prefix(b"0X"))
}

fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    hex::decode(digits)
}

fn flag(b: bool) -> Vec<u8> {
    if b { b"1".to_vec() } else { b"0".to_vec() }
}

pub(super) fn sha256(args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 1, "[Contract.CryptoSha256]")?;
    let data = match strip_hex_prefix(&args[0]) {
        Some(digits) => hex::decode(digits)
            .map_err(|e| VmError::catchable(format!("[Contract.CryptoSha256] hex decoding error: {}", e)))?,
        None => args[0].clone(),
    };
    Ok(format!("0x{}", hex::encode(Sha256::digest(&data))).into_bytes())
}

/// Hex input (`0x...`) yields hex output; anything else is hashed as raw
/// bytes and the digest returned raw.
pub(super) fn keccak256(args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 1, "[Contract.CryptoKeccak256]")?;
    if let Some(data) = strip_hex_prefix(&args[0]).and_then(|d| hex::decode(d).ok()) {
        return Ok(format!("0x{}", hex::encode(keccak(&data))).into_bytes());
    }
    Ok(keccak(&args[0]))
}

pub(super) fn ec_verify(args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 3, "[Contract.EcVerify]")?;
    let (msg, sig, addr) = (arg_str(args, 0), arg_str(args, 1), arg_str(args, 2));
    let err = |m: String| VmError::catchable(format!("[Contract.EcVerify] {}", m));

    let msg = decode_hex(&msg).map_err(|e| err(format!("invalid message format: {}", e)))?;
    let sig = decode_hex(&sig).map_err(|e| err(format!("invalid signature format: {}", e)))?;

    let is_aergo = addr.len() == ENCODED_ADDRESS_LENGTH;
    let pubkey = if is_aergo {
        let raw = decode_address(&addr).map_err(|e| err(format!("invalid aergo address: {}", e)))?;
        let key = VerifyingKey::from_sec1_bytes(&raw).map_err(|e| err(format!("error parsing pubKey: {}", e)))?;
        Some(key)
    } else {
        None
    };

    let verified = if sig.len() == COMPACT_SIGNATURE_LENGTH {
        // compact form is header || r || s; ethereum signatures are r || s || v
        let (header, rs) = if is_aergo {
            (sig[0], &sig[1..])
        } else {
            (sig[64].wrapping_add(27), &sig[..64])
        };
        let recovered = recover_compact(header, rs, &msg).map_err(|e| err(format!("error recoverCompact: {}", e)))?;
        match pubkey {
            Some(key) => key == recovered,
            None => {
                let expected = decode_hex(&addr).map_err(|e| err(format!("invalid Ethereum address: {}", e)))?;
                let point = recovered.to_encoded_point(false);
                let digest = Sha256::digest(&point.as_bytes()[1..]);
                digest[12..] == expected[..]
            }
        }
    } else {
        let signature = Signature::from_der(&sig).map_err(|e| err(format!("error parsing signature: {}", e)))?;
        let signature = signature.normalize_s().unwrap_or(signature);
        let key = pubkey.ok_or_else(|| err("error recovering pubKey".into()))?;
        key.verify_prehash(&msg, &signature).is_ok()
    };
    Ok(flag(verified))
}

fn recover_compact(header: u8, rs: &[u8], msg: &[u8]) -> Result<VerifyingKey, String> {
    let recid = header
        .checked_sub(27)
        .map(|h| h & !4)
        .and_then(RecoveryId::from_byte)
        .ok_or_else(|| "invalid compact signature recovery code".to_string())?;
    let signature = Signature::from_slice(rs).map_err(|e| e.to_string())?;
    VerifyingKey::recover_from_prehash(msg, &signature, recid).map_err(|e| e.to_string())
}

/// Arguments: key, typed value (`0` string or `1` list of strings), root
/// hash, proof nodes. Value and proof lists use the byte-list encoding.
pub(super) fn verify_eth_storage_proof(args: &[Vec<u8>]) -> Result<Vec<u8>, VmError> {
    check_args(args, 4, "[Contract.CryptoVerifyEthStorageProof]")?;
    let Some(value) = rlp_value(&args[1]) else {
        return Ok(flag(false));
    };
    let Ok(proof) = decode_list(&args[3]) else {
        return Ok(flag(false));
    };
    Ok(flag(verify_storage_proof(&args[0], &value, &args[2], &proof)))
}

fn rlp_value(data: &[u8]) -> Option<RlpItem> {
    let (&kind, rest) = data.split_first()?;
    match kind {
        RLP_STRING => Some(RlpItem::String(rest.to_vec())),
        RLP_LIST => {
            let items = decode_list(rest).ok()?;
            Some(RlpItem::List(items.into_iter().map(RlpItem::String).collect()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode_list;
    use k256::ecdsa::SigningKey;
    use scvm_types::encode_address;

    fn arg(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    fn signing_key() -> SigningKey {
        SigningKey::from_slice(&[7u8; 32]).unwrap()
    }

    #[test]
    fn test_sha256() {
        let out = sha256(&[arg("abc")]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0xba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let hexed = sha256(&[arg("0x616263")]).unwrap();
        assert_eq!(hexed, sha256(&[arg("abc")]).unwrap());
        assert!(sha256(&[arg("0xzz")]).unwrap_err().to_string().starts_with("[Contract.CryptoSha256] hex decoding error"));
    }

    #[test]
    fn test_keccak256() {
        let out = keccak256(&[arg("0x616263")]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0x4e03657aea45a94fc7d47ba826c8d667c0d1e6e33a64a036ec44f58fa12d6c45"
        );
        assert_eq!(keccak256(&[arg("abc")]).unwrap(), keccak(b"abc"));
    }

    #[test]
    fn test_ec_verify_der_with_aergo_address() {
        let sk = signing_key();
        let vk = VerifyingKey::from(&sk);
        let addr = encode_address(vk.to_encoded_point(true).as_bytes());
        let msg = Sha256::digest(b"hello");
        let (sig, _) = sk.sign_prehash_recoverable(&msg).unwrap();
        let der = hex::encode(sig.to_der().as_bytes());

        let ok = ec_verify(&[arg(&hex::encode(msg)), arg(&der), arg(&addr)]).unwrap();
        assert_eq!(ok, b"1");
        let other = Sha256::digest(b"other");
        let bad = ec_verify(&[arg(&hex::encode(other)), arg(&der), arg(&addr)]).unwrap();
        assert_eq!(bad, b"0");
    }

    #[test]
    fn test_ec_verify_compact_ethereum() {
        let sk = signing_key();
        let vk = VerifyingKey::from(&sk);
        let msg = Sha256::digest(b"hello");
        let (sig, recid) = sk.sign_prehash_recoverable(&msg).unwrap();
        let mut compact = sig.to_bytes().to_vec();
        compact.push(recid.to_byte());

        let point = vk.to_encoded_point(false);
        let eth_addr = hex::encode(&Sha256::digest(&point.as_bytes()[1..])[12..]);
        let ok = ec_verify(&[arg(&hex::encode(msg)), arg(&hex::encode(&compact)), arg(&format!("0x{}", eth_addr))]).unwrap();
        assert_eq!(ok, b"1");
        let wrong = ec_verify(&[arg(&hex::encode(msg)), arg(&hex::encode(&compact)), arg("0x00")]).unwrap();
        assert_eq!(wrong, b"0");
    }

    #[test]
    fn test_ec_verify_der_needs_pubkey() {
        let sk = signing_key();
        let msg = Sha256::digest(b"hello");
        let (sig, _) = sk.sign_prehash_recoverable(&msg).unwrap();
        let der = hex::encode(sig.to_der().as_bytes());
        let err = ec_verify(&[arg(&hex::encode(msg)), arg(&der), arg("0x00")]).unwrap_err();
        assert_eq!(err.to_string(), "[Contract.EcVerify] error recovering pubKey");
    }

    #[test]
    fn test_verify_eth_storage_proof_command() {
        let leaf = hex::decode("f844a120290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563a1a06b746c656500000000000000000000000000000000000000000000000000000a").unwrap();
        let value = hex::decode("6b746c656500000000000000000000000000000000000000000000000000000a").unwrap();
        let mut typed = vec![RLP_STRING];
        typed.extend_from_slice(&value);
        let proof = encode_list(&[leaf.as_slice()]).to_vec();
        let root = keccak(&leaf);
        let key = vec![0u8; 32];

        let ok = verify_eth_storage_proof(&[key.clone(), typed, root.clone(), proof.clone()]).unwrap();
        assert_eq!(ok, b"1");
        let bad = verify_eth_storage_proof(&[key, vec![9], root, proof]).unwrap();
        assert_eq!(bad, b"0");
    }
}
