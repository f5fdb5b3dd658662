//! Ethereum storage proof verification over RLP-encoded trie nodes.

use sha3::{Digest, Keccak256};

const SHORT_NODE: usize = 2;
const BRANCH_NODE: usize = 17;
const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// A value to encode as RLP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpItem {
    String(Vec<u8>),
    List(Vec<RlpItem>),
}

impl RlpItem {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RlpItem::String(s) if s.len() == 1 && s[0] < 0x80 => vec![s[0]],
            RlpItem::String(s) => {
                let mut out = rlp_length(s.len(), 0x80);
                out.extend_from_slice(s);
                out
            }
            RlpItem::List(items) => {
                let body: Vec<u8> = items.iter().flat_map(RlpItem::encode).collect();
                let mut out = rlp_length(body.len(), 0xc0);
                out.extend(body);
                out
            }
        }
    }
}

fn rlp_length(len: usize, offset: u8) -> Vec<u8> {
    if len < 56 {
        return vec![len as u8 + offset];
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let mut out = vec![(bytes.len() - skip) as u8 + offset + 55];
    out.extend_from_slice(&bytes[skip..]);
    out
}

pub fn keccak256(data: &[u8]) -> Vec<u8> {
    Keccak256::digest(data).to_vec()
}

/// Checks that `value` is stored under `key` in the trie whose root hash is
/// `root`, given the nodes along the path.
pub fn verify_storage_proof(key: &[u8], value: &RlpItem, root: &[u8], proof: &[Vec<u8>]) -> bool {
    if key.is_empty() || proof.is_empty() {
        return false;
    }
    let path = hex::encode(keccak256(key)).into_bytes();
    let mut path = path.as_slice();
    let expected_value = value.encode();
    let mut expected = root.to_vec();

    for (i, node) in proof.iter().enumerate() {
        let hash_ok = (i == 0 || node.len() >= 32) && expected == keccak256(node);
        if !hash_ok && expected != *node {
            return false;
        }
        let Some(items) = decode_trie_node(node) else {
            return false;
        };
        match items.len() {
            SHORT_NODE => {
                let Some((&header, rest)) = items[0].split_first() else {
                    return false;
                };
                let Some((leaf, mut nibbles)) = decode_hp_header(header) else {
                    return false;
                };
                nibbles.extend(hex::encode(rest).into_bytes());
                if nibbles.is_empty() {
                    return false;
                }
                if leaf {
                    return nibbles == path && items[1] == expected_value;
                }
                let take = nibbles.len().min(path.len());
                if nibbles != path[..take] {
                    return false;
                }
                path = &path[take..];
                expected = items[1].clone();
            }
            BRANCH_NODE => {
                let Some((&c, rest)) = path.split_first() else {
                    return items[16] == expected_value;
                };
                path = rest;
                match hex_index(c) {
                    Some(k) => expected = items[k].clone(),
                    None => return false,
                }
            }
            _ => return false,
        }
    }
    false
}

fn decode_hp_header(b: u8) -> Option<(bool, Vec<u8>)> {
    let odd = vec![HEX_CHARS[(b & 0x0f) as usize]];
    match b >> 4 {
        0 => Some((false, Vec::new())),
        1 => Some((false, odd)),
        2 => Some((true, Vec::new())),
        3 => Some((true, odd)),
        _ => None,
    }
}

fn hex_index(c: u8) -> Option<usize> {
    (c as char).to_digit(16).map(|d| d as usize)
}

/// Splits an RLP list of 2 or 17 strings into its items.
pub fn decode_trie_node(data: &[u8]) -> Option<Vec<Vec<u8>>> {
    let (&first, rest) = data.split_first()?;
    let body = match first {
        0xf8..=0xff => {
            let len_len = (first - 0xf7) as usize;
            let len = decode_len(rest, len_len)?;
            if data.len() as u64 != 1 + len_len as u64 + len {
                return None;
            }
            &rest[len_len..]
        }
        0xc0..=0xf7 => {
            let len = (first - 0xc0) as usize;
            if data.len() != 1 + len {
                return None;
            }
            rest
        }
        _ => return None,
    };
    let mut items = Vec::new();
    let mut offset = 0;
    while offset < body.len() {
        let (item, used) = decode_string(&body[offset..])?;
        items.push(item.to_vec());
        offset += used;
    }
    matches!(items.len(), SHORT_NODE | BRANCH_NODE).then_some(items)
}

fn decode_len(data: &[u8], len_len: usize) -> Option<u64> {
    if data.len() <= len_len || len_len > 8 {
        return None;
    }
    Some(data[..len_len].iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn decode_string(data: &[u8]) -> Option<(&[u8], usize)> {
    let (&first, rest) = data.split_first()?;
    match first {
        0x00..=0x7f => Some((&data[..1], 1)),
        0x80..=0xb7 => {
            let len = (first - 0x80) as usize;
            Some((rest.get(..len)?, 1 + len))
        }
        0xb8..=0xbf => {
            let len_len = (first - 0xb7) as usize;
            let len = usize::try_from(decode_len(rest, len_len)?).ok()?;
            let start = 1 + len_len;
            Some((data.get(start..start.checked_add(len)?)?, start + len))
        }
        _ => None,
    }
}
