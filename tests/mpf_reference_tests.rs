//! Cross-checks against a from-scratch recursive MPF builder.
//!
//! The reference below hashes with `blake2` directly and builds the root
//! from the sorted key set in one pass, the way the on-chain library defines
//! it, without touching the crate's commitment or storage code.

use std::sync::Arc;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use merkle_forestry::storage::kv_store::MemoryStore;
use merkle_forestry::storage::trie::{MerklePatriciaTrie, Mode, MpfTrie};

type Digest32 = [u8; 32];

const NULL: Digest32 = [0u8; 32];

fn h(parts: &[&[u8]]) -> Digest32 {
    let mut hasher = Blake2b::<U32>::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn to_nibbles(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().flat_map(|b| [b >> 4, b & 0x0f]).collect()
}

fn pack(nibbles: &[u8]) -> Vec<u8> {
    nibbles.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect()
}

fn leaf_hash(suffix: &[u8], value_hash: &Digest32) -> Digest32 {
    if suffix.len() % 2 == 0 {
        h(&[&[0xff], &pack(suffix), value_hash])
    } else {
        h(&[&[0x00], &[suffix[0]], &pack(&suffix[1..]), value_hash])
    }
}

fn merkle(nodes: &[Digest32]) -> Digest32 {
    if nodes.len() == 1 {
        return nodes[0];
    }
    let (left, right) = nodes.split_at(nodes.len() / 2);
    h(&[&merkle(left), &merkle(right)])
}

/// Root of a set of (path nibbles, value hash) pairs, all paths distinct and equally long
fn reference_root(entries: &[(Vec<u8>, Digest32)], depth: usize) -> Digest32 {
    if entries.len() == 1 {
        let (path, value_hash) = &entries[0];
        return leaf_hash(&path[depth..], value_hash);
    }

    let first = &entries[0].0;
    let mut split = depth;
    while entries.iter().all(|(path, _)| path[split] == first[split]) {
        split += 1;
    }

    let mut slots = [NULL; 16];
    for (nibble, slot) in slots.iter_mut().enumerate() {
        let group: Vec<_> = entries.iter().filter(|(path, _)| path[split] as usize == nibble).cloned().collect();
        if !group.is_empty() {
            *slot = reference_root(&group, split + 1);
        }
    }
    h(&[&first[depth..split], &merkle(&slots)])
}

fn fruit_entries(count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..count)
        .map(|i| (format!("fruit-{}", i).into_bytes(), format!("value-{}", i).into_bytes()))
        .collect()
}

#[test]
fn test_roots_match_reference_builder() {
    for count in [1, 2, 3, 17, 100] {
        let entries = fruit_entries(count);
        let mut trie = MpfTrie::new(Arc::new(MemoryStore::new()));
        for (key, value) in &entries {
            trie.put(key, value).unwrap();
        }

        let hashed: Vec<(Vec<u8>, Digest32)> = entries
            .iter()
            .map(|(key, value)| (to_nibbles(&h(&[key])), h(&[value])))
            .collect();
        assert_eq!(trie.root_hash(), Some(reference_root(&hashed, 0)), "{} keys", count);
    }
}

#[test]
fn test_reference_root_after_deletes() {
    let entries = fruit_entries(30);
    let mut trie = MpfTrie::new(Arc::new(MemoryStore::new()));
    for (key, value) in &entries {
        trie.put(key, value).unwrap();
    }
    for (key, _) in entries.iter().step_by(3) {
        trie.delete(key).unwrap();
    }

    let remaining: Vec<(Vec<u8>, Digest32)> = entries
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 3 != 0)
        .map(|(_, (key, value))| (to_nibbles(&h(&[key])), h(&[value])))
        .collect();
    assert_eq!(trie.root_hash(), Some(reference_root(&remaining, 0)));
}

fn two_leaf_trie() -> MerklePatriciaTrie {
    let mut trie = MerklePatriciaTrie::new(Arc::new(MemoryStore::new()), Mode::Mpf);
    trie.put(&[0x10; 32], b"left").unwrap();
    trie.put(&[0x20; 32], b"right").unwrap();
    trie
}

/// Neighbors of slot 1 when only slots 1 and 2 are filled
fn slot_one_neighbors() -> Vec<u8> {
    let null2 = h(&[&NULL, &NULL]);
    let null4 = h(&[&null2, &null2]);
    let null8 = h(&[&null4, &null4]);
    let right = leaf_hash(&to_nibbles(&[0x20; 32])[1..], &h(&[b"right"]));
    [null8, null4, h(&[&right, &NULL]), NULL].concat()
}

#[test]
fn test_inclusion_proof_bytes() {
    let trie = two_leaf_trie();
    let left = leaf_hash(&to_nibbles(&[0x10; 32])[1..], &h(&[b"left"]));
    let right = leaf_hash(&to_nibbles(&[0x20; 32])[1..], &h(&[b"right"]));
    let mut slots = [NULL; 16];
    slots[1] = left;
    slots[2] = right;
    assert_eq!(trie.root_hash(), Some(h(&[&merkle(&slots)])));

    // [121([0, neighbors])]
    let mut expected = vec![0x81, 0xd8, 0x79, 0x82, 0x00, 0x58, 0x80];
    expected.extend_from_slice(&slot_one_neighbors());
    assert_eq!(trie.get_proof_wire(&[0x10; 32]).unwrap(), expected);
}

#[test]
fn test_exclusion_proof_bytes() {
    let trie = two_leaf_trie();

    // [121([0, neighbors]), 123([0, key, value hash])]
    let mut expected = vec![0x82, 0xd8, 0x79, 0x82, 0x00, 0x58, 0x80];
    expected.extend_from_slice(&slot_one_neighbors());
    expected.extend_from_slice(&[0xd8, 0x7b, 0x83, 0x00, 0x58, 0x20]);
    expected.extend_from_slice(&[0x10; 32]);
    expected.extend_from_slice(&[0x58, 0x20]);
    expected.extend_from_slice(&h(&[b"left"]));

    let wire = trie.get_proof_wire(&[0x13; 32]).unwrap();
    assert_eq!(wire, expected);
    assert!(trie.verify_proof_wire(trie.root_hash().as_ref(), &[0x13; 32], None, false, &wire));
}
