//! Presentation helpers for wire proofs: the JSON step shape used by the
//! JavaScript off-chain library and an Aiken source literal for fixtures.

use serde_json::{json, Value};

use crate::storage::trie::error::Result;
use crate::storage::trie::proof::wire::{WireProof, WireStep};

/// Render a CBOR wire proof as a JSON array of steps
pub fn proof_to_json(wire: &[u8]) -> Result<Value> {
    let proof = WireProof::decode(wire)?;
    Ok(Value::Array(proof.steps.iter().map(step_to_json).collect()))
}

fn step_to_json(step: &WireStep) -> Value {
    match step {
        WireStep::Branch { skip, neighbors, value_hash } => {
            let mut obj = json!({
                "type": "branch",
                "skip": skip,
                "neighbors": hex::encode(neighbors.concat()),
            });
            if let Some(vh) = value_hash {
                obj["value"] = json!(hex::encode(vh));
            }
            obj
        }
        WireStep::Fork { skip, nibble, prefix, root } => json!({
            "type": "fork",
            "skip": skip,
            "neighbor": {
                "nibble": nibble,
                "prefix": hex::encode(prefix),
                "root": hex::encode(root),
            },
        }),
        WireStep::Leaf { skip, key, value_hash } => json!({
            "type": "leaf",
            "skip": skip,
            "neighbor": {
                "key": hex::encode(key),
                "value": hex::encode(value_hash),
            },
        }),
    }
}

/// Render a CBOR wire proof as an Aiken `Proof` literal
pub fn proof_to_aiken(wire: &[u8]) -> Result<String> {
    let proof = WireProof::decode(wire)?;
    let mut out = String::from("[\n");
    for step in &proof.steps {
        let line = match step {
            WireStep::Branch { skip, neighbors, .. } => {
                format!("  Branch {{ skip: {}, neighbors: #\"{}\" }},\n", skip, hex::encode(neighbors.concat()))
            }
            WireStep::Fork { skip, nibble, prefix, root } => format!(
                "  Fork {{ skip: {}, neighbor: Neighbor {{ nibble: {}, prefix: #\"{}\", root: #\"{}\" }} }},\n",
                skip,
                nibble,
                hex::encode(prefix),
                hex::encode(root)
            ),
            WireStep::Leaf { skip, key, value_hash } => format!(
                "  Leaf {{ skip: {}, key: #\"{}\", value: #\"{}\" }},\n",
                skip,
                hex::encode(key),
                hex::encode(value_hash)
            ),
        };
        out.push_str(&line);
    }
    out.push(']');
    Ok(out)
}
