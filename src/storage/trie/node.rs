use array_init::array_init;
use ciborium::value::Value;

use crate::crypto::{hash_from_slice, Hash};
use crate::storage::trie::error::{Result, TrieError};
use crate::storage::trie::nibbles::{compact_decode, compact_encode, Nibble};

/// Number of children in a branch node
pub const BRANCH_WIDTH: usize = 16;

/// Node types in the Merkle Patricia Forestry
///
/// Nodes are immutable values. Children are referenced by commitment hash
/// and loaded from the node store on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Branch node with up to 16 children and an optional value
    Branch {
        /// Child commitments, one slot per nibble
        children: [Option<Hash>; BRANCH_WIDTH],
        /// Value terminating at this branch (if any)
        value: Option<Vec<u8>>,
    },

    /// Leaf node holding the rest of a key and its value
    Leaf {
        /// Remaining key nibbles below the parent
        path: Vec<Nibble>,
        /// Value stored at this leaf
        value: Vec<u8>,
        /// Un-hashed key, kept for enumeration only
        key: Option<Vec<u8>>,
    },

    /// Extension node compressing a run of shared nibbles
    Extension {
        /// Shared nibble prefix, never empty
        path: Vec<Nibble>,
        /// Commitment of the single child
        child: Hash,
    },
}

impl Node {
    /// Create a new leaf node
    pub fn leaf(path: Vec<Nibble>, value: Vec<u8>, key: Option<Vec<u8>>) -> Self {
        Node::Leaf { path, value, key }
    }

    /// Create a new extension node
    pub fn extension(path: Vec<Nibble>, child: Hash) -> Self {
        Node::Extension { path, child }
    }

    /// Create a new branch node
    pub fn branch(children: [Option<Hash>; BRANCH_WIDTH], value: Option<Vec<u8>>) -> Self {
        Node::Branch { children, value }
    }

    /// Get the value from a node if it's a leaf or branch with value
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Node::Leaf { value, .. } => Some(value),
            Node::Branch { value: Some(v), .. } => Some(v),
            _ => None,
        }
    }

    /// Number of populated child slots of a branch
    pub fn child_count(&self) -> usize {
        match self {
            Node::Branch { children, .. } => children.iter().filter(|c| c.is_some()).count(),
            _ => 0,
        }
    }

    /// Index and hash of the first populated child slot of a branch
    pub fn first_child(&self) -> Option<(usize, Hash)> {
        match self {
            Node::Branch { children, .. } => children
                .iter()
                .enumerate()
                .find_map(|(i, c)| c.map(|h| (i, h))),
            _ => None,
        }
    }

    /// Get the node type as a string
    pub fn node_type(&self) -> &'static str {
        match self {
            Node::Leaf { .. } => "leaf",
            Node::Extension { .. } => "extension",
            Node::Branch { .. } => "branch",
        }
    }

    /// Encode the node as canonical CBOR
    ///
    /// - Branch: array of 17 byte strings (16 children then the value), an
    ///   empty byte string marking an absent child or value
    /// - Leaf: `[hp, value]` or `[hp, value, original_key]`
    /// - Extension: `[hp, child]`
    pub fn encode(&self) -> Result<Vec<u8>> {
        let value = match self {
            Node::Branch { children, value } => {
                let mut items: Vec<Value> = children
                    .iter()
                    .map(|c| Value::Bytes(c.map(|h| h.to_vec()).unwrap_or_default()))
                    .collect();
                items.push(Value::Bytes(value.clone().unwrap_or_default()));
                Value::Array(items)
            }
            Node::Leaf { path, value, key } => {
                let mut items = vec![
                    Value::Bytes(compact_encode(path, true)),
                    Value::Bytes(value.clone()),
                ];
                if let Some(k) = key {
                    items.push(Value::Bytes(k.clone()));
                }
                Value::Array(items)
            }
            Node::Extension { path, child } => Value::Array(vec![
                Value::Bytes(compact_encode(path, false)),
                Value::Bytes(child.to_vec()),
            ]),
        };

        let mut buf = Vec::new();
        ciborium::ser::into_writer(&value, &mut buf)
            .map_err(|e| TrieError::Encode(format!("Failed to encode {} node: {:?}", self.node_type(), e)))?;
        Ok(buf)
    }

    /// Decode a node from its CBOR encoding
    ///
    /// The node type is discriminated by array length and the HP leaf flag.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| TrieError::Decode(format!("Invalid node CBOR: {:?}", e)))?;

        let items = match value {
            Value::Array(items) => items,
            other => return Err(TrieError::Decode(format!("Node is not an array: {:?}", other))),
        };

        match items.len() {
            17 => {
                let mut fields = Vec::with_capacity(17);
                for item in items {
                    fields.push(expect_bytes(item)?);
                }
                let value = fields.pop().filter(|v| !v.is_empty());

                let mut children: [Option<Hash>; BRANCH_WIDTH] = array_init(|_| None);
                for (i, field) in fields.iter().enumerate() {
                    children[i] = decode_child(field)?;
                }
                Ok(Node::Branch { children, value })
            }
            2 | 3 => {
                let arity = items.len();
                let mut iter = items.into_iter();
                let hp = expect_bytes(iter.next())?;
                let payload = expect_bytes(iter.next())?;
                let (path, is_leaf) = compact_decode(&hp)?;

                if is_leaf {
                    let key = match iter.next() {
                        Some(item) => Some(expect_bytes(Some(item))?),
                        None => None,
                    };
                    return Ok(Node::Leaf { path, value: payload, key });
                }

                if arity == 3 {
                    return Err(TrieError::Decode("3-element node with non-leaf HP".to_string()));
                }
                if path.is_empty() {
                    return Err(TrieError::Decode("extension with empty path".to_string()));
                }
                let child = hash_from_slice(&payload).ok_or_else(|| {
                    TrieError::Decode(format!("extension child must be 32 bytes, got {}", payload.len()))
                })?;
                Ok(Node::Extension { path, child })
            }
            n => Err(TrieError::Decode(format!("Unexpected node arity: {}", n))),
        }
    }
}

fn expect_bytes<V: Into<Option<Value>>>(item: V) -> Result<Vec<u8>> {
    match item.into() {
        Some(Value::Bytes(b)) => Ok(b),
        Some(other) => Err(TrieError::Decode(format!("Expected byte string, got {:?}", other))),
        None => Err(TrieError::Decode("Missing node field".to_string())),
    }
}

fn decode_child(field: &[u8]) -> Result<Option<Hash>> {
    if field.is_empty() {
        return Ok(None);
    }
    hash_from_slice(field)
        .map(Some)
        .ok_or_else(|| TrieError::Decode(format!("child hash must be 32 bytes, got {}", field.len())))
}
