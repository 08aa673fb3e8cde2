// Path: crates/storage/src/encode.rs

//! Canonical node encoding. The same bytes serve as the persistence format
//! and as the preimage for the node's content hash.

use canopy_api::storage::{NodeHash, StoreError, Version, HASH_LEN};

use crate::node::Node;
use crate::nodedb::LeafValueFn;

const LEAF_TAG: u8 = 0x00;
const INNER_TAG: u8 = 0x01;

/// Encodes a node into its canonical byte form.
///
/// When `omit_leaf_value` is set (a leaf-value lookup has been configured on
/// the store), leaf values are not embedded in the stored bytes; the decoder
/// rehydrates them by key through the lookup.
pub(crate) fn encode_node(n: &Node, omit_leaf_value: bool) -> Result<Vec<u8>, StoreError> {
    if n.is_leaf() {
        encode_leaf(n, omit_leaf_value)
    } else {
        encode_inner(n)
    }
}

#[inline]
fn encode_leaf(n: &Node, omit_value: bool) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::with_capacity(
        1 + 8
            + prost::length_delimiter_len(n.key.len())
            + n.key.len()
            + if omit_value {
                0
            } else {
                prost::length_delimiter_len(n.value.len()) + n.value.len()
            },
    );

    buf.push(LEAF_TAG);
    buf.extend_from_slice(&n.version.to_le_bytes());
    prost::encode_length_delimiter(n.key.len(), &mut buf)
        .map_err(|e| StoreError::Corrupt(format!("encode varint(key_len): {e}")))?;
    buf.extend_from_slice(&n.key);

    if !omit_value {
        prost::encode_length_delimiter(n.value.len(), &mut buf)
            .map_err(|e| StoreError::Corrupt(format!("encode varint(value_len): {e}")))?;
        buf.extend_from_slice(&n.value);
    }

    Ok(buf)
}

#[inline]
fn encode_inner(n: &Node) -> Result<Vec<u8>, StoreError> {
    let left = n.left_hash.ok_or_else(|| {
        StoreError::InvariantViolation("inner node is missing its left child hash".into())
    })?;
    let right = n.right_hash.ok_or_else(|| {
        StoreError::InvariantViolation("inner node is missing its right child hash".into())
    })?;

    let mut buf = Vec::with_capacity(
        1 + 8 + 4 + 8 + prost::length_delimiter_len(n.key.len()) + n.key.len() + 2 * HASH_LEN,
    );

    buf.push(INNER_TAG);
    buf.extend_from_slice(&n.version.to_le_bytes());
    buf.extend_from_slice(&n.height.to_le_bytes());
    buf.extend_from_slice(&n.size.to_le_bytes());
    prost::encode_length_delimiter(n.key.len(), &mut buf)
        .map_err(|e| StoreError::Corrupt(format!("encode varint(key_len): {e}")))?;
    buf.extend_from_slice(&n.key);
    buf.extend_from_slice(left.as_bytes());
    buf.extend_from_slice(right.as_bytes());

    Ok(buf)
}

/// Helper to advance a slice cursor by `n` bytes, returning the advanced part.
fn take<'a>(cursor: &mut &'a [u8], n: usize) -> Result<&'a [u8], StoreError> {
    if cursor.len() < n {
        return Err(StoreError::Corrupt("node encoding truncated".into()));
    }
    let (head, tail) = cursor.split_at(n);
    *cursor = tail;
    Ok(head)
}

fn take_i64(cursor: &mut &[u8]) -> Result<i64, StoreError> {
    let raw: [u8; 8] = take(cursor, 8)?
        .try_into()
        .map_err(|_| StoreError::Corrupt("bad integer width".into()))?;
    Ok(i64::from_le_bytes(raw))
}

fn take_i32(cursor: &mut &[u8]) -> Result<i32, StoreError> {
    let raw: [u8; 4] = take(cursor, 4)?
        .try_into()
        .map_err(|_| StoreError::Corrupt("bad integer width".into()))?;
    Ok(i32::from_le_bytes(raw))
}

fn take_delimited<'a>(cursor: &mut &'a [u8], what: &str) -> Result<&'a [u8], StoreError> {
    let len = prost::decode_length_delimiter(&mut *cursor)
        .map_err(|e| StoreError::Corrupt(format!("decode varint({what}): {e}")))?;
    take(cursor, len)
}

/// Decodes a node from its canonical byte form. The decoded node carries no
/// hash and is not marked persisted; the caller fills in both.
pub(crate) fn decode_node(
    bytes: &[u8],
    leaf_value_lookup: Option<&LeafValueFn>,
) -> Result<Node, StoreError> {
    let mut cursor = bytes;
    let tag = *take(&mut cursor, 1)?
        .first()
        .ok_or_else(|| StoreError::Corrupt("empty node encoding".into()))?;

    match tag {
        LEAF_TAG => {
            let version: Version = take_i64(&mut cursor)?;
            let key = take_delimited(&mut cursor, "key_len")?.to_vec();

            let value = match leaf_value_lookup {
                Some(lookup) => lookup(&key).ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "leaf value missing for key {}",
                        hex::encode(&key)
                    ))
                })?,
                None => take_delimited(&mut cursor, "value_len")?.to_vec(),
            };

            if !cursor.is_empty() {
                return Err(StoreError::Corrupt(
                    "trailing bytes after leaf encoding".into(),
                ));
            }

            Ok(Node {
                key,
                value,
                version,
                height: 0,
                size: 1,
                hash: None,
                left_hash: None,
                right_hash: None,
                left_node: None,
                right_node: None,
                persisted: false,
            })
        }
        INNER_TAG => {
            let version: Version = take_i64(&mut cursor)?;
            let height = take_i32(&mut cursor)?;
            let size = take_i64(&mut cursor)?;
            let key = take_delimited(&mut cursor, "key_len")?.to_vec();
            let left = NodeHash::from_slice(take(&mut cursor, HASH_LEN)?)?;
            let right = NodeHash::from_slice(take(&mut cursor, HASH_LEN)?)?;

            if !cursor.is_empty() {
                return Err(StoreError::Corrupt(
                    "trailing bytes after inner encoding".into(),
                ));
            }

            Ok(Node {
                key,
                value: Vec::new(),
                version,
                height,
                size,
                hash: None,
                left_hash: Some(left),
                right_hash: Some(right),
                left_node: None,
                right_node: None,
                persisted: false,
            })
        }
        other => Err(StoreError::Corrupt(format!("unknown node tag {other:#04x}"))),
    }
}
