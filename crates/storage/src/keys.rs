// Path: crates/storage/src/keys.rs

//! On-disk key families for the node store.
//!
//! All integers are 8-byte big-endian so lexicographic key order matches
//! numeric order, and the three prefixes are disjoint, letting the families
//! cohabit a single keyspace:
//!
//! - `'n' ‖ hash` — node entry, indexed by content hash
//! - `'o' ‖ last ‖ first ‖ hash` — orphan entry; `last` leads so every orphan
//!   expiring at a given version shares a contiguous prefix
//! - `'r' ‖ version` — root hash, indexed by version

use canopy_api::storage::{be64, NodeHash, Version, HASH_LEN};

pub(crate) const NODE_PREFIX: u8 = b'n';
pub(crate) const ORPHAN_PREFIX: u8 = b'o';
pub(crate) const ROOT_PREFIX: u8 = b'r';

/// `'n' ‖ hash`
pub(crate) fn node_key(hash: &NodeHash) -> Vec<u8> {
    [&[NODE_PREFIX][..], hash.as_bytes()].concat()
}

/// `'o' ‖ last ‖ first ‖ hash`
pub(crate) fn orphan_key(first: Version, last: Version, hash: &NodeHash) -> Vec<u8> {
    [
        &[ORPHAN_PREFIX][..],
        &be64(last),
        &be64(first),
        hash.as_bytes(),
    ]
    .concat()
}

/// Prefix shared by every orphan whose lifetime ends at `last`.
pub(crate) fn orphan_expiry_prefix(last: Version) -> Vec<u8> {
    [&[ORPHAN_PREFIX][..], &be64(last)].concat()
}

/// `'r' ‖ version`
pub(crate) fn root_key(version: Version) -> Vec<u8> {
    [&[ROOT_PREFIX][..], &be64(version)].concat()
}

pub(crate) fn parse_root_key(key: &[u8]) -> Option<Version> {
    let rest = key.strip_prefix(&[ROOT_PREFIX][..])?;
    let raw: [u8; 8] = rest.try_into().ok()?;
    Some(Version::from_be_bytes(raw))
}

/// Splits an orphan key into `(first, last, hash)`.
pub(crate) fn parse_orphan_key(key: &[u8]) -> Option<(Version, Version, NodeHash)> {
    let rest = key.strip_prefix(&[ORPHAN_PREFIX][..])?;
    if rest.len() != 16 + HASH_LEN {
        return None;
    }
    let (last_raw, rest) = rest.split_at(8);
    let (first_raw, hash_raw) = rest.split_at(8);
    let last = Version::from_be_bytes(last_raw.try_into().ok()?);
    let first = Version::from_be_bytes(first_raw.try_into().ok()?);
    let hash = NodeHash::from_slice(hash_raw).ok()?;
    Some((first, last, hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout_is_bit_exact() {
        let hash = NodeHash([0xAB; HASH_LEN]);

        let nk = node_key(&hash);
        assert_eq!(nk.len(), 1 + HASH_LEN);
        assert_eq!(nk[0], 0x6E);
        assert_eq!(&nk[1..], hash.as_bytes());

        let ok = orphan_key(3, 7, &hash);
        assert_eq!(ok.len(), 1 + 8 + 8 + HASH_LEN);
        assert_eq!(ok[0], 0x6F);
        assert_eq!(&ok[1..9], &7i64.to_be_bytes(), "last version leads");
        assert_eq!(&ok[9..17], &3i64.to_be_bytes(), "first version follows");
        assert_eq!(&ok[17..], hash.as_bytes());

        let rk = root_key(5);
        assert_eq!(rk.len(), 9);
        assert_eq!(rk[0], 0x72);
        assert_eq!(&rk[1..], &5i64.to_be_bytes());
    }

    #[test]
    fn test_orphan_keys_group_by_expiry_version() {
        let hash = NodeHash([1; HASH_LEN]);

        // Expiry version dominates the sort, regardless of first version.
        assert!(orphan_key(9, 5, &hash) < orphan_key(1, 6, &hash));
        // Within one expiry version, first version breaks the tie.
        assert!(orphan_key(2, 5, &hash) < orphan_key(3, 5, &hash));
        // All orphans expiring at a version share its scan prefix.
        assert!(orphan_key(2, 5, &hash).starts_with(&orphan_expiry_prefix(5)));
        assert!(!orphan_key(2, 6, &hash).starts_with(&orphan_expiry_prefix(5)));
    }

    #[test]
    fn test_root_keys_order_by_version() {
        assert!(root_key(1) < root_key(2));
        assert!(root_key(255) < root_key(256));
        assert!(root_key(256) < root_key(Version::MAX));
    }

    #[test]
    fn test_parse_round_trips() {
        let hash = NodeHash([0x42; HASH_LEN]);
        assert_eq!(parse_root_key(&root_key(17)), Some(17));
        assert_eq!(
            parse_orphan_key(&orphan_key(4, 9, &hash)),
            Some((4, 9, hash))
        );

        assert_eq!(parse_root_key(&node_key(&hash)), None);
        assert_eq!(parse_orphan_key(&root_key(1)), None);
        assert_eq!(parse_orphan_key(&orphan_key(4, 9, &hash)[..10]), None);
    }
}
