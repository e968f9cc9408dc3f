//! Deterministic Identifier Derivation
//!
//! Block, allocation and settlement ids are pure functions of their inputs:
//! recomputing an id for the same inputs yields the same string, which turns
//! every "create" downstream into an idempotent upsert. No id service sits on
//! the critical path.
//!
//! Formula: SHA256 over a `|`-joined key, hex-truncated, with a type prefix.

use sha2::{Digest, Sha256};

use crate::value_objects::{Side, TradeDate};

/// Hex characters kept from the digest. 16 hex chars = 64 bits, ample for
/// per-run uniqueness of opaque ids.
const ID_HEX_LEN: usize = 16;

fn derive(prefix: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    format!("{}-{}", prefix, &hex::encode(digest)[..ID_HEX_LEN])
}

/// Block id for an (instrument, side, trade date) aggregation group.
///
/// Stable across fills: every fill of the group maps to the same block id,
/// so re-aggregation upserts the same row.
pub fn block_id(instrument_id: &str, side: Side, trade_date: TradeDate) -> String {
    derive(
        "BLK",
        &format!("{}|{}|{}", instrument_id, side.as_str(), trade_date.as_yyyymmdd()),
    )
}

/// Allocation id for a (block, account) pair.
pub fn alloc_id(block_id: &str, account_id: &str) -> String {
    derive("ALC", &format!("{}|{}", block_id, account_id))
}

/// Settlement id for an allocation.
pub fn settle_id(alloc_id: &str) -> String {
    derive("STL", alloc_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jan15() -> TradeDate {
        TradeDate::parse("20240115").unwrap()
    }

    #[test]
    fn test_block_id_stable_across_calls() {
        let a = block_id("AAPL.O", Side::Buy, jan15());
        let b = block_id("AAPL.O", Side::Buy, jan15());
        assert_eq!(a, b);
        assert!(a.starts_with("BLK-"));
        assert_eq!(a.len(), "BLK-".len() + ID_HEX_LEN);
    }

    #[test]
    fn test_block_id_distinguishes_group_fields() {
        let base = block_id("AAPL.O", Side::Buy, jan15());
        assert_ne!(base, block_id("MSFT.O", Side::Buy, jan15()));
        assert_ne!(base, block_id("AAPL.O", Side::Sell, jan15()));
        assert_ne!(base, block_id("AAPL.O", Side::Buy, TradeDate::parse("20240116").unwrap()));
    }

    #[test]
    fn test_alloc_and_settle_ids_chain() {
        let blk = block_id("AAPL.O", Side::Buy, jan15());
        let alc = alloc_id(&blk, "ACCT-1");
        let stl = settle_id(&alc);

        assert!(alc.starts_with("ALC-"));
        assert!(stl.starts_with("STL-"));
        // Pure functions: recomputation is identical
        assert_eq!(alc, alloc_id(&blk, "ACCT-1"));
        assert_eq!(stl, settle_id(&alc));
        // Different account, different allocation
        assert_ne!(alc, alloc_id(&blk, "ACCT-2"));
    }

    #[test]
    fn test_delimiter_prevents_field_bleed() {
        // "AB|C" vs "A|BC" must not collide
        let a = block_id("AB", Side::Buy, jan15());
        let b = block_id("A", Side::Buy, jan15());
        assert_ne!(a, b);
    }
}
