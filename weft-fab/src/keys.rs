//! Deterministic storage-key derivation
//!
//! Externally persisted artifacts (segment metadata JSON, waveforms) are
//! addressed by a key derived from the chain's public alias (embed key,
//! falling back to chain id) plus a fixed-width, time-based segment name.
//! The extension is appended per content type at use sites.

use chrono::{DateTime, Utc};

use weft_common::entity::chain::Chain;

/// Width of the zero-padded epoch-millis field. 15 digits covers epoch
/// milliseconds beyond year 30000 while keeping keys sortable.
const TIME_WIDTH: usize = 15;

/// Storage key for a segment beginning at `begin_at`, without extension:
/// `chains-<embedKey|chainId>-segments-<paddedEpochMillis>`.
pub fn segment_storage_key(chain: &Chain, begin_at: DateTime<Utc>) -> String {
    let alias = chain
        .embed_key
        .clone()
        .unwrap_or_else(|| chain.id.to_string());
    format!(
        "chains-{alias}-segments-{:0width$}",
        begin_at.timestamp_millis().max(0),
        width = TIME_WIDTH
    )
}

/// Append a content-type extension to a storage key.
pub fn with_extension(storage_key: &str, extension: &str) -> String {
    format!("{storage_key}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;
    use weft_common::entity::chain::{ChainState, ChainType};

    fn chain(embed_key: Option<&str>) -> Chain {
        Chain {
            id: Uuid::nil(),
            account_id: Uuid::new_v4(),
            kind: ChainType::Production,
            state: ChainState::Fabricate,
            name: "test".into(),
            start_at: Utc::now(),
            stop_at: None,
            embed_key: embed_key.map(String::from),
        }
    }

    #[test]
    fn uses_embed_key_when_present() {
        let at = Utc.timestamp_millis_opt(1_500_000_000_000).unwrap();
        let key = segment_storage_key(&chain(Some("coolambience")), at);
        assert_eq!(key, "chains-coolambience-segments-001500000000000");
    }

    #[test]
    fn falls_back_to_chain_id() {
        let at = Utc.timestamp_millis_opt(0).unwrap();
        let key = segment_storage_key(&chain(None), at);
        assert_eq!(
            key,
            format!("chains-{}-segments-{}", Uuid::nil(), "0".repeat(15))
        );
    }

    #[test]
    fn keys_sort_by_time() {
        let c = chain(Some("x"));
        let early = segment_storage_key(&c, Utc.timestamp_millis_opt(999).unwrap());
        let late = segment_storage_key(&c, Utc.timestamp_millis_opt(1_000_000).unwrap());
        assert!(early < late);
    }

    #[test]
    fn extension_suffixing() {
        assert_eq!(with_extension("chains-x-segments-0", "json"), "chains-x-segments-0.json");
        assert_eq!(with_extension("chains-x-segments-0", "ogg"), "chains-x-segments-0.ogg");
    }
}
