//! Confirmation records tying a commercial commitment to the exact draft content that was accepted
use crate::deal::DealDraft;
use crate::error::WorkflowError;
use crate::types::TimeStamp;
use crate::utils::{self, hash_prefix};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRecord {
    #[n(0)]
    pub deal_id: String,
    #[n(1)]
    pub bdo_hash: String, // sha256 of the accepted draft's cbor
    #[n(2)]
    pub reference: String,
    #[n(3)]
    pub confirmed_at: TimeStamp<Utc>,
}

/// Lookup port, keyed by deal id and a prefix of the draft content hash.
pub trait ConfirmationStore {
    fn record(&self, confirmation: &ConfirmationRecord) -> anyhow::Result<()>;
    fn find(&self, deal_id: &str, hash_prefix: &str) -> anyhow::Result<Option<ConfirmationRecord>>;
}

impl ConfirmationRecord {
    /// Confirms `draft` as accepted under `deal_id`.
    pub fn for_draft(
        deal_id: &str,
        draft: &DealDraft,
        reference: &str,
        confirmed_at: TimeStamp<Utc>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            deal_id: deal_id.into(),
            bdo_hash: draft.content_hash()?,
            reference: reference.into(),
            confirmed_at,
        })
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        utils::check_sha256_hex(&self.bdo_hash)?;
        Ok(())
    }

    /// `<deal id>/<hash prefix>`
    pub fn key(&self, prefix_len: usize) -> String {
        lookup_key(&self.deal_id, hash_prefix(&self.bdo_hash, prefix_len))
    }

    /// True only when this record confirms exactly the content of `draft`.
    pub fn confirms(&self, draft: &DealDraft) -> anyhow::Result<bool> {
        Ok(self.bdo_hash == draft.content_hash()?)
    }
}

pub fn lookup_key(deal_id: &str, hash_prefix: &str) -> String {
    format!("{deal_id}/{hash_prefix}")
}

/// Finds the confirmation for `draft` and checks its full hash, not just the prefix.
pub fn confirmed_lineage(
    store: &dyn ConfirmationStore,
    deal_id: &str,
    draft: &DealDraft,
    prefix_len: usize,
) -> anyhow::Result<Option<ConfirmationRecord>> {
    let hash = draft.content_hash()?;
    let Some(record) = store.find(deal_id, hash_prefix(&hash, prefix_len))? else {
        return Ok(None);
    };
    if record.deal_id != deal_id || record.bdo_hash != hash {
        tracing::warn!(deal = deal_id, reference = %record.reference, "confirmation does not match draft content");
        return Ok(None);
    }
    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::{Direction, LineItem};
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MapStore(RefCell<BTreeMap<String, ConfirmationRecord>>);

    impl ConfirmationStore for MapStore {
        fn record(&self, confirmation: &ConfirmationRecord) -> anyhow::Result<()> {
            self.0
                .borrow_mut()
                .insert(confirmation.key(12), confirmation.clone());
            Ok(())
        }
        fn find(&self, deal_id: &str, prefix: &str) -> anyhow::Result<Option<ConfirmationRecord>> {
            Ok(self.0.borrow().get(&lookup_key(deal_id, prefix)).cloned())
        }
    }

    fn draft(qty: f64) -> DealDraft {
        DealDraft::new(Direction::Outbound)
            .set_source_id("bdo_9")
            .add_line(LineItem::new("A", "Sand", qty, 300.0, "t"))
    }

    #[test]
    fn lineage_requires_matching_content() {
        let store = MapStore::default();
        let accepted = draft(10.0);
        let record = ConfirmationRecord::for_draft("deal_1", &accepted, "CNF-1", TimeStamp::new()).unwrap();
        assert!(record.validate().is_ok());
        store.record(&record).unwrap();

        assert_eq!(
            confirmed_lineage(&store, "deal_1", &accepted, 12).unwrap(),
            Some(record.clone())
        );
        // renegotiated quantity no longer matches the confirmation
        assert_eq!(confirmed_lineage(&store, "deal_1", &draft(11.0), 12).unwrap(), None);
        assert_eq!(confirmed_lineage(&store, "deal_2", &accepted, 12).unwrap(), None);
        assert!(record.confirms(&accepted).unwrap());
    }

    #[test]
    fn tampered_hash_fails_validation() {
        let mut record = ConfirmationRecord::for_draft("deal_1", &draft(1.0), "CNF-1", TimeStamp::new()).unwrap();
        record.bdo_hash.truncate(20);
        assert!(record.validate().is_err());
    }
}
