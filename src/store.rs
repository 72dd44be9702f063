//! sled-backed adapters for every persistence port.
//!
//! Records are CBOR encoded. Each adapter owns one named tree of the shared
//! database, so a single `Arc<sled::Db>` serves the whole workflow.
use crate::booking::{BookingRecord, BookingRepo, Sequence};
use crate::confirmation::{ConfirmationRecord, ConfirmationStore, lookup_key};
use crate::error::WorkflowError;
use crate::launch::{ScheduleStore, StockLedger};
use crate::purchase::StockRow;
use crate::schedule::{AdHocBaton, ScheduleBaton};
use crate::snapshot::{self, NumberSeries, OrderStagingSnapshot, SnapshotPatch, SnapshotStore};
use sled::Batch;
use std::sync::Arc;

// atomic within one process; multi-instance deployments need a central sequence
fn increment(tree: &sled::Tree, key: &str) -> anyhow::Result<u64> {
    let next = tree.update_and_fetch(key, |old| {
        let current = old
            .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
            .map_or(0, u64::from_be_bytes);
        Some((current + 1).to_be_bytes().to_vec())
    })?;
    let bytes = next.ok_or_else(|| anyhow::anyhow!("counter {key} missing after increment"))?;
    Ok(u64::from_be_bytes(<[u8; 8]>::try_from(bytes.as_ref())?))
}

fn get_decoded<T>(tree: &sled::Tree, key: &str) -> anyhow::Result<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key)? {
        Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Named monotonic counter, used for booking confirmation references.
pub struct SledSequence {
    tree: sled::Tree,
    name: String,
}

impl SledSequence {
    pub fn open(db: &Arc<sled::Db>, name: &str) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("sequences")?,
            name: name.into(),
        })
    }
}

impl Sequence for SledSequence {
    fn next(&self) -> anyhow::Result<u64> {
        increment(&self.tree, &format!("seq/{}", self.name))
    }
}

pub struct SledNumberSeries {
    tree: sled::Tree,
}

impl SledNumberSeries {
    pub fn open(db: &Arc<sled::Db>) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("sequences")?,
        })
    }
}

impl NumberSeries for SledNumberSeries {
    fn next_purchase(&self) -> anyhow::Result<u64> {
        increment(&self.tree, "series/purchase")
    }
    fn next_sales(&self) -> anyhow::Result<u64> {
        increment(&self.tree, "series/sales")
    }
}

pub struct SledSnapshotStore {
    tree: sled::Tree,
}

impl SledSnapshotStore {
    pub fn open(db: &Arc<sled::Db>) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("snapshots")?,
        })
    }
}

impl SnapshotStore for SledSnapshotStore {
    fn insert(&self, deal_id: &str, snapshot: &OrderStagingSnapshot) -> anyhow::Result<()> {
        let cbor = minicbor::to_vec(snapshot)?;
        if self
            .tree
            .compare_and_swap(deal_id, None as Option<&[u8]>, Some(cbor))?
            .is_err()
        {
            let existing: OrderStagingSnapshot = get_decoded(&self.tree, deal_id)?
                .ok_or_else(|| anyhow::anyhow!("snapshot for {deal_id} vanished"))?;
            return Err(WorkflowError::ImmutableSnapshotViolation {
                fields: snapshot::locked_diff(&existing, snapshot),
            }
            .into());
        }
        tracing::debug!(deal = deal_id, snapshot = snapshot.id(), "snapshot stored");
        Ok(())
    }

    fn get(&self, deal_id: &str) -> anyhow::Result<Option<OrderStagingSnapshot>> {
        get_decoded(&self.tree, deal_id)
    }

    fn patch(&self, deal_id: &str, patch: &SnapshotPatch) -> anyhow::Result<OrderStagingSnapshot> {
        let old = self.tree.get(deal_id)?.ok_or_else(|| WorkflowError::NotFound {
            entity: "snapshot",
            id: deal_id.into(),
        })?;
        let prev: OrderStagingSnapshot = minicbor::decode(&old)?;
        let next = snapshot::forbid_mutation(&prev, patch)?;

        // the compare guards against a concurrent notes edit landing in between
        self.tree
            .compare_and_swap(deal_id, Some(old), Some(minicbor::to_vec(&next)?))?
            .map_err(|_| anyhow::anyhow!("snapshot for {deal_id} changed during patch"))?;
        Ok(next)
    }
}

pub struct SledBookingRepo {
    tree: sled::Tree,
}

impl SledBookingRepo {
    pub fn open(db: &Arc<sled::Db>) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("bookings")?,
        })
    }

    fn record_key(id: &str) -> String {
        format!("booking/{id}")
    }

    fn index_key(snapshot_id: &str, id: &str) -> String {
        format!("by_snapshot/{snapshot_id}/{id}")
    }
}

impl BookingRepo for SledBookingRepo {
    fn save(&self, booking: &BookingRecord) -> anyhow::Result<()> {
        let key = Self::record_key(&booking.id);
        if self.tree.contains_key(&key)? {
            anyhow::bail!("booking {} already exists", booking.id);
        }
        // record and index land together
        let mut batch = Batch::default();
        batch.insert(key.as_bytes(), minicbor::to_vec(booking)?);
        batch.insert(
            Self::index_key(&booking.snapshot_id, &booking.id).as_bytes(),
            booking.id.as_bytes(),
        );
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> anyhow::Result<Option<BookingRecord>> {
        get_decoded(&self.tree, &Self::record_key(id))
    }

    fn list_by_snapshot(&self, snapshot_id: &str) -> anyhow::Result<Vec<BookingRecord>> {
        let mut bookings = vec![];
        for entry in self.tree.scan_prefix(format!("by_snapshot/{snapshot_id}/")) {
            let (_, id) = entry?;
            let id = String::from_utf8(id.to_vec())?;
            if let Some(booking) = self.get_by_id(&id)? {
                bookings.push(booking);
            }
        }
        Ok(bookings)
    }

    fn update(&self, booking: &BookingRecord) -> anyhow::Result<()> {
        let key = Self::record_key(&booking.id);
        if !self.tree.contains_key(&key)? {
            return Err(WorkflowError::NotFound {
                entity: "booking",
                id: booking.id.clone(),
            }
            .into());
        }
        self.tree.insert(key.as_bytes(), minicbor::to_vec(booking)?)?;
        Ok(())
    }
}

pub struct SledConfirmationStore {
    tree: sled::Tree,
    prefix_len: usize,
}

impl SledConfirmationStore {
    pub fn open(db: &Arc<sled::Db>, prefix_len: usize) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("confirmations")?,
            prefix_len,
        })
    }
}

impl ConfirmationStore for SledConfirmationStore {
    fn record(&self, confirmation: &ConfirmationRecord) -> anyhow::Result<()> {
        confirmation.validate()?;
        self.tree.insert(
            confirmation.key(self.prefix_len).as_bytes(),
            minicbor::to_vec(confirmation)?,
        )?;
        Ok(())
    }

    fn find(&self, deal_id: &str, hash_prefix: &str) -> anyhow::Result<Option<ConfirmationRecord>> {
        get_decoded(&self.tree, &lookup_key(deal_id, hash_prefix))
    }
}

pub struct SledScheduleStore {
    batons: sled::Tree,
    ad_hoc: sled::Tree,
}

impl SledScheduleStore {
    pub fn open(db: &Arc<sled::Db>) -> anyhow::Result<Self> {
        Ok(Self {
            batons: db.open_tree("schedule_batons")?,
            ad_hoc: db.open_tree("ad_hoc_batons")?,
        })
    }

    pub fn put_baton(&self, deal_id: &str, baton: &ScheduleBaton) -> anyhow::Result<()> {
        self.batons.insert(deal_id, minicbor::to_vec(baton)?)?;
        Ok(())
    }

    pub fn put_ad_hoc(&self, deal_id: &str, baton: &AdHocBaton) -> anyhow::Result<()> {
        self.ad_hoc.insert(deal_id, minicbor::to_vec(baton)?)?;
        Ok(())
    }
}

impl ScheduleStore for SledScheduleStore {
    fn baton(&self, deal_id: &str) -> anyhow::Result<Option<ScheduleBaton>> {
        get_decoded(&self.batons, deal_id)
    }

    fn ad_hoc(&self, deal_id: &str) -> anyhow::Result<Option<AdHocBaton>> {
        get_decoded(&self.ad_hoc, deal_id)
    }
}

pub struct SledStockLedger {
    tree: sled::Tree,
}

impl SledStockLedger {
    pub fn open(db: &Arc<sled::Db>) -> anyhow::Result<Self> {
        Ok(Self {
            tree: db.open_tree("stock")?,
        })
    }

    pub fn put(&self, row: &StockRow) -> anyhow::Result<()> {
        self.tree.insert(row.sku.as_bytes(), minicbor::to_vec(row)?)?;
        Ok(())
    }
}

impl StockLedger for SledStockLedger {
    fn stock(&self, sku: &str) -> anyhow::Result<Option<StockRow>> {
        get_decoded(&self.tree, sku)
    }
}
