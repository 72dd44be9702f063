//! Locking an accepted deal draft into an immutable, numbered staging snapshot.
//!
//! Once built, every field of a snapshot except `notes` is fixed. Mutation
//! goes through [`forbid_mutation`], which rejects any patch that names a
//! locked field instead of ignoring it.
use crate::deal::{DealDraft, Direction, Geography, LineItem, Party};
use crate::error::{ValidationError, WorkflowError};
use crate::status::OrderStatus;
use crate::types::TimeStamp;
use crate::utils;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Field patch keyed by snapshot field name. Only `notes` may appear.
pub type SnapshotPatch = serde_json::Map<String, Value>;

pub const MUTABLE_FIELDS: &[&str] = &["notes"];

/// Caller-supplied monotonic numbering for commercial documents.
pub trait NumberSeries {
    fn next_purchase(&self) -> anyhow::Result<u64>;
    fn next_sales(&self) -> anyhow::Result<u64>;
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum CommercialNumber {
    #[n(0)]
    Purchase(#[n(0)] String),
    #[n(1)]
    Sales(#[n(0)] String),
}

impl CommercialNumber {
    pub fn as_str(&self) -> &str {
        match self {
            CommercialNumber::Purchase(n) | CommercialNumber::Sales(n) => n,
        }
    }
    pub fn purchase_number(&self) -> Option<&str> {
        match self {
            CommercialNumber::Purchase(n) => Some(n),
            CommercialNumber::Sales(_) => None,
        }
    }
    pub fn sales_number(&self) -> Option<&str> {
        match self {
            CommercialNumber::Sales(n) => Some(n),
            CommercialNumber::Purchase(_) => None,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    #[n(0)]
    pub kind: String,
    #[n(1)]
    pub id: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    #[n(0)]
    pub subtotal: i64, // minor units
    #[n(1)]
    pub line_count: u32,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct OrderStagingSnapshot {
    #[n(0)]
    id: String,
    #[n(1)]
    source: SourceRef,
    #[n(2)]
    direction: Direction,
    #[n(3)]
    number: CommercialNumber,
    #[n(4)]
    counterparty: Option<Party>,
    #[n(5)]
    our_party: Option<Party>,
    #[n(6)]
    schedule: Option<String>,
    #[n(7)]
    transport: Option<String>,
    #[n(8)]
    geography: Option<Geography>,
    #[n(9)]
    lines: Vec<LineItem>,
    #[n(10)]
    totals: Totals,
    #[n(11)]
    status: OrderStatus,
    #[n(12)]
    created_at: TimeStamp<Utc>,
    #[n(13)]
    notes: Option<String>,
}

impl OrderStagingSnapshot {
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn source(&self) -> &SourceRef {
        &self.source
    }
    pub fn direction(&self) -> Direction {
        self.direction
    }
    pub fn number(&self) -> &CommercialNumber {
        &self.number
    }
    pub fn counterparty(&self) -> Option<&Party> {
        self.counterparty.as_ref()
    }
    pub fn our_party(&self) -> Option<&Party> {
        self.our_party.as_ref()
    }
    pub fn schedule(&self) -> Option<&str> {
        self.schedule.as_deref()
    }
    pub fn transport(&self) -> Option<&str> {
        self.transport.as_deref()
    }
    pub fn geography(&self) -> Option<&Geography> {
        self.geography.as_ref()
    }
    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }
    pub fn totals(&self) -> Totals {
        self.totals
    }
    pub fn status(&self) -> OrderStatus {
        self.status
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn finalise(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let contents = minicbor::to_vec(self)?;
        let hash = sha256::digest(&contents);

        Ok((hash, contents))
    }
}

/// Persistence port for locked snapshots, keyed by deal id.
pub trait SnapshotStore {
    /// Refuses to replace a snapshot already locked for `deal_id`.
    fn insert(&self, deal_id: &str, snapshot: &OrderStagingSnapshot) -> anyhow::Result<()>;
    fn get(&self, deal_id: &str) -> anyhow::Result<Option<OrderStagingSnapshot>>;
    /// Runs [`forbid_mutation`] and persists the result.
    fn patch(&self, deal_id: &str, patch: &SnapshotPatch) -> anyhow::Result<OrderStagingSnapshot>;
}

/// Names of the locked fields that differ between `a` and `b`.
pub fn locked_diff(a: &OrderStagingSnapshot, b: &OrderStagingSnapshot) -> Vec<String> {
    let checks = [
        ("id", a.id != b.id),
        ("source", a.source != b.source),
        ("direction", a.direction != b.direction),
        ("number", a.number != b.number),
        ("counterparty", a.counterparty != b.counterparty),
        ("our_party", a.our_party != b.our_party),
        ("schedule", a.schedule != b.schedule),
        ("transport", a.transport != b.transport),
        ("geography", a.geography != b.geography),
        ("lines", a.lines != b.lines),
        ("totals", a.totals != b.totals),
        ("status", a.status != b.status),
        ("created_at", a.created_at != b.created_at),
    ];
    checks
        .into_iter()
        .filter(|(_, differs)| *differs)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Sum of per-line rounded totals. Rounding happens before summation.
pub fn subtotal(lines: &[LineItem]) -> Result<i64, ValidationError> {
    lines.iter().try_fold(0i64, |sum, line| {
        line.rounded_total()
            .and_then(|total| sum.checked_add(total))
            .ok_or_else(|| ValidationError::TotalOverflow(line.sku.clone()))
    })
}

fn assign_number(
    direction: Direction,
    series: Option<&dyn NumberSeries>,
    now: DateTime<Utc>,
) -> anyhow::Result<CommercialNumber> {
    let inbound = direction == Direction::Inbound;
    let number = match series {
        Some(series) if inbound => format!("PO-{:06}", series.next_purchase()?),
        Some(series) => format!("SO-{:06}", series.next_sales()?),
        None => {
            // not collision safe: two locks in the same millisecond share a number
            tracing::warn!("no number series supplied, falling back to timestamp numbering");
            let prefix = if inbound { "PO" } else { "SO" };
            format!("{prefix}-T{}", now.timestamp_millis())
        }
    };
    Ok(if inbound {
        CommercialNumber::Purchase(number)
    } else {
        CommercialNumber::Sales(number)
    })
}

pub fn lock_from_bdo(
    draft: &DealDraft,
    series: Option<&dyn NumberSeries>,
    now: DateTime<Utc>,
) -> anyhow::Result<OrderStagingSnapshot> {
    draft.validate().map_err(WorkflowError::from)?;
    let source_id = draft.source_id().unwrap_or_default().to_string();

    let number = assign_number(draft.direction(), series, now)?;
    let lines = draft.lines().to_vec();
    let totals = Totals {
        subtotal: subtotal(&lines).map_err(WorkflowError::from)?,
        line_count: lines.len() as u32,
    };

    let snapshot = OrderStagingSnapshot {
        id: utils::new_uuid_to_bech32("snap_")?,
        source: SourceRef {
            kind: "bdo".into(),
            id: source_id,
        },
        direction: draft.direction(),
        number,
        counterparty: draft.counterparty().cloned(),
        our_party: draft.our_party().cloned(),
        schedule: draft.schedule().map(Into::into),
        transport: draft.transport().map(Into::into),
        geography: draft.geography().cloned(),
        lines,
        totals,
        status: OrderStatus::Staging,
        created_at: now.into(),
        notes: draft.notes().map(Into::into),
    };

    tracing::info!(
        snapshot = %snapshot.id,
        source = %snapshot.source.id,
        number = snapshot.number.as_str(),
        subtotal = snapshot.totals.subtotal,
        "locked staging snapshot"
    );
    Ok(snapshot)
}

/// Applies a notes-only patch. Any other key is rejected, and every offending key is listed.
pub fn forbid_mutation(
    prev: &OrderStagingSnapshot,
    patch: &SnapshotPatch,
) -> Result<OrderStagingSnapshot, WorkflowError> {
    let mut offending: Vec<String> = patch
        .keys()
        .filter(|k| !MUTABLE_FIELDS.contains(&k.as_str()))
        .cloned()
        .collect();
    if !offending.is_empty() {
        offending.sort();
        return Err(WorkflowError::ImmutableSnapshotViolation { fields: offending });
    }

    let mut next = prev.clone();
    match patch.get("notes") {
        None => {}
        Some(Value::Null) => next.notes = None,
        Some(Value::String(s)) => next.notes = Some(s.clone()),
        Some(_) => return Err(ValidationError::NotesType.into()),
    }
    Ok(next)
}
