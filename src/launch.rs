//! Launch orchestration: which confirmed deals may have an order created today.
//!
//! A deal must pass three gates. Without a confirmation whose hash matches the
//! draft it is dropped entirely. Failing the schedule gate or the purchase gate
//! keeps it in the candidate list, with the blocking reason, but out of the
//! launchable subset. Ad-hoc and forced-addition days bypass the stock check.
use crate::confirmation::{self, ConfirmationStore};
use crate::deal::DealDraft;
use crate::purchase::{self, DemandType, PurchaseDecision, PurchaseReason, StockRow};
use crate::schedule::{self, AdHocBaton, GateDecision, ScheduleBaton, ScheduleReason};
use crate::types::{CalendarDate, Clock};
use anyhow::Context;
use std::collections::BTreeMap;
use std::fmt;

pub trait ScheduleStore {
    fn baton(&self, deal_id: &str) -> anyhow::Result<Option<ScheduleBaton>>;
    fn ad_hoc(&self, deal_id: &str) -> anyhow::Result<Option<AdHocBaton>>;
}

pub trait StockLedger {
    fn stock(&self, sku: &str) -> anyhow::Result<Option<StockRow>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaunchCandidate {
    pub deal_id: String,
    pub draft: DealDraft,
    pub demand_type: DemandType,
    pub forecast: BTreeMap<String, f64>, // sku -> multiplier
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchQuery {
    pub target_date: CalendarDate,
    pub window_hours: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Schedule(ScheduleReason),
    NoPurchaseNeeded,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::Schedule(reason) => reason.as_str(),
            BlockReason::NoPurchaseNeeded => "no_purchase_needed",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateReport {
    pub deal_id: String,
    pub confirmation_ref: String,
    pub schedule: GateDecision,
    pub purchase: Option<PurchaseDecision>,
    pub purchase_reason: PurchaseReason,
    pub blocked_by: Option<BlockReason>,
}

impl CandidateReport {
    pub fn is_launchable(&self) -> bool {
        self.blocked_by.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchReport {
    pub candidates: Vec<CandidateReport>,
    pub launchable: Vec<CandidateReport>,
}

impl LaunchReport {
    pub fn launchable_ids(&self) -> Vec<&str> {
        self.launchable.iter().map(|c| c.deal_id.as_str()).collect()
    }
}

pub struct LaunchOrchestrator<'a> {
    confirmations: &'a dyn ConfirmationStore,
    schedules: &'a dyn ScheduleStore,
    stock: &'a dyn StockLedger,
    clock: &'a dyn Clock,
    hash_prefix_len: usize,
}

impl<'a> LaunchOrchestrator<'a> {
    pub fn new(
        confirmations: &'a dyn ConfirmationStore,
        schedules: &'a dyn ScheduleStore,
        stock: &'a dyn StockLedger,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            confirmations,
            schedules,
            stock,
            clock,
            hash_prefix_len: 12,
        }
    }

    pub fn with_hash_prefix_len(mut self, len: usize) -> Self {
        self.hash_prefix_len = len;
        self
    }

    pub fn run(&self, query: &LaunchQuery, candidates: &[LaunchCandidate]) -> anyhow::Result<LaunchReport> {
        let mut report = LaunchReport::default();
        for candidate in candidates {
            let evaluated = self
                .evaluate(query, candidate)
                .with_context(|| format!("evaluating deal {}", candidate.deal_id))?;
            let Some(entry) = evaluated else {
                continue;
            };
            if entry.is_launchable() {
                report.launchable.push(entry.clone());
            }
            report.candidates.push(entry);
        }

        tracing::info!(
            target_date = %query.target_date,
            offered = candidates.len(),
            candidates = report.candidates.len(),
            launchable = report.launchable.len(),
            "launch evaluation finished"
        );
        Ok(report)
    }

    /// `None` when the deal has no confirmation linked to its current draft content.
    pub fn evaluate(
        &self,
        query: &LaunchQuery,
        candidate: &LaunchCandidate,
    ) -> anyhow::Result<Option<CandidateReport>> {
        let deal_id = candidate.deal_id.as_str();
        let Some(confirmation) = confirmation::confirmed_lineage(
            self.confirmations,
            deal_id,
            &candidate.draft,
            self.hash_prefix_len,
        )?
        else {
            tracing::debug!(deal = deal_id, "no confirmed lineage, excluded");
            return Ok(None);
        };

        let baton = self.schedules.baton(deal_id)?;
        let ad_hoc = self.schedules.ad_hoc(deal_id)?;
        let schedule = schedule::evaluate(
            baton.as_ref(),
            ad_hoc.as_ref(),
            query.target_date,
            self.clock.now(),
            query.window_hours,
        );

        let purchase = match candidate.demand_type {
            DemandType::RetailSales => Some(self.purchase_decision(candidate)?),
            _ => None,
        };
        let purchase_reason = purchase
            .as_ref()
            .map_or(PurchaseReason::NotRequiredForDemandType, PurchaseDecision::reason);

        let blocked_by = if !schedule.need_order {
            Some(BlockReason::Schedule(schedule.reason))
        } else if purchase.as_ref().is_some_and(|p| !p.need_purchase) && !schedule.reason.is_override() {
            Some(BlockReason::NoPurchaseNeeded)
        } else {
            None
        };

        tracing::debug!(
            deal = deal_id,
            schedule = %schedule.reason,
            purchase = %purchase_reason,
            blocked = blocked_by.map(|b| b.as_str()),
            "deal evaluated"
        );
        Ok(Some(CandidateReport {
            deal_id: deal_id.into(),
            confirmation_ref: confirmation.reference,
            schedule,
            purchase,
            purchase_reason,
            blocked_by,
        }))
    }

    fn purchase_decision(&self, candidate: &LaunchCandidate) -> anyhow::Result<PurchaseDecision> {
        let mut rows = BTreeMap::new();
        for line in candidate.draft.lines() {
            if rows.contains_key(&line.sku) {
                continue;
            }
            if let Some(row) = self.stock.stock(&line.sku)? {
                rows.insert(line.sku.clone(), row);
            }
        }
        Ok(purchase::decide(
            candidate.draft.lines(),
            &rows,
            candidate.demand_type,
            &candidate.forecast,
        ))
    }
}
