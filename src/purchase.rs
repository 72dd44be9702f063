//! Purchase decision: per-line shortage against free stock and the suggested reorder quantity.
//!
//! Only an outright shortage produces a suggested order. A line below its
//! reorder point is flagged for audit but never triggers a purchase on its own.
use crate::deal::LineItem;
use std::collections::BTreeMap;
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandType {
    #[n(0)]
    RetailSales,
    #[n(1)]
    Wholesale,
    #[n(2)]
    Contract,
    #[n(3)]
    Internal,
}

impl DemandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemandType::RetailSales => "retail_sales",
            DemandType::Wholesale => "wholesale",
            DemandType::Contract => "contract",
            DemandType::Internal => "internal",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct StockRow {
    #[n(0)]
    pub sku: String,
    #[n(1)]
    pub on_hand: f64,
    #[n(2)]
    pub reserved: f64,
    #[n(3)]
    pub reorder_point: Option<f64>,
    #[n(4)]
    pub pack_size: Option<f64>,
    #[n(5)]
    pub supplier: Option<String>,
}

impl StockRow {
    pub fn new(sku: &str, on_hand: f64, reserved: f64) -> Self {
        Self {
            sku: sku.into(),
            on_hand,
            reserved,
            reorder_point: None,
            pack_size: None,
            supplier: None,
        }
    }
    pub fn set_pack_size(mut self, pack: f64) -> Self {
        self.pack_size = Some(pack);
        self
    }
    pub fn set_reorder_point(mut self, point: f64) -> Self {
        self.reorder_point = Some(point);
        self
    }
    pub fn set_supplier(mut self, supplier: &str) -> Self {
        self.supplier = Some(supplier.into());
        self
    }

    pub fn effective_free(&self) -> f64 {
        (self.on_hand - self.reserved).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseReason {
    ShortageDetected,
    NoPurchaseNeeded,
    NotRequiredForDemandType,
}

impl PurchaseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseReason::ShortageDetected => "shortage_detected",
            PurchaseReason::NoPurchaseNeeded => "no_purchase_needed",
            PurchaseReason::NotRequiredForDemandType => "not_required_for_demand_type",
        }
    }
}

impl fmt::Display for PurchaseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineDecision {
    pub sku: String,
    pub required_qty: f64,
    pub effective_free: f64,
    pub shortage: f64,
    pub suggested_order_qty: f64,
    pub below_reorder_point: bool,
    pub supplier: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseDecision {
    pub lines: Vec<LineDecision>,
    pub need_purchase: bool,
}

impl PurchaseDecision {
    pub fn reason(&self) -> PurchaseReason {
        if self.need_purchase {
            PurchaseReason::ShortageDetected
        } else {
            PurchaseReason::NoPurchaseNeeded
        }
    }
}

// pack counts this close to a whole number are that number
const PACK_EPSILON: f64 = 1e-9;

/// Rounds `shortage` up to the next multiple of `pack_size`.
///
/// A shortage that is already a whole number of packs, up to float noise
/// (0.7 of a 0.1 pack divides to 7.000000000000001), orders exactly that many.
pub fn round_to_pack(shortage: f64, pack_size: Option<f64>) -> f64 {
    if shortage <= 0.0 {
        return 0.0;
    }
    match pack_size {
        Some(pack) if pack > 0.0 => {
            let packs = shortage / pack;
            let nearest = packs.round();
            let packs = if (packs - nearest).abs() < PACK_EPSILON {
                nearest
            } else {
                packs.ceil()
            };
            packs * pack
        }
        _ => shortage,
    }
}

pub fn decide_line(
    line: &LineItem,
    stock: Option<&StockRow>,
    demand: DemandType,
    forecast: &BTreeMap<String, f64>,
) -> LineDecision {
    let multiplier = match demand {
        DemandType::RetailSales => forecast.get(&line.sku).copied().unwrap_or(1.0),
        _ => 1.0,
    };
    let required_qty = line.qty * multiplier;

    // an unknown sku has nothing free
    let effective_free = stock.map_or(0.0, StockRow::effective_free);
    let shortage = (required_qty - effective_free).max(0.0);
    let pack_size = stock.and_then(|s| s.pack_size);

    LineDecision {
        sku: line.sku.clone(),
        required_qty,
        effective_free,
        shortage,
        suggested_order_qty: round_to_pack(shortage, pack_size),
        below_reorder_point: stock
            .and_then(|s| s.reorder_point)
            .is_some_and(|point| effective_free - required_qty < point),
        supplier: stock.and_then(|s| s.supplier.clone()),
    }
}

pub fn decide(
    lines: &[LineItem],
    stock: &BTreeMap<String, StockRow>,
    demand: DemandType,
    forecast: &BTreeMap<String, f64>,
) -> PurchaseDecision {
    let lines: Vec<LineDecision> = lines
        .iter()
        .map(|line| decide_line(line, stock.get(&line.sku), demand, forecast))
        .collect();
    let need_purchase = lines.iter().any(|l| l.suggested_order_qty > 0.0);

    PurchaseDecision {
        lines,
        need_purchase,
    }
}
