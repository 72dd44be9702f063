//! Property-based tests for staging totals, purchase decisions and schedule precedence
//!
//! These cover the arithmetic invariants that example-based tests tend to
//! miss: per-line rounding before summation, pack rounding never under-ordering,
//! and override days winning regardless of the baton.

use proptest::prelude::*;
use chrono::{TimeZone, Utc};
use obari_workflow::{
    deal::{DealDraft, Direction, LineItem},
    purchase::{self, DemandType, StockRow},
    schedule::{self, AdHocBaton, Cadence, ScheduleBaton, ScheduleReason},
    snapshot,
    types::CalendarDate,
};
use std::collections::BTreeMap;

fn line_strategy() -> impl Strategy<Value = LineItem> {
    ("[A-Z]{1,3}", 0.0..500.0f64, 0.0..10_000.0f64)
        .prop_map(|(sku, qty, price)| LineItem::new(&sku, "item", qty, price, "ea"))
}

fn date_strategy() -> impl Strategy<Value = CalendarDate> {
    (2025i32..2028, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| CalendarDate::from_ymd(y, m, d).unwrap())
}

proptest! {
    #[test]
    fn subtotal_is_sum_of_rounded_lines(lines in prop::collection::vec(line_strategy(), 1..12)) {
        let expected: i64 = lines.iter().map(|l| (l.qty * l.unit_price).round() as i64).sum();
        prop_assert_eq!(snapshot::subtotal(&lines), Ok(expected));

        let draft = lines
            .iter()
            .cloned()
            .fold(DealDraft::new(Direction::Outbound).set_source_id("bdo_p"), DealDraft::add_line);
        let snap = snapshot::lock_from_bdo(&draft, None, Utc::now()).unwrap();
        prop_assert_eq!(snap.totals().subtotal, expected);
        prop_assert_eq!(snap.totals().line_count as usize, lines.len());
    }

    #[test]
    fn pack_rounding_covers_shortage(shortage in 0.0..1_000.0f64, pack in 0.5..50.0f64) {
        let ordered = purchase::round_to_pack(shortage, Some(pack));
        // a shortage within float noise of a whole pack count may land a hair under it
        prop_assert!(ordered >= shortage - 1e-6);
        prop_assert!(ordered - shortage < pack);
        if shortage > 0.0 {
            let packs = ordered / pack;
            prop_assert!((packs - packs.round()).abs() < 1e-6);
        }
    }

    #[test]
    fn purchase_needed_iff_some_line_short(
        lines in prop::collection::vec(line_strategy(), 1..6),
        on_hand in 0.0..600.0f64,
        reserved in 0.0..100.0f64,
    ) {
        let stock: BTreeMap<String, StockRow> = lines
            .iter()
            .map(|l| (l.sku.clone(), StockRow::new(&l.sku, on_hand, reserved)))
            .collect();
        let decision = purchase::decide(&lines, &stock, DemandType::Wholesale, &BTreeMap::new());

        prop_assert_eq!(decision.lines.len(), lines.len());
        let any_short = decision.lines.iter().any(|l| l.shortage > 0.0);
        prop_assert_eq!(decision.need_purchase, any_short);
        for l in &decision.lines {
            prop_assert!(l.effective_free >= 0.0);
            prop_assert!(l.suggested_order_qty >= l.shortage);
        }
    }

    #[test]
    fn ad_hoc_day_always_orders(
        anchor in date_strategy(),
        target in date_strategy(),
        cadence in prop::sample::select(vec![Cadence::TwentyEightDay, Cadence::Monthly, Cadence::Hybrid]),
        excepted in any::<bool>(),
    ) {
        let mut baton = ScheduleBaton::new(cadence, anchor).set_include_weekends(false);
        if excepted {
            baton = baton.add_exception(target);
        }
        let ad_hoc = AdHocBaton { dates: [target].into() };
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();

        let decision = schedule::evaluate(Some(&baton), Some(&ad_hoc), target, now, 1);
        prop_assert!(decision.need_order);
        prop_assert_eq!(decision.reason, ScheduleReason::AdHoc);
    }

    #[test]
    fn twenty_eight_day_cycle_repeats(anchor in date_strategy(), cycles in 0i64..40, offset in 1i64..28) {
        let baton = ScheduleBaton::new(Cadence::TwentyEightDay, anchor);
        let hit = CalendarDate::from(anchor.naive() + chrono::Duration::days(cycles * 28));
        let miss = CalendarDate::from(hit.naive() + chrono::Duration::days(offset));

        prop_assert!(baton.cadence_matches(hit));
        prop_assert!(!baton.cadence_matches(miss));
        prop_assert_eq!(baton.next_cycle_date(miss), Some(CalendarDate::from(
            hit.naive() + chrono::Duration::days(28)
        )));
    }
}
