//! Schedule gate: does a deal need an order on a given calendar date?
//!
//! Precedence, first match wins: ad-hoc date, missing baton, exception day,
//! forced addition, cadence match, then the launch window before the cutoff.
//! Dates are compared as UTC calendar days, never as instants.
use crate::types::{CalendarDate, DailyTime};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::fmt;

const CYCLE_DAYS: i64 = 28;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    #[n(0)]
    TwentyEightDay,
    #[n(1)]
    Monthly,
    #[n(2)]
    Hybrid,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ScheduleBaton {
    #[n(0)]
    pub cadence: Cadence,
    #[n(1)]
    pub anchor: CalendarDate,
    #[n(2)]
    pub cutoff: Option<DailyTime>,
    #[n(3)]
    pub include_weekends: Option<bool>,
    #[n(4)]
    pub exceptions: BTreeSet<CalendarDate>,
    #[n(5)]
    pub additions: BTreeSet<CalendarDate>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct AdHocBaton {
    #[n(0)]
    pub dates: BTreeSet<CalendarDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleReason {
    AdHoc,
    NoScheduleBaton,
    ExceptionDay,
    ForcedAddition,
    NotScheduledToday,
    ScheduledAndWithinWindow,
    ScheduledButPastWindow,
}

impl ScheduleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleReason::AdHoc => "ad_hoc",
            ScheduleReason::NoScheduleBaton => "no_schedule_baton",
            ScheduleReason::ExceptionDay => "exception_day",
            ScheduleReason::ForcedAddition => "forced_addition",
            ScheduleReason::NotScheduledToday => "not_scheduled_today",
            ScheduleReason::ScheduledAndWithinWindow => "scheduled_and_within_window",
            ScheduleReason::ScheduledButPastWindow => "scheduled_but_past_window",
        }
    }

    /// Reasons that come from an explicit override rather than the cadence.
    pub fn is_override(&self) -> bool {
        matches!(self, ScheduleReason::AdHoc | ScheduleReason::ForcedAddition)
    }
}

impl fmt::Display for ScheduleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub need_order: bool,
    pub reason: ScheduleReason,
}

impl GateDecision {
    fn new(need_order: bool, reason: ScheduleReason) -> Self {
        Self { need_order, reason }
    }
}

impl ScheduleBaton {
    pub fn new(cadence: Cadence, anchor: CalendarDate) -> Self {
        Self {
            cadence,
            anchor,
            cutoff: None,
            include_weekends: None,
            exceptions: BTreeSet::new(),
            additions: BTreeSet::new(),
        }
    }
    pub fn set_cutoff(mut self, cutoff: DailyTime) -> Self {
        self.cutoff = Some(cutoff);
        self
    }
    pub fn set_include_weekends(mut self, include: bool) -> Self {
        self.include_weekends = Some(include);
        self
    }
    pub fn add_exception(mut self, date: CalendarDate) -> Self {
        self.exceptions.insert(date);
        self
    }
    pub fn add_addition(mut self, date: CalendarDate) -> Self {
        self.additions.insert(date);
        self
    }

    /// Next 28-day occurrence on or after `target`, counted from the anchor.
    pub fn next_cycle_date(&self, target: CalendarDate) -> Option<CalendarDate> {
        let since = target.days_since(self.anchor);
        if since < 0 {
            return None;
        }
        let cycles = (since + CYCLE_DAYS - 1) / CYCLE_DAYS;
        self.anchor
            .naive()
            .checked_add_signed(Duration::days(cycles * CYCLE_DAYS))
            .map(CalendarDate::from)
    }

    pub fn cadence_matches(&self, target: CalendarDate) -> bool {
        if target < self.anchor {
            return false;
        }
        if self.include_weekends == Some(false) && target.is_weekend() {
            return false;
        }
        let cycle = || self.next_cycle_date(target) == Some(target);
        let monthly = || target.day() == self.anchor.day();
        match self.cadence {
            Cadence::TwentyEightDay => cycle(),
            Cadence::Monthly => monthly(),
            Cadence::Hybrid => cycle() || monthly(),
        }
    }

    /// Whether `now` falls in the `window_hours` leading up to the cutoff on `target`.
    pub fn within_window(&self, target: CalendarDate, now: DateTime<Utc>, window_hours: u32) -> bool {
        let Some(cutoff) = self.cutoff else {
            return true;
        };
        let cutoff_at = cutoff.on(target);
        let opens_at = cutoff_at - Duration::hours(i64::from(window_hours));
        opens_at <= now && now <= cutoff_at
    }
}

pub fn evaluate(
    baton: Option<&ScheduleBaton>,
    ad_hoc: Option<&AdHocBaton>,
    target: CalendarDate,
    now: DateTime<Utc>,
    window_hours: u32,
) -> GateDecision {
    if ad_hoc.is_some_and(|a| a.dates.contains(&target)) {
        return GateDecision::new(true, ScheduleReason::AdHoc);
    }
    let Some(baton) = baton else {
        return GateDecision::new(false, ScheduleReason::NoScheduleBaton);
    };
    if baton.exceptions.contains(&target) {
        return GateDecision::new(false, ScheduleReason::ExceptionDay);
    }
    if baton.additions.contains(&target) {
        return GateDecision::new(true, ScheduleReason::ForcedAddition);
    }
    if !baton.cadence_matches(target) {
        return GateDecision::new(false, ScheduleReason::NotScheduledToday);
    }
    if baton.within_window(target, now, window_hours) {
        GateDecision::new(true, ScheduleReason::ScheduledAndWithinWindow)
    } else {
        GateDecision::new(false, ScheduleReason::ScheduledButPastWindow)
    }
}
