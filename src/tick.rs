//! Supervision for cron-driven launch runs.
//!
//! A scheduler may fire the same job several times within one minute. The
//! deduper admits each (job, bucket) once and forgets buckets older than the
//! retention span. Every admitted run reports its outcome on a channel; a
//! failed run is logged and reported, never retried.
use crate::launch::LaunchReport;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc;

pub struct TickDeduper {
    bucket_secs: i64,
    retention_buckets: i64,
    buckets: BTreeMap<i64, BTreeSet<String>>,
}

impl TickDeduper {
    pub fn new(bucket_minutes: i64, retention_minutes: i64) -> Self {
        let bucket_minutes = bucket_minutes.max(1);
        Self {
            bucket_secs: bucket_minutes * 60,
            retention_buckets: (retention_minutes / bucket_minutes).max(1),
            buckets: BTreeMap::new(),
        }
    }

    pub fn bucket_of(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp().div_euclid(self.bucket_secs)
    }

    /// Start of the bucket containing `at`, truncated from `at` itself.
    pub fn bucket_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let into_bucket = Duration::seconds(at.timestamp().rem_euclid(self.bucket_secs))
            + Duration::nanoseconds(i64::from(at.timestamp_subsec_nanos()));
        // the offset is under one bucket, so this only fails at the very edge of chrono's range
        at.checked_sub_signed(into_bucket).unwrap_or(at)
    }

    /// True the first time `job` is seen in the bucket containing `at`.
    pub fn admit(&mut self, job: &str, at: DateTime<Utc>) -> bool {
        let bucket = self.bucket_of(at);
        self.evict_before(bucket - self.retention_buckets + 1);
        self.buckets.entry(bucket).or_default().insert(job.to_string())
    }

    fn evict_before(&mut self, oldest_kept: i64) {
        if self.buckets.first_key_value().is_some_and(|(b, _)| *b < oldest_kept) {
            self.buckets = self.buckets.split_off(&oldest_kept);
        }
    }

    /// Number of remembered (job, bucket) firings.
    pub fn len(&self) -> usize {
        self.buckets.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(String),
    Failed(String),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub job: String,
    pub bucket_start: DateTime<Utc>,
    pub outcome: TickOutcome,
}

/// One-line summary of a successful run, sent with its report.
pub trait TickSummary {
    fn summary(&self) -> String;
}

impl TickSummary for LaunchReport {
    fn summary(&self) -> String {
        format!(
            "{} of {} candidates launchable",
            self.launchable.len(),
            self.candidates.len()
        )
    }
}

impl TickSummary for () {
    fn summary(&self) -> String {
        "done".into()
    }
}

pub struct TickSupervisor {
    deduper: TickDeduper,
    reports: mpsc::Sender<TickReport>,
}

impl TickSupervisor {
    pub fn new(deduper: TickDeduper) -> (Self, mpsc::Receiver<TickReport>) {
        let (reports, rx) = mpsc::channel();
        (Self { deduper, reports }, rx)
    }

    /// Runs `task` unless `job` already fired in this bucket. Returns the task's value on success.
    pub fn fire<T, F>(&mut self, job: &str, at: DateTime<Utc>, task: F) -> Option<T>
    where
        T: TickSummary,
        F: FnOnce() -> anyhow::Result<T>,
    {
        let bucket_start = self.deduper.bucket_start(at);
        if !self.deduper.admit(job, at) {
            tracing::debug!(job, %bucket_start, "duplicate tick skipped");
            self.report(job, bucket_start, TickOutcome::Skipped);
            return None;
        }

        match task() {
            Ok(value) => {
                let summary = value.summary();
                tracing::info!(job, %bucket_start, %summary, "tick completed");
                self.report(job, bucket_start, TickOutcome::Completed(summary));
                Some(value)
            }
            Err(err) => {
                let message = format!("{err:#}");
                tracing::error!(job, %bucket_start, error = %message, "tick failed, not retried");
                self.report(job, bucket_start, TickOutcome::Failed(message));
                None
            }
        }
    }

    fn report(&self, job: &str, bucket_start: DateTime<Utc>, outcome: TickOutcome) {
        let report = TickReport {
            job: job.into(),
            bucket_start,
            outcome,
        };
        if self.reports.send(report).is_err() {
            tracing::debug!(job, "tick report receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, h, m, s).unwrap()
    }

    #[test]
    fn admits_once_per_minute() {
        let mut dedupe = TickDeduper::new(1, 60);
        assert!(dedupe.admit("launch", at(9, 0, 1)));
        assert!(!dedupe.admit("launch", at(9, 0, 59)));
        assert!(dedupe.admit("other", at(9, 0, 30)));
        assert!(dedupe.admit("launch", at(9, 1, 0)));
    }

    #[test]
    fn bucket_start_truncates_the_firing_time() {
        assert_eq!(TickDeduper::new(1, 60).bucket_start(at(9, 0, 42)), at(9, 0, 0));

        let quarter = TickDeduper::new(15, 60);
        assert_eq!(quarter.bucket_start(at(9, 14, 59)), at(9, 0, 0));
        assert_eq!(quarter.bucket_start(at(9, 15, 0)), at(9, 15, 0));

        let subsec = at(9, 0, 42) + Duration::milliseconds(250);
        assert_eq!(TickDeduper::new(1, 60).bucket_start(subsec), at(9, 0, 0));
    }

    #[test]
    fn bucket_start_before_epoch_stays_in_its_own_day() {
        let fired = Utc.with_ymd_and_hms(1960, 3, 1, 8, 7, 31).unwrap();
        let start = TickDeduper::new(5, 60).bucket_start(fired);
        assert_eq!(start, Utc.with_ymd_and_hms(1960, 3, 1, 8, 5, 0).unwrap());
    }

    #[test]
    fn reports_carry_bucket_start() {
        let (mut sup, rx) = TickSupervisor::new(TickDeduper::new(1, 60));
        sup.fire("launch", at(9, 3, 17), || Ok(()));
        let report = rx.try_recv().unwrap();
        assert_eq!(report.bucket_start, at(9, 3, 0));
    }

    #[test]
    fn old_buckets_expire() {
        let mut dedupe = TickDeduper::new(1, 5);
        dedupe.admit("launch", at(9, 0, 0));
        for m in 1..5 {
            dedupe.admit("launch", at(9, m, 0));
        }
        assert_eq!(dedupe.len(), 5);

        dedupe.admit("launch", at(9, 5, 0));
        assert_eq!(dedupe.len(), 5);
        // 09:00 has been forgotten
        assert!(dedupe.admit("launch", at(9, 0, 0)));
    }

    #[test]
    fn memory_is_bounded_under_sustained_ticks() {
        let mut dedupe = TickDeduper::new(1, 10);
        for m in 0..600 {
            let t = at(0, 0, 0) + chrono::Duration::minutes(m);
            dedupe.admit("a", t);
            dedupe.admit("b", t);
        }
        assert_eq!(dedupe.len(), 20);
    }

    #[test]
    fn supervisor_reports_every_outcome() {
        let (mut sup, rx) = TickSupervisor::new(TickDeduper::new(1, 60));

        assert_eq!(sup.fire("launch", at(9, 0, 0), || Ok(())), Some(()));
        assert_eq!(sup.fire("launch", at(9, 0, 10), || Ok(())), None);
        let failed: Option<()> = sup.fire("report", at(9, 0, 0), || anyhow::bail!("store offline"));
        assert!(failed.is_none());

        let outcomes: Vec<TickOutcome> = rx.try_iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                TickOutcome::Completed("done".into()),
                TickOutcome::Skipped,
                TickOutcome::Failed("store offline".into()),
            ]
        );
    }

    #[test]
    fn failed_tick_is_not_retried_within_bucket() {
        let (mut sup, rx) = TickSupervisor::new(TickDeduper::new(1, 60));
        let mut calls = 0;
        let _: Option<()> = sup.fire("launch", at(9, 0, 0), || {
            calls += 1;
            anyhow::bail!("boom")
        });
        let _: Option<()> = sup.fire("launch", at(9, 0, 30), || {
            calls += 1;
            Ok(())
        });
        assert_eq!(calls, 1);
        assert_eq!(rx.try_iter().count(), 2);
    }
}
