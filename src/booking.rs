//! Booking lifecycle: bookings created from a staging snapshot and moved
//! through planned → confirmed → en_route → complete, or cancelled.
use crate::deal::Direction;
use crate::error::{ValidationError, WorkflowError};
use crate::events::{Event, EventBus, StatusTransition};
use crate::snapshot::OrderStagingSnapshot;
use crate::status::{BookingStatus, EntityKind, Lifecycle, OrderStatus};
use crate::types::{Clock, SystemClock, TimeStamp};
use crate::utils;
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingMode {
    #[n(0)]
    Collection,
    #[n(1)]
    Delivery,
    #[n(2)]
    Job,
}

impl From<Direction> for BookingMode {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Inbound => BookingMode::Collection,
            Direction::Outbound => BookingMode::Delivery,
            Direction::Internal => BookingMode::Job,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    #[n(0)]
    pub start: TimeStamp<Utc>,
    #[n(1)]
    pub end: TimeStamp<Utc>,
}

impl TimeWindow {
    pub fn new(start: TimeStamp<Utc>, end: TimeStamp<Utc>) -> Self {
        Self { start, end }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end <= self.start {
            return Err(ValidationError::MalformedWindow);
        }
        Ok(())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    #[n(0)]
    Vehicle,
    #[n(1)]
    Driver,
    #[n(2)]
    Crew,
    #[n(3)]
    Plant,
    #[n(4)]
    Dock,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    #[n(0)]
    pub kind: ResourceKind,
    #[n(1)]
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: &str) -> Self {
        Self { kind, id: id.into() }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    #[n(0)]
    pub reference: String, // <prefix>-YYYYMMDD-NNNN
    #[n(1)]
    pub issued_at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct BookingRecord {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub snapshot_id: String,
    #[n(2)]
    pub mode: BookingMode,
    #[n(3)]
    pub window: TimeWindow,
    #[n(4)]
    pub resources: Vec<ResourceRef>,
    #[n(5)]
    pub status: BookingStatus,
    #[n(6)]
    pub confirmation: Option<Confirmation>,
    #[n(7)]
    pub notes: Option<String>,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
    #[n(9)]
    pub updated_at: TimeStamp<Utc>,
}

/// Persistence port. Single writer per booking id; callers serialise concurrent updates.
pub trait BookingRepo {
    fn save(&self, booking: &BookingRecord) -> anyhow::Result<()>;
    fn get_by_id(&self, id: &str) -> anyhow::Result<Option<BookingRecord>>;
    fn list_by_snapshot(&self, snapshot_id: &str) -> anyhow::Result<Vec<BookingRecord>>;
    fn update(&self, booking: &BookingRecord) -> anyhow::Result<()>;
}

/// Atomic counter for confirmation references.
pub trait Sequence {
    fn next(&self) -> anyhow::Result<u64>;
}

#[derive(Debug, Clone, Copy)]
pub struct Assignment<'a> {
    pub snapshot_id: &'a str,
    pub window: &'a TimeWindow,
    pub resources: &'a [ResourceRef],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapacityDecision {
    Allow,
    Deny(String),
}

pub trait CapacityGuard: Send + Sync {
    fn check(&self, assignment: &Assignment<'_>) -> anyhow::Result<CapacityDecision>;
}

pub struct BookingService<R, S> {
    repo: R,
    sequence: S,
    capacity: Option<Box<dyn CapacityGuard>>,
    clock: Box<dyn Clock>,
    bus: EventBus,
    ref_prefix: String,
}

impl<R: BookingRepo, S: Sequence> BookingService<R, S> {
    pub fn new(repo: R, sequence: S) -> Self {
        Self {
            repo,
            sequence,
            capacity: None,
            clock: Box::new(SystemClock),
            bus: EventBus::new(),
            ref_prefix: "BK".into(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_capacity_guard(mut self, guard: impl CapacityGuard + 'static) -> Self {
        self.capacity = Some(Box::new(guard));
        self
    }

    pub fn with_ref_prefix(mut self, prefix: &str) -> Self {
        self.ref_prefix = prefix.into();
        self
    }

    /// Subscribe to `booking.created` / `booking.status_changed` here.
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    fn now(&self) -> TimeStamp<Utc> {
        self.clock.now().into()
    }

    pub fn get(&self, id: &str) -> anyhow::Result<BookingRecord> {
        self.repo
            .get_by_id(id)?
            .ok_or_else(|| {
                WorkflowError::NotFound {
                    entity: "booking",
                    id: id.into(),
                }
                .into()
            })
    }

    pub fn list_for_snapshot(&self, snapshot_id: &str) -> anyhow::Result<Vec<BookingRecord>> {
        self.repo.list_by_snapshot(snapshot_id)
    }

    pub fn create_booking(
        &self,
        snapshot: &OrderStagingSnapshot,
        window: TimeWindow,
        resources: Vec<ResourceRef>,
        notes: Option<String>,
    ) -> anyhow::Result<BookingRecord> {
        if snapshot.status() != OrderStatus::Staging {
            return Err(WorkflowError::from(ValidationError::SnapshotNotStaging(
                snapshot.status().as_str().into(),
            ))
            .into());
        }
        window.validate().map_err(WorkflowError::from)?;
        if resources.is_empty() {
            return Err(WorkflowError::from(ValidationError::NoResources).into());
        }

        if let Some(guard) = &self.capacity {
            let assignment = Assignment {
                snapshot_id: snapshot.id(),
                window: &window,
                resources: &resources,
            };
            if let CapacityDecision::Deny(reason) = guard.check(&assignment)? {
                tracing::warn!(snapshot = snapshot.id(), %reason, "capacity denied booking");
                return Err(WorkflowError::CapacityDenied(reason).into());
            }
        }

        let now = self.now();
        let booking = BookingRecord {
            id: utils::new_uuid_to_bech32("bk_")?,
            snapshot_id: snapshot.id().into(),
            mode: snapshot.direction().into(),
            window,
            resources,
            status: BookingStatus::Planned,
            confirmation: None,
            notes,
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        self.repo.save(&booking)?;
        tracing::info!(booking = %booking.id, snapshot = %booking.snapshot_id, mode = ?booking.mode, "booking created");

        self.bus.emit(&Event::Created {
            kind: EntityKind::Booking,
            entity_id: booking.id.clone(),
            at: now,
        })?;
        Ok(booking)
    }

    pub fn confirm_booking(&self, id: &str) -> anyhow::Result<BookingRecord> {
        let mut booking = self.get(id)?;
        let status = booking.status.transition_to(BookingStatus::Confirmed)?;

        let now = self.now();
        let seq = self.sequence.next()?;
        booking.confirmation = Some(Confirmation {
            reference: format!(
                "{}-{}-{:04}",
                self.ref_prefix,
                now.calendar_date().compact(),
                seq
            ),
            issued_at: now,
        });
        self.commit_status(booking, status)
    }

    pub fn reschedule(&self, id: &str, window: TimeWindow) -> anyhow::Result<BookingRecord> {
        window.validate().map_err(WorkflowError::from)?;
        let mut booking = self.open_booking(id)?;
        booking.window = window;
        booking.updated_at = self.now();
        self.repo.update(&booking)?;
        tracing::debug!(booking = %booking.id, "booking rescheduled");
        Ok(booking)
    }

    pub fn reassign_resources(
        &self,
        id: &str,
        resources: Vec<ResourceRef>,
    ) -> anyhow::Result<BookingRecord> {
        if resources.is_empty() {
            return Err(WorkflowError::from(ValidationError::NoResources).into());
        }
        let mut booking = self.open_booking(id)?;
        booking.resources = resources;
        booking.updated_at = self.now();
        self.repo.update(&booking)?;
        tracing::debug!(booking = %booking.id, count = booking.resources.len(), "resources reassigned");
        Ok(booking)
    }

    pub fn dispatch(&self, id: &str) -> anyhow::Result<BookingRecord> {
        let booking = self.get(id)?;
        let status = booking.status.transition_to(BookingStatus::EnRoute)?;
        self.commit_status(booking, status)
    }

    pub fn complete(&self, id: &str) -> anyhow::Result<BookingRecord> {
        let booking = self.get(id)?;
        let status = booking.status.transition_to(BookingStatus::Complete)?;
        self.commit_status(booking, status)
    }

    /// Cancels and appends `reason` to the notes. Only a completed booking refuses.
    /// Cancelling twice records the extra reason without emitting another transition.
    pub fn cancel(&self, id: &str, reason: &str) -> anyhow::Result<BookingRecord> {
        let mut booking = self.get(id)?;
        booking.notes = Some(match booking.notes.take() {
            Some(notes) => format!("{notes}\ncancelled: {reason}"),
            None => format!("cancelled: {reason}"),
        });

        if booking.status == BookingStatus::Cancelled {
            booking.updated_at = self.now();
            self.repo.update(&booking)?;
            return Ok(booking);
        }
        let status = booking.status.transition_to(BookingStatus::Cancelled)?;
        self.commit_status(booking, status)
    }

    fn open_booking(&self, id: &str) -> anyhow::Result<BookingRecord> {
        let booking = self.get(id)?;
        if booking.status.is_terminal() {
            return Err(WorkflowError::from(ValidationError::BookingClosed {
                id: booking.id,
                status: booking.status.as_str().into(),
            })
            .into());
        }
        Ok(booking)
    }

    // persist first, then emit; a failing subscriber surfaces to the caller
    fn commit_status(
        &self,
        mut booking: BookingRecord,
        to: BookingStatus,
    ) -> anyhow::Result<BookingRecord> {
        let from = booking.status;
        let now = self.now();
        booking.status = to;
        booking.updated_at = now.clone();
        self.repo.update(&booking)?;
        tracing::info!(booking = %booking.id, from = from.as_str(), to = to.as_str(), "booking status changed");

        self.bus.emit(&Event::StatusChanged(StatusTransition {
            kind: EntityKind::Booking,
            entity_id: booking.id.clone(),
            from: from.into(),
            to: to.into(),
            at: now,
        }))?;
        Ok(booking)
    }
}
