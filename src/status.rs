//! Status machines for every OBARI entity kind.
//!
//! Each kind owns a fixed adjacency list of legal next statuses. There are no
//! backward edges in any table: a workflow that needs to go back must model it
//! as a new, explicitly named path. Every machine has at least one terminal
//! status whose allowed set is empty.
use crate::error::WorkflowError;
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    #[n(0)]
    Order,
    #[n(1)]
    Booking,
    #[n(2)]
    Active,
    #[n(3)]
    Report,
    #[n(4)]
    Invoice,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Order,
        EntityKind::Booking,
        EntityKind::Active,
        EntityKind::Report,
        EntityKind::Invoice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Order => "order",
            EntityKind::Booking => "booking",
            EntityKind::Active => "active",
            EntityKind::Report => "report",
            EntityKind::Invoice => "invoice",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by each per-kind status enum.
pub trait Lifecycle: Copy + Eq + fmt::Debug + 'static {
    const KIND: EntityKind;
    const ALL: &'static [Self];

    fn allowed_next(&self) -> &'static [Self];
    fn as_str(&self) -> &'static str;

    fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    /// A no-op is not a transition.
    fn can_transition_to(&self, to: Self) -> bool {
        *self != to && self.allowed_next().contains(&to)
    }

    /// Guarded transition, returns the new status on success.
    fn transition_to(self, to: Self) -> Result<Self, WorkflowError> {
        if !self.can_transition_to(to) {
            return Err(WorkflowError::IllegalTransition {
                kind: Self::KIND,
                from: self.as_str().into(),
                to: to.as_str().into(),
            });
        }
        Ok(to)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Staging,
    #[n(2)]
    Confirmed,
    #[n(3)]
    Booked,
    #[n(4)]
    Cancelled,
}

impl Lifecycle for OrderStatus {
    const KIND: EntityKind = EntityKind::Order;
    const ALL: &'static [Self] = &[
        Self::Draft,
        Self::Staging,
        Self::Confirmed,
        Self::Booked,
        Self::Cancelled,
    ];

    fn allowed_next(&self) -> &'static [Self] {
        match self {
            Self::Draft => &[Self::Staging, Self::Cancelled],
            Self::Staging => &[Self::Confirmed, Self::Cancelled],
            Self::Confirmed => &[Self::Booked, Self::Cancelled],
            Self::Booked | Self::Cancelled => &[],
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Staging => "staging",
            Self::Confirmed => "confirmed",
            Self::Booked => "booked",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingStatus {
    #[n(0)]
    Planned,
    #[n(1)]
    Confirmed,
    #[n(2)]
    EnRoute,
    #[n(3)]
    Complete,
    #[n(4)]
    Cancelled,
}

impl Lifecycle for BookingStatus {
    const KIND: EntityKind = EntityKind::Booking;
    const ALL: &'static [Self] = &[
        Self::Planned,
        Self::Confirmed,
        Self::EnRoute,
        Self::Complete,
        Self::Cancelled,
    ];

    fn allowed_next(&self) -> &'static [Self] {
        match self {
            Self::Planned => &[Self::Confirmed, Self::Cancelled],
            Self::Confirmed => &[Self::EnRoute, Self::Cancelled],
            Self::EnRoute => &[Self::Complete, Self::Cancelled],
            Self::Complete | Self::Cancelled => &[],
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Confirmed => "confirmed",
            Self::EnRoute => "en_route",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActiveStatus {
    #[n(0)]
    Scheduled,
    #[n(1)]
    InProgress,
    #[n(2)]
    Completed,
    #[n(3)]
    Cancelled,
}

impl Lifecycle for ActiveStatus {
    const KIND: EntityKind = EntityKind::Active;
    const ALL: &'static [Self] = &[
        Self::Scheduled,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
    ];

    fn allowed_next(&self) -> &'static [Self] {
        match self {
            Self::Scheduled => &[Self::InProgress, Self::Cancelled],
            Self::InProgress => &[Self::Completed, Self::Cancelled],
            Self::Completed | Self::Cancelled => &[],
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Submitted,
    #[n(2)]
    Approved,
    #[n(3)]
    Rejected,
}

impl Lifecycle for ReportStatus {
    const KIND: EntityKind = EntityKind::Report;
    const ALL: &'static [Self] = &[Self::Draft, Self::Submitted, Self::Approved, Self::Rejected];

    fn allowed_next(&self) -> &'static [Self] {
        match self {
            Self::Draft => &[Self::Submitted],
            Self::Submitted => &[Self::Approved, Self::Rejected],
            Self::Approved | Self::Rejected => &[],
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvoiceStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Issued,
    #[n(2)]
    PartiallyPaid,
    #[n(3)]
    Overdue,
    #[n(4)]
    Paid,
    #[n(5)]
    Void,
    #[n(6)]
    WrittenOff,
}

impl Lifecycle for InvoiceStatus {
    const KIND: EntityKind = EntityKind::Invoice;
    const ALL: &'static [Self] = &[
        Self::Draft,
        Self::Issued,
        Self::PartiallyPaid,
        Self::Overdue,
        Self::Paid,
        Self::Void,
        Self::WrittenOff,
    ];

    fn allowed_next(&self) -> &'static [Self] {
        match self {
            Self::Draft => &[Self::Issued, Self::Void],
            Self::Issued => &[Self::PartiallyPaid, Self::Paid, Self::Overdue, Self::Void],
            Self::PartiallyPaid => &[Self::Paid, Self::Overdue],
            Self::Overdue => &[Self::Paid, Self::WrittenOff],
            Self::Paid | Self::Void | Self::WrittenOff => &[],
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Issued => "issued",
            Self::PartiallyPaid => "partially_paid",
            Self::Overdue => "overdue",
            Self::Paid => "paid",
            Self::Void => "void",
            Self::WrittenOff => "written_off",
        }
    }
}

/// A status of any kind, tagged with the kind it belongs to.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    #[n(0)]
    Order(#[n(0)] OrderStatus),
    #[n(1)]
    Booking(#[n(0)] BookingStatus),
    #[n(2)]
    Active(#[n(0)] ActiveStatus),
    #[n(3)]
    Report(#[n(0)] ReportStatus),
    #[n(4)]
    Invoice(#[n(0)] InvoiceStatus),
}

impl Status {
    pub fn kind(&self) -> EntityKind {
        match self {
            Status::Order(_) => EntityKind::Order,
            Status::Booking(_) => EntityKind::Booking,
            Status::Active(_) => EntityKind::Active,
            Status::Report(_) => EntityKind::Report,
            Status::Invoice(_) => EntityKind::Invoice,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Order(s) => s.as_str(),
            Status::Booking(s) => s.as_str(),
            Status::Active(s) => s.as_str(),
            Status::Report(s) => s.as_str(),
            Status::Invoice(s) => s.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Status::Order(s) => s.is_terminal(),
            Status::Booking(s) => s.is_terminal(),
            Status::Active(s) => s.is_terminal(),
            Status::Report(s) => s.is_terminal(),
            Status::Invoice(s) => s.is_terminal(),
        }
    }

    /// Every status of `kind`, in table order.
    pub fn all(kind: EntityKind) -> Vec<Status> {
        match kind {
            EntityKind::Order => OrderStatus::ALL.iter().map(|s| Status::Order(*s)).collect(),
            EntityKind::Booking => BookingStatus::ALL.iter().map(|s| Status::Booking(*s)).collect(),
            EntityKind::Active => ActiveStatus::ALL.iter().map(|s| Status::Active(*s)).collect(),
            EntityKind::Report => ReportStatus::ALL.iter().map(|s| Status::Report(*s)).collect(),
            EntityKind::Invoice => InvoiceStatus::ALL.iter().map(|s| Status::Invoice(*s)).collect(),
        }
    }

    /// Parse the snake_case wire name of a status of `kind`.
    pub fn parse(kind: EntityKind, name: &str) -> Option<Status> {
        Status::all(kind).into_iter().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<OrderStatus> for Status {
    fn from(value: OrderStatus) -> Self {
        Status::Order(value)
    }
}
impl From<BookingStatus> for Status {
    fn from(value: BookingStatus) -> Self {
        Status::Booking(value)
    }
}
impl From<ActiveStatus> for Status {
    fn from(value: ActiveStatus) -> Self {
        Status::Active(value)
    }
}
impl From<ReportStatus> for Status {
    fn from(value: ReportStatus) -> Self {
        Status::Report(value)
    }
}
impl From<InvoiceStatus> for Status {
    fn from(value: InvoiceStatus) -> Self {
        Status::Invoice(value)
    }
}

pub fn can_transition(kind: EntityKind, from: Status, to: Status) -> bool {
    if from == to || from.kind() != kind || to.kind() != kind {
        return false;
    }
    match (from, to) {
        (Status::Order(a), Status::Order(b)) => a.can_transition_to(b),
        (Status::Booking(a), Status::Booking(b)) => a.can_transition_to(b),
        (Status::Active(a), Status::Active(b)) => a.can_transition_to(b),
        (Status::Report(a), Status::Report(b)) => a.can_transition_to(b),
        (Status::Invoice(a), Status::Invoice(b)) => a.can_transition_to(b),
        _ => false,
    }
}

pub fn assert_transition(kind: EntityKind, from: Status, to: Status) -> Result<(), WorkflowError> {
    if can_transition(kind, from, to) {
        return Ok(());
    }
    Err(WorkflowError::IllegalTransition {
        kind,
        from: from.as_str().into(),
        to: to.as_str().into(),
    })
}

/// Legal next statuses of `from`. Empty for terminal statuses and for a status of another kind.
pub fn next_statuses(kind: EntityKind, from: Status) -> Vec<Status> {
    Status::all(kind)
        .into_iter()
        .filter(|to| can_transition(kind, from, *to))
        .collect()
}

/// The OBARI stages in the only order a deal may move through them.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    #[n(0)]
    Order,
    #[n(1)]
    Booking,
    #[n(2)]
    Active,
    #[n(3)]
    Report,
    #[n(4)]
    Invoice,
}

impl Stage {
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Order => Some(Stage::Booking),
            Stage::Booking => Some(Stage::Active),
            Stage::Active => Some(Stage::Report),
            Stage::Report => Some(Stage::Invoice),
            Stage::Invoice => None,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Stage::Order => EntityKind::Order,
            Stage::Booking => EntityKind::Booking,
            Stage::Active => EntityKind::Active,
            Stage::Report => EntityKind::Report,
            Stage::Invoice => EntityKind::Invoice,
        }
    }
}
