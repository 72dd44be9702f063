use crate::status::EntityKind;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("illegal {kind} transition: {from} -> {to}")]
    IllegalTransition {
        kind: EntityKind,
        from: String,
        to: String,
    },
    #[error("staging snapshot is locked, rejected fields: {}", fields.join(", "))]
    ImmutableSnapshotViolation { fields: Vec<String> },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("capacity denied: {0}")]
    CapacityDenied(String),
    #[error("lineage conflict on {key}: head is {expected:?}, write declared {declared:?}")]
    LineageConflict {
        key: String,
        expected: Option<String>,
        declared: Option<String>,
    },
    #[error("lineage for {key} is broken at version {seq}")]
    LineageBroken { key: String, seq: u64 },
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("deal draft has no source id")]
    MissingSourceId,
    #[error("deal draft has no line items")]
    NoLineItems,
    #[error("line item {0} has a negative or non-finite quantity or price")]
    InvalidLineItem(String),
    #[error("snapshot is {0}, bookings can only originate from a staging snapshot")]
    SnapshotNotStaging(String),
    #[error("time window must end after it starts")]
    MalformedWindow,
    #[error("at least one resource must be assigned")]
    NoResources,
    #[error("booking {id} is {status} and can no longer change")]
    BookingClosed { id: String, status: String },
    #[error("notes must be a string or null")]
    NotesType,
    #[error("lineage stage {stage} cannot follow {head}")]
    StageOrder { head: String, stage: String },
    #[error("content hash {0} is not a sha256 hex digest")]
    InvalidHash(String),
    #[error("lineage key {0:?} is empty or contains NUL")]
    InvalidLineageKey(String),
    #[error("order total overflows at line {0}")]
    TotalOverflow(String),
    #[error("config value {0} must be greater than zero")]
    ZeroConfigValue(&'static str),
}
