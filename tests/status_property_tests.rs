//! Property-based tests for the status transition tables
//!
//! Every entity kind shares the same guard, so these run across all five
//! kinds at once: any (from, to) pair is drawn and the guard, the legal-next
//! listing and the typed `transition_to` must agree with each other.

use proptest::prelude::*;
use obari_workflow::{
    error::WorkflowError,
    events::{self, Event, EventBus, StatusTransition},
    status::{
        self, BookingStatus, EntityKind, InvoiceStatus, Lifecycle, OrderStatus, Stage, Status,
    },
    types::TimeStamp,
};
use std::sync::{Arc, Mutex};

fn kind_strategy() -> impl Strategy<Value = EntityKind> {
    prop::sample::select(EntityKind::ALL.to_vec())
}

/// A kind plus two of its statuses, possibly equal.
fn pair_strategy() -> impl Strategy<Value = (EntityKind, Status, Status)> {
    kind_strategy().prop_flat_map(|kind| {
        let all = Status::all(kind);
        (
            Just(kind),
            prop::sample::select(all.clone()),
            prop::sample::select(all),
        )
    })
}

proptest! {
    #[test]
    fn self_transition_is_never_legal((kind, from, _) in pair_strategy()) {
        prop_assert!(!status::can_transition(kind, from, from));
        prop_assert!(status::assert_transition(kind, from, from).is_err());
    }

    #[test]
    fn guard_agrees_with_listing((kind, from, to) in pair_strategy()) {
        let listed = status::next_statuses(kind, from).contains(&to);
        prop_assert_eq!(status::can_transition(kind, from, to), listed);
        prop_assert_eq!(status::assert_transition(kind, from, to).is_ok(), listed);
    }

    #[test]
    fn rejection_names_both_ends((kind, from, to) in pair_strategy()) {
        if let Err(err) = status::assert_transition(kind, from, to) {
            prop_assert_eq!(
                err,
                WorkflowError::IllegalTransition {
                    kind,
                    from: from.as_str().into(),
                    to: to.as_str().into(),
                }
            );
        }
    }

    #[test]
    fn terminal_statuses_have_no_exit((kind, from, to) in pair_strategy()) {
        if from.is_terminal() {
            prop_assert!(!status::can_transition(kind, from, to));
        } else {
            prop_assert!(!status::next_statuses(kind, from).is_empty());
        }
    }

    #[test]
    fn statuses_never_cross_kinds(
        (kind, from, _) in pair_strategy(),
        other in kind_strategy(),
    ) {
        prop_assume!(kind != other);
        for to in Status::all(other) {
            prop_assert!(!status::can_transition(kind, from, to));
            prop_assert!(!status::can_transition(other, from, to));
        }
    }

    #[test]
    fn wire_names_parse_back((kind, from, _) in pair_strategy()) {
        prop_assert_eq!(Status::parse(kind, from.as_str()), Some(from));
    }

    #[test]
    fn typed_booking_transitions_match_table(
        from in prop::sample::select(BookingStatus::ALL.to_vec()),
        to in prop::sample::select(BookingStatus::ALL.to_vec()),
    ) {
        let expected = status::can_transition(EntityKind::Booking, from.into(), to.into());
        prop_assert_eq!(from.transition_to(to).is_ok(), expected);
    }
}

#[test]
fn order_happy_path() {
    let path = [
        OrderStatus::Draft,
        OrderStatus::Staging,
        OrderStatus::Confirmed,
        OrderStatus::Booked,
    ];
    let mut current = path[0];
    for next in &path[1..] {
        current = current.transition_to(*next).unwrap();
    }
    assert!(current.is_terminal());
}

#[test]
fn invoice_cannot_be_reissued_once_paid() {
    assert!(InvoiceStatus::Paid.is_terminal());
    assert!(InvoiceStatus::Paid.transition_to(InvoiceStatus::Issued).is_err());
}

#[test]
fn stages_run_in_fixed_order() {
    let mut stages = vec![Stage::Order];
    while let Some(next) = stages.last().and_then(Stage::next) {
        stages.push(next);
    }
    assert_eq!(
        stages.iter().map(Stage::kind).collect::<Vec<_>>(),
        EntityKind::ALL.to_vec()
    );
    assert!(stages.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn status_change_events_are_named_per_kind() {
    let seen = Arc::new(Mutex::new(vec![]));
    let mut bus = EventBus::new();
    {
        let seen = seen.clone();
        bus.on(events::status_changed(EntityKind::Invoice), move |event| {
            seen.lock().unwrap().push(event.name());
            Ok(())
        });
    }

    let transition = |kind, from: Status, to: Status| {
        Event::StatusChanged(StatusTransition {
            kind,
            entity_id: "inv_1".into(),
            from,
            to,
            at: TimeStamp::new(),
        })
    };
    bus.emit(&transition(
        EntityKind::Invoice,
        InvoiceStatus::Draft.into(),
        InvoiceStatus::Issued.into(),
    ))
    .unwrap();
    bus.emit(&transition(
        EntityKind::Order,
        OrderStatus::Draft.into(),
        OrderStatus::Staging.into(),
    ))
    .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["invoice.status_changed".to_string()]);
}
