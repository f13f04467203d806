// castellum-core/src/state_machine.rs
//
// The pending-operation transition table (spec §4.4). This module is the
// pure decision half of the asset scraper: given the asset's current
// pending operation (if any) and the decision engine's eligibility map, it
// decides what should happen next. The asset scraper loop in
// `castellum-workers` is responsible for actually writing the result.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::Eligibility;
use crate::model::{FinishedOperation, Outcome, PendingOperation, Reason, ResourceLogic};

/// What the asset scraper should do with the asset's pending-operation row.
#[derive(Debug, Clone, PartialEq)]
pub enum StateAction {
    /// Eligibility is empty and there is no pending operation. Nothing to
    /// do (spec §4.4 table row "none / empty").
    NoOp,
    /// No pending operation existed; create one for the given reason (table
    /// row "none / contains r").
    Insert(PendingOperation),
    /// The pending operation's confirmation delay has elapsed; persist the
    /// now-confirmed row (table row "created(r0) / same r0").
    Confirm(PendingOperation),
    /// The pending operation is confirmed, ungated, and still eligible;
    /// greenlight it automatically (table row "confirmed(r0) / same r0").
    Greenlight(PendingOperation),
    /// Usage returned to normal (or the asset stopped being eligible)
    /// before confirmation/greenlight; delete the pending row and append a
    /// `cancelled` finished row (table rows "created|confirmed(r0) / empty").
    Cancel(FinishedOperation),
    /// Eligibility crossed over to a different reason before the pending
    /// operation left `created`/`confirmed`; cancel the old one and open a
    /// new one (table rows "created|confirmed(r0) / contains r1 ≠ r0"). Per
    /// spec §9's open question, this transition is intentionally only ever
    /// reached from `created`/`confirmed` — a `greenlit` operation is never
    /// preempted, even by a newly-eligible `critical`.
    Replace {
        cancelled: FinishedOperation,
        replacement: PendingOperation,
    },
    /// The pending operation is already greenlit; leave it untouched for
    /// the resize executor regardless of what eligibility now says (table
    /// row "greenlit(r0) / any").
    LeaveForExecutor,
    /// Nothing changed and there is nothing actionable (e.g. pending exists,
    /// same reason, delay not yet elapsed).
    Unchanged,
}

/// Severity order used only to pick a single reason when an asset with no
/// existing pending operation becomes eligible for more than one reason at
/// once (distinct metrics crossing distinct bands). `critical` wins over
/// `high` wins over `low`.
fn pick_priority(eligible: &Eligibility) -> Option<(Reason, u64)> {
    for reason in [Reason::Critical, Reason::High, Reason::Low] {
        if let Some(&target) = eligible.get(&reason) {
            return Some((reason, target));
        }
    }
    None
}

/// Run the transition table for one asset's tick of the asset scraper.
#[allow(clippy::too_many_arguments)]
pub fn transition(
    pending: Option<&PendingOperation>,
    eligible: &Eligibility,
    logic: &ResourceLogic,
    asset_id: Uuid,
    current_size: u64,
    current_usage: &crate::model::Usage,
    now: DateTime<Utc>,
) -> StateAction {
    match pending {
        None => match pick_priority(eligible) {
            None => StateAction::NoOp,
            Some((reason, target)) => StateAction::Insert(PendingOperation::new_created(
                asset_id,
                reason,
                current_size,
                target,
                current_usage.clone(),
                now,
            )),
        },
        Some(op) => {
            if op.state.is_greenlit() {
                return StateAction::LeaveForExecutor;
            }

            match eligible.get(&op.reason) {
                Some(_) => same_reason_transition(op, logic, now),
                None => match pick_priority(eligible) {
                    None => {
                        let cancelled = FinishedOperation::from_pending(
                            op.clone(),
                            Outcome::Cancelled,
                            now,
                            None,
                        );
                        StateAction::Cancel(cancelled)
                    }
                    Some((reason, target)) => {
                        let cancelled = FinishedOperation::from_pending(
                            op.clone(),
                            Outcome::Cancelled,
                            now,
                            None,
                        );
                        let replacement = PendingOperation::new_created(
                            asset_id,
                            reason,
                            current_size,
                            target,
                            current_usage.clone(),
                            now,
                        );
                        StateAction::Replace {
                            cancelled,
                            replacement,
                        }
                    }
                },
            }
        }
    }
}

fn same_reason_transition(
    op: &PendingOperation,
    logic: &ResourceLogic,
    now: DateTime<Utc>,
) -> StateAction {
    use crate::model::PendingState;

    match &op.state {
        PendingState::Created => {
            if op.delay_elapsed(logic, now) {
                let mut confirmed = op.clone();
                confirmed.state = PendingState::Confirmed { confirmed_at: now };
                StateAction::Confirm(confirmed)
            } else {
                StateAction::Unchanged
            }
        }
        PendingState::Confirmed { confirmed_at } => {
            if logic.requires_greenlight(op.reason) {
                StateAction::Unchanged
            } else {
                let mut greenlit = op.clone();
                greenlit.state = PendingState::Greenlit {
                    confirmed_at: *confirmed_at,
                    greenlit_at: now,
                    greenlit_by_user: None,
                };
                StateAction::Greenlight(greenlit)
            }
        }
        PendingState::Greenlit { .. } => StateAction::LeaveForExecutor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PendingState, StepRule, ThresholdSet};
    use std::collections::BTreeMap;

    fn logic() -> ResourceLogic {
        ResourceLogic {
            low_thresholds: ThresholdSet::new(),
            high_thresholds: ThresholdSet::new(),
            critical_thresholds: ThresholdSet::new(),
            low_delay_secs: 3600,
            high_delay_secs: 1800,
            step: StepRule::Percentage(20.0),
            min_size: None,
            max_size: None,
            min_free_size: None,
            min_free_size_is_critical: false,
            low_requires_greenlight: false,
            high_requires_greenlight: false,
        }
    }

    #[test]
    fn none_to_insert() {
        let now = Utc::now();
        let mut eligible = Eligibility::new();
        eligible.insert(Reason::High, 1229);
        let usage: crate::model::Usage = BTreeMap::new();
        let action = transition(None, &eligible, &logic(), Uuid::nil(), 1024, &usage, now);
        match action {
            StateAction::Insert(op) => {
                assert_eq!(op.reason, Reason::High);
                assert_eq!(op.new_size, 1229);
                assert_eq!(op.state, PendingState::Created);
            }
            other => panic!("expected Insert, got {other:?}"),
        }
    }

    #[test]
    fn created_confirms_after_delay() {
        let created_at = Utc::now() - chrono::Duration::seconds(2000);
        let op = PendingOperation {
            asset_id: Uuid::nil(),
            reason: Reason::High,
            old_size: 1024,
            new_size: 1229,
            usage: BTreeMap::new(),
            created_at,
            state: PendingState::Created,
            errored_attempts: 0,
            retry_at: None,
        };
        let mut eligible = Eligibility::new();
        eligible.insert(Reason::High, 1229);
        let usage: crate::model::Usage = BTreeMap::new();
        let action = transition(
            Some(&op),
            &eligible,
            &logic(),
            Uuid::nil(),
            1024,
            &usage,
            Utc::now(),
        );
        assert!(matches!(action, StateAction::Confirm(_)));
    }

    #[test]
    fn created_not_yet_confirmed_is_unchanged() {
        let op = PendingOperation {
            asset_id: Uuid::nil(),
            reason: Reason::High,
            old_size: 1024,
            new_size: 1229,
            usage: BTreeMap::new(),
            created_at: Utc::now(),
            state: PendingState::Created,
            errored_attempts: 0,
            retry_at: None,
        };
        let mut eligible = Eligibility::new();
        eligible.insert(Reason::High, 1229);
        let usage: crate::model::Usage = BTreeMap::new();
        let action = transition(
            Some(&op),
            &eligible,
            &logic(),
            Uuid::nil(),
            1024,
            &usage,
            Utc::now(),
        );
        assert_eq!(action, StateAction::Unchanged);
    }

    #[test]
    fn confirmed_greenlights_when_ungated() {
        let op = PendingOperation {
            asset_id: Uuid::nil(),
            reason: Reason::High,
            old_size: 1024,
            new_size: 1229,
            usage: BTreeMap::new(),
            created_at: Utc::now() - chrono::Duration::seconds(2000),
            state: PendingState::Confirmed {
                confirmed_at: Utc::now(),
            },
            errored_attempts: 0,
            retry_at: None,
        };
        let mut eligible = Eligibility::new();
        eligible.insert(Reason::High, 1229);
        let usage: crate::model::Usage = BTreeMap::new();
        let action = transition(
            Some(&op),
            &eligible,
            &logic(),
            Uuid::nil(),
            1024,
            &usage,
            Utc::now(),
        );
        assert!(matches!(action, StateAction::Greenlight(_)));
    }

    #[test]
    fn confirmed_stays_pending_when_gated() {
        let mut gated = logic();
        gated.high_requires_greenlight = true;
        let op = PendingOperation {
            asset_id: Uuid::nil(),
            reason: Reason::High,
            old_size: 1024,
            new_size: 1229,
            usage: BTreeMap::new(),
            created_at: Utc::now() - chrono::Duration::seconds(2000),
            state: PendingState::Confirmed {
                confirmed_at: Utc::now(),
            },
            errored_attempts: 0,
            retry_at: None,
        };
        let mut eligible = Eligibility::new();
        eligible.insert(Reason::High, 1229);
        let usage: crate::model::Usage = BTreeMap::new();
        let action = transition(
            Some(&op),
            &eligible,
            &gated,
            Uuid::nil(),
            1024,
            &usage,
            Utc::now(),
        );
        assert_eq!(action, StateAction::Unchanged);
    }

    #[test]
    fn empty_eligibility_cancels() {
        let op = PendingOperation {
            asset_id: Uuid::nil(),
            reason: Reason::High,
            old_size: 1024,
            new_size: 1229,
            usage: BTreeMap::new(),
            created_at: Utc::now(),
            state: PendingState::Created,
            errored_attempts: 0,
            retry_at: None,
        };
        let eligible = Eligibility::new();
        let usage: crate::model::Usage = BTreeMap::new();
        let action = transition(
            Some(&op),
            &eligible,
            &logic(),
            Uuid::nil(),
            1024,
            &usage,
            Utc::now(),
        );
        match action {
            StateAction::Cancel(finished) => assert_eq!(finished.outcome, Outcome::Cancelled),
            other => panic!("expected Cancel, got {other:?}"),
        }
    }

    #[test]
    fn greenlit_is_never_preempted() {
        // Open question from spec §9: a critical op never preempts an
        // already-greenlit high op — confirmed here by construction, since
        // `transition` checks `is_greenlit()` before consulting eligibility.
        let op = PendingOperation {
            asset_id: Uuid::nil(),
            reason: Reason::High,
            old_size: 1024,
            new_size: 1229,
            usage: BTreeMap::new(),
            created_at: Utc::now(),
            state: PendingState::Greenlit {
                confirmed_at: Utc::now(),
                greenlit_at: Utc::now(),
                greenlit_by_user: None,
            },
            errored_attempts: 0,
            retry_at: None,
        };
        let mut eligible = Eligibility::new();
        eligible.insert(Reason::Critical, 2000);
        let usage: crate::model::Usage = BTreeMap::new();
        let action = transition(
            Some(&op),
            &eligible,
            &logic(),
            Uuid::nil(),
            1024,
            &usage,
            Utc::now(),
        );
        assert_eq!(action, StateAction::LeaveForExecutor);
    }

    #[test]
    fn different_reason_replaces() {
        let op = PendingOperation {
            asset_id: Uuid::nil(),
            reason: Reason::High,
            old_size: 1024,
            new_size: 1229,
            usage: BTreeMap::new(),
            created_at: Utc::now(),
            state: PendingState::Created,
            errored_attempts: 0,
            retry_at: None,
        };
        let mut eligible = Eligibility::new();
        eligible.insert(Reason::Critical, 2000);
        let usage: crate::model::Usage = BTreeMap::new();
        let action = transition(
            Some(&op),
            &eligible,
            &logic(),
            Uuid::nil(),
            1024,
            &usage,
            Utc::now(),
        );
        match action {
            StateAction::Replace {
                cancelled,
                replacement,
            } => {
                assert_eq!(cancelled.outcome, Outcome::Cancelled);
                assert_eq!(replacement.reason, Reason::Critical);
                assert_eq!(replacement.new_size, 2000);
            }
            other => panic!("expected Replace, got {other:?}"),
        }
    }
}
