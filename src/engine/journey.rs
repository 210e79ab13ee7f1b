use std::collections::HashSet;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::MAX_BATCH_SIZE;
use crate::model::*;

use super::conflict::has_future_appointment;
use super::{Engine, EngineError};

/// A transition that would settle more than one active appointment,
/// parked until the operator decides what happens to each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSet {
    pub client_id: Ulid,
    pub from: JourneyState,
    pub to: JourneyState,
    /// The client's scheduled appointments at proposal time, soonest first.
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// `from == to`; nothing written.
    Unchanged,
    /// Status committed together with these appointment outcomes.
    Applied {
        settled: Vec<(Ulid, AppointmentStatus)>,
    },
    PendingConfirmation(ConflictSet),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// No scheduled appointment remained; the requested status committed.
    Committed(JourneyState),
    /// The chosen outcomes were applied but bookings remain, so the client
    /// keeps its previous status.
    Vetoed { remaining: Vec<Appointment> },
}

/// Board rules for a move between two different states.
///
/// `Completed` only from `Scheduled`. Exits are reachable from anywhere, and
/// an exited client may re-enter the forward path. Along the forward path
/// moves never go back.
pub fn validate_transition(from: JourneyState, to: JourneyState) -> Result<(), EngineError> {
    if to == JourneyState::Completed && from != JourneyState::Scheduled {
        return Err(EngineError::CompletedRequiresScheduled { from });
    }
    match (from.rank(), to.rank()) {
        (Some(f), Some(t)) if t < f => Err(EngineError::BackwardMove { from, to }),
        _ => Ok(()),
    }
}

fn default_outcome(to: JourneyState) -> AppointmentStatus {
    if to == JourneyState::Completed {
        AppointmentStatus::Completed
    } else {
        AppointmentStatus::Cancelled
    }
}

impl Engine {
    fn scheduled_for(&self, client_id: Ulid) -> Vec<Appointment> {
        let mut active: Vec<Appointment> = self
            .store
            .appointments_of(&client_id)
            .into_iter()
            .filter(Appointment::is_scheduled)
            .collect();
        active.sort_by_key(Appointment::starts_at);
        active
    }

    /// Drag a client card from `from` to `to`.
    ///
    /// Entering `Completed`, `NoShow` or `Churned` settles the client's
    /// scheduled appointments. With at most one, that happens in the same
    /// record as the status change. With more, nothing is written and the
    /// set comes back for [`Engine::confirm_transition`].
    pub async fn move_client(
        &self,
        client_id: Ulid,
        from: JourneyState,
        to: JourneyState,
    ) -> Result<TransitionOutcome, EngineError> {
        let _client = self.lock_client(client_id).await;
        let client = self
            .store
            .client(&client_id)
            .ok_or(EngineError::NotFound(client_id))?;
        if client.status != from {
            return Err(EngineError::StaleState {
                client_id,
                expected: from,
                actual: client.status,
            });
        }
        if from == to {
            return Ok(TransitionOutcome::Unchanged);
        }
        validate_transition(from, to)?;

        let active = if to.settles_appointments() {
            self.scheduled_for(client_id)
        } else {
            Vec::new()
        };

        if active.len() > 1 {
            let set = ConflictSet {
                client_id,
                from,
                to,
                appointments: active,
            };
            self.pending.insert(client_id, set.clone());
            metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "outcome" => "suspended")
                .increment(1);
            info!(
                client_id = %client_id,
                %from,
                %to,
                appointments = set.appointments.len(),
                "transition suspended for confirmation"
            );
            return Ok(TransitionOutcome::PendingConfirmation(set));
        }

        let settled: Vec<(Ulid, AppointmentStatus)> =
            active.iter().map(|a| (a.id, default_outcome(to))).collect();
        self.persist_and_apply(Event::ClientStatusChanged {
            id: client_id,
            status: to,
            settled: settled.clone(),
        })
        .await?;
        // A direct move supersedes any dialog left open for this client.
        self.pending.remove(&client_id);
        metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "outcome" => "applied")
            .increment(1);
        info!(client_id = %client_id, %from, %to, settled = settled.len(), "client moved");
        Ok(TransitionOutcome::Applied { settled })
    }

    /// The suspended transition for a client, if any.
    pub fn pending_conflict(&self, client_id: &Ulid) -> Option<ConflictSet> {
        self.pending.get(client_id).map(|e| e.value().clone())
    }

    /// Operator closed the dialog. Nothing is written.
    pub fn abandon_transition(&self, client_id: Ulid) -> Result<ConflictSet, EngineError> {
        let (_, set) = self
            .pending
            .remove(&client_id)
            .ok_or(EngineError::NoPendingTransition(client_id))?;
        info!(client_id = %client_id, to = %set.to, "suspended transition abandoned");
        Ok(set)
    }

    /// Cancel the selected appointments of a suspended transition.
    pub async fn resolve_conflict(
        &self,
        client_id: Ulid,
        cancel: &[Ulid],
    ) -> Result<ConfirmOutcome, EngineError> {
        let dispositions = cancel
            .iter()
            .map(|id| (*id, AppointmentStatus::Cancelled))
            .collect();
        self.confirm_transition(client_id, dispositions).await
    }

    /// Finish a suspended transition with an outcome per chosen appointment.
    ///
    /// If no scheduled appointment is left afterwards, the status change and
    /// the outcomes commit as one record. Otherwise only the outcomes are
    /// written and the move is vetoed. Either way the suspension ends,
    /// except on validation errors, which leave it open for another try.
    pub async fn confirm_transition(
        &self,
        client_id: Ulid,
        dispositions: Vec<(Ulid, AppointmentStatus)>,
    ) -> Result<ConfirmOutcome, EngineError> {
        let _client = self.lock_client(client_id).await;
        let set = self
            .pending_conflict(&client_id)
            .ok_or(EngineError::NoPendingTransition(client_id))?;

        if dispositions.is_empty() {
            return Err(EngineError::Validation("select at least one appointment"));
        }
        if dispositions.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("too many appointments in one resolution"));
        }
        let in_set: HashSet<Ulid> = set.appointments.iter().map(|a| a.id).collect();
        let mut seen = HashSet::new();
        for (id, outcome) in &dispositions {
            if !in_set.contains(id) {
                return Err(EngineError::Validation(
                    "appointment is not part of this conflict",
                ));
            }
            if !seen.insert(*id) {
                return Err(EngineError::Validation("appointment selected twice"));
            }
            match outcome {
                AppointmentStatus::Scheduled => {
                    return Err(EngineError::Validation(
                        "an appointment must be cancelled or completed",
                    ));
                }
                AppointmentStatus::Completed if set.to != JourneyState::Completed => {
                    return Err(EngineError::Validation(
                        "appointments can only be completed when moving to completed",
                    ));
                }
                _ => {}
            }
        }

        let client = self
            .store
            .client(&client_id)
            .ok_or(EngineError::NotFound(client_id))?;
        if client.status != set.from {
            self.pending.remove(&client_id);
            return Err(EngineError::StaleState {
                client_id,
                expected: set.from,
                actual: client.status,
            });
        }
        for (id, _) in &dispositions {
            if !self.store.appointment(id).is_some_and(|a| a.is_scheduled()) {
                self.pending.remove(&client_id);
                return Err(EngineError::NotScheduled(*id));
            }
        }

        let remaining: Vec<Appointment> = self
            .scheduled_for(client_id)
            .into_iter()
            .filter(|a| !seen.contains(&a.id))
            .collect();

        if remaining.is_empty() {
            self.persist_and_apply(Event::ClientStatusChanged {
                id: client_id,
                status: set.to,
                settled: dispositions,
            })
            .await?;
            self.pending.remove(&client_id);
            metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "outcome" => "committed")
                .increment(1);
            info!(client_id = %client_id, from = %set.from, to = %set.to, "suspended transition committed");
            Ok(ConfirmOutcome::Committed(set.to))
        } else {
            self.persist_and_apply(Event::AppointmentsResolved {
                outcomes: dispositions,
            })
            .await?;
            self.pending.remove(&client_id);
            metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "outcome" => "vetoed")
                .increment(1);
            info!(
                client_id = %client_id,
                to = %set.to,
                remaining = remaining.len(),
                "transition vetoed, bookings remain"
            );
            Ok(ConfirmOutcome::Vetoed { remaining })
        }
    }

    /// Move every `Scheduled` client with nothing left in the future to
    /// `NoShow`. Past appointment rows are left as they are.
    ///
    /// Idempotent; runs on board load and from the background reconciler.
    pub async fn reconcile_no_shows(&self, now: NaiveDateTime) -> Vec<Ulid> {
        let mut moved = Vec::new();
        for candidate in self.store.clients_in(JourneyState::Scheduled) {
            let _client = self.lock_client(candidate.id).await;
            let Some(client) = self.store.client(&candidate.id) else {
                continue;
            };
            if client.status != JourneyState::Scheduled {
                continue;
            }
            let appointments = self.store.appointments_of(&client.id);
            if has_future_appointment(&appointments, client.id, now) {
                continue;
            }
            let event = Event::ClientStatusChanged {
                id: client.id,
                status: JourneyState::NoShow,
                settled: Vec::new(),
            };
            match self.persist_and_apply(event).await {
                Ok(()) => {
                    self.pending.remove(&client.id);
                    metrics::counter!(crate::observability::NO_SHOWS_TOTAL).increment(1);
                    info!(client_id = %client.id, "no future booking, marked no-show");
                    moved.push(client.id);
                }
                Err(e) => warn!(client_id = %client.id, "no-show reconciliation failed: {e}"),
            }
        }
        if moved.is_empty() {
            debug!("no-show sweep: nothing to do");
        }
        moved
    }
}
