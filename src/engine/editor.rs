use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::potential_slots;
use super::conflict::orphaned_by;
use super::{Engine, EngineError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Committed {
        /// Appointments cancelled because their slot went away.
        cancelled: Vec<Ulid>,
        /// Clients churned because nothing scheduled remained.
        churned: Vec<Ulid>,
    },
    /// Nothing written. These bookings would lose their slot; resubmit with
    /// `confirm` to save and cancel them.
    NeedsConfirmation(Vec<Appointment>),
}

fn normalize_slots(slots: Vec<Slot>) -> Result<Vec<Slot>, EngineError> {
    if slots.len() > MAX_SLOTS_PER_DAY {
        return Err(EngineError::LimitExceeded("too many slots in one day"));
    }
    let mut seen = BTreeSet::new();
    Ok(slots.into_iter().filter(|s| seen.insert(s.clone())).collect())
}

impl Engine {
    /// Replace the slot list for one date. An empty list closes the day.
    pub async fn set_override(
        &self,
        date: NaiveDate,
        slots: Vec<Slot>,
        confirm: bool,
        now: NaiveDateTime,
    ) -> Result<EditOutcome, EngineError> {
        let slots = normalize_slots(slots)?;
        let _day = self.lock_date(date).await;
        let conflicts = orphaned_by(&self.store.appointments_on(&date), date, &slots);
        let change = Event::OverrideSet {
            date,
            time_slots: slots,
        };
        self.commit_edit(change, conflicts, confirm, now).await
    }

    /// Drop a date's override so the weekly defaults apply again.
    pub async fn delete_override(
        &self,
        date: NaiveDate,
        confirm: bool,
        now: NaiveDateTime,
    ) -> Result<EditOutcome, EngineError> {
        let _day = self.lock_date(date).await;
        if self.store.override_for(&date).is_none() {
            return Err(EngineError::OverrideNotFound(date));
        }
        let weekly = self.store.weekly();
        let restored = potential_slots(weekly.as_ref(), None, date);
        let conflicts = orphaned_by(&self.store.appointments_on(&date), date, restored);
        self.commit_edit(Event::OverrideRemoved { date }, conflicts, confirm, now)
            .await
    }

    /// Save the salon's default hours.
    ///
    /// Conflicts are bookings from today on, on dates without an override,
    /// whose time the new defaults no longer offer. A date that stops being a
    /// working day orphans all of its bookings.
    pub async fn set_weekly_availability(
        &self,
        working_days: Vec<u8>,
        slots: Vec<Slot>,
        confirm: bool,
        now: NaiveDateTime,
    ) -> Result<EditOutcome, EngineError> {
        if let Some(bad) = working_days.iter().find(|d| **d > 6) {
            return Err(ModelError::BadWeekday(bad.to_string()).into());
        }
        let mut working_days = working_days;
        working_days.sort_unstable();
        working_days.dedup();
        let weekly = WeeklyAvailability {
            working_days,
            default_time_slots: normalize_slots(slots)?,
        };

        let _calendar = self.calendar_lock.write().await;
        let mut conflicts: Vec<Appointment> = self
            .store
            .scheduled_since(now.date())
            .into_iter()
            .filter(|a| self.store.override_for(&a.date).is_none())
            .filter(|a| !potential_slots(Some(&weekly), None, a.date).contains(&a.time))
            .collect();
        conflicts.sort_by_key(Appointment::starts_at);

        let change = Event::WeeklyAvailabilitySet {
            working_days: weekly.working_days,
            default_time_slots: weekly.default_time_slots,
        };
        self.commit_edit(change, conflicts, confirm, now).await
    }

    /// The slot change and the batch cancel are one flush. The per-client
    /// status follow-up runs after, one client at a time. Client locks are
    /// held from the status check through the follow-up.
    async fn commit_edit(
        &self,
        change: Event,
        conflicts: Vec<Appointment>,
        confirm: bool,
        now: NaiveDateTime,
    ) -> Result<EditOutcome, EngineError> {
        if !conflicts.is_empty() && !confirm {
            metrics::counter!(crate::observability::AVAILABILITY_EDITS_TOTAL, "outcome" => "needs_confirmation")
                .increment(1);
            return Ok(EditOutcome::NeedsConfirmation(conflicts));
        }
        if conflicts.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("too many bookings to cancel at once"));
        }

        // A board move may have settled some of these since they were read.
        let clients: BTreeSet<Ulid> = conflicts.iter().filter_map(|a| a.client_id).collect();
        let _clients = self.lock_clients(&clients).await;
        let conflicts: Vec<Appointment> = conflicts
            .into_iter()
            .filter(|a| self.store.appointment(&a.id).is_some_and(|a| a.is_scheduled()))
            .collect();
        let cancelled: Vec<Ulid> = conflicts.iter().map(|a| a.id).collect();
        let mut events = vec![change];
        if !cancelled.is_empty() {
            events.push(Event::AppointmentsResolved {
                outcomes: cancelled
                    .iter()
                    .map(|id| (*id, AppointmentStatus::Cancelled))
                    .collect(),
            });
        }
        self.persist_all_and_apply(events).await?;
        metrics::counter!(crate::observability::AVAILABILITY_EDITS_TOTAL, "outcome" => "committed")
            .increment(1);

        let settled: BTreeSet<Ulid> = conflicts.iter().filter_map(|a| a.client_id).collect();
        let mut churned = Vec::new();
        for client_id in settled {
            let before = self.store.client(&client_id).map(|c| c.status);
            let after = self.settle_client_status(client_id, now.date()).await;
            if after == Some(JourneyState::Churned) && before != after {
                churned.push(client_id);
            }
        }

        info!(
            cancelled = cancelled.len(),
            churned = churned.len(),
            "availability saved"
        );
        Ok(EditOutcome::Committed { cancelled, churned })
    }
}
