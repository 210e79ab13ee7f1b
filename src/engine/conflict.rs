use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::model::*;

/// Salon-local wall clock. Dates and times carry no zone.
pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// A client's scheduled appointments, optionally only those dated `since` or later.
///
/// This is the primitive every write path uses to decide whether a client
/// still has something on the books.
pub fn active_appointments<'a>(
    appointments: impl IntoIterator<Item = &'a Appointment>,
    client_id: Ulid,
    since: Option<NaiveDate>,
) -> Vec<&'a Appointment> {
    appointments
        .into_iter()
        .filter(|a| a.client_id == Some(client_id) && a.is_scheduled())
        .filter(|a| since.is_none_or(|d| a.date >= d))
        .collect()
}

/// Status a client should hold after their appointment set changed.
///
/// No scheduled appointment from `today` on means the client walked away.
/// Otherwise the current status stands.
pub fn recompute_client_status<'a>(
    current: JourneyState,
    client_id: Ulid,
    appointments: impl IntoIterator<Item = &'a Appointment>,
    today: NaiveDate,
) -> JourneyState {
    if active_appointments(appointments, client_id, Some(today)).is_empty() {
        JourneyState::Churned
    } else {
        current
    }
}

/// Scheduled appointments on `date` whose time is not in `allowed`.
pub fn orphaned_by<'a>(
    appointments: impl IntoIterator<Item = &'a Appointment>,
    date: NaiveDate,
    allowed: &[Slot],
) -> Vec<Appointment> {
    let mut orphaned: Vec<Appointment> = appointments
        .into_iter()
        .filter(|a| a.date == date && a.is_scheduled() && !allowed.contains(&a.time))
        .cloned()
        .collect();
    orphaned.sort_by(|a, b| a.time.cmp(&b.time));
    orphaned
}

/// True if the client holds a scheduled appointment that has not started yet.
pub fn has_future_appointment<'a>(
    appointments: impl IntoIterator<Item = &'a Appointment>,
    client_id: Ulid,
    now: NaiveDateTime,
) -> bool {
    active_appointments(appointments, client_id, None)
        .iter()
        .any(|a| a.starts_at() > now)
}
