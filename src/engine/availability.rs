use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};

use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// Slots the salon would offer on `date` before bookings are considered.
///
/// Override: REPLACE. An override's list wins outright, even when empty.
/// Otherwise the weekly defaults apply on working days only.
/// No weekly configuration at all means nothing is offered.
pub fn potential_slots<'a>(
    weekly: Option<&'a WeeklyAvailability>,
    override_for_date: Option<&'a AvailabilityOverride>,
    date: NaiveDate,
) -> &'a [Slot] {
    let Some(weekly) = weekly else {
        return &[];
    };
    if let Some(ov) = override_for_date {
        return &ov.time_slots;
    }
    if !weekly.is_working_day(date) {
        return &[];
    }
    &weekly.default_time_slots
}

/// Bookable slots for `date`, in configured order.
///
/// 1. Potential slots from override / weekly defaults.
/// 2. On `now`'s own date, drop every slot at or before the current minute.
/// 3. Drop slots already taken by a scheduled appointment.
pub fn resolve(
    weekly: Option<&WeeklyAvailability>,
    override_for_date: Option<&AvailabilityOverride>,
    date: NaiveDate,
    now: NaiveDateTime,
    taken: &HashSet<Slot>,
) -> Vec<Slot> {
    let potential = potential_slots(weekly, override_for_date, date);
    let cutoff = (date == now.date()).then(|| Slot::from_time(now.time()));

    potential
        .iter()
        .filter(|slot| cutoff.as_ref().is_none_or(|c| *slot > c))
        .filter(|slot| !taken.contains(*slot))
        .cloned()
        .collect()
}

/// Times held by scheduled appointments on `date`.
pub fn taken_slots<'a>(
    appointments: impl IntoIterator<Item = &'a Appointment>,
    date: NaiveDate,
) -> HashSet<Slot> {
    appointments
        .into_iter()
        .filter(|a| a.date == date && a.is_scheduled())
        .map(|a| a.time.clone())
        .collect()
}
