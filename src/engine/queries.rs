use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::model::*;

use super::availability::{resolve, taken_slots};
use super::{Engine, EngineError};

impl Engine {
    /// Bookable slots for `date` as of `now`, in configured order.
    pub fn available_slots(&self, date: NaiveDate, now: NaiveDateTime) -> Vec<Slot> {
        let booked = self.store.appointments_on(&date);
        resolve(
            self.store.weekly().as_ref(),
            self.store.override_for(&date).as_ref(),
            date,
            now,
            &taken_slots(&booked, date),
        )
    }

    /// Admin day view: every appointment on `date`, any status, by time.
    pub fn appointments_on(&self, date: NaiveDate) -> Vec<Appointment> {
        let mut day = self.store.appointments_on(&date);
        day.sort_by(|a, b| a.time.cmp(&b.time));
        day
    }

    /// Admin list view: scheduled from `today` on, by date then time.
    pub fn upcoming_appointments(&self, today: NaiveDate) -> Vec<Appointment> {
        let mut upcoming = self.store.scheduled_since(today);
        upcoming.sort_by_key(Appointment::starts_at);
        upcoming
    }

    /// Every appointment of a client, newest first.
    pub fn client_history(&self, client_id: &Ulid) -> Vec<Appointment> {
        let mut history = self.store.appointments_of(client_id);
        history.sort_by_key(|a| std::cmp::Reverse(a.starts_at()));
        history
    }

    /// The client's own upcoming bookings, soonest first.
    pub fn client_bookings(&self, client_id: &Ulid, now: NaiveDateTime) -> Vec<Appointment> {
        let mut bookings: Vec<Appointment> = self
            .store
            .appointments_of(client_id)
            .into_iter()
            .filter(|a| a.is_scheduled() && a.date >= now.date())
            .collect();
        bookings.sort_by_key(Appointment::starts_at);
        bookings
    }

    pub fn client_stats(&self, client_id: &Ulid) -> Result<ClientStats, EngineError> {
        if !self.store.contains_client(client_id) {
            return Err(EngineError::NotFound(*client_id));
        }
        let history = self.store.appointments_of(client_id);

        let mut visits_by_service: HashMap<&str, usize> = HashMap::new();
        let mut total_visits = 0;
        let mut cancellations = 0;
        let mut last_visit: Option<NaiveDate> = None;
        for appt in &history {
            match appt.status {
                AppointmentStatus::Completed => {
                    total_visits += 1;
                    *visits_by_service.entry(appt.service_name.as_str()).or_default() += 1;
                    last_visit = last_visit.max(Some(appt.date));
                }
                AppointmentStatus::Cancelled => cancellations += 1,
                AppointmentStatus::Scheduled => {}
            }
        }

        // Ties go to the alphabetically first service.
        let most_frequent_service = visits_by_service
            .into_iter()
            .max_by(|(a_name, a_n), (b_name, b_n)| a_n.cmp(b_n).then_with(|| b_name.cmp(a_name)))
            .map(|(name, _)| name.to_string());

        Ok(ClientStats {
            client_id: *client_id,
            total_visits,
            cancellations,
            most_frequent_service,
            last_visit,
        })
    }

    /// Run the no-show sweep, then lay the customers out in journey order.
    pub async fn load_board(&self, now: NaiveDateTime) -> Board {
        let reconciled = self.reconcile_no_shows(now).await;
        let columns = JourneyState::ALL
            .iter()
            .map(|state| {
                let mut clients = self.store.clients_in(*state);
                clients.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
                BoardColumn {
                    state: *state,
                    clients,
                }
            })
            .collect();
        Board {
            columns,
            reconciled,
        }
    }

    pub fn list_services(&self) -> Vec<Service> {
        self.store.services()
    }

    pub fn list_clients(&self) -> Vec<Client> {
        self.store.clients()
    }

    pub fn get_client(&self, id: &Ulid) -> Option<Client> {
        self.store.client(id)
    }

    pub fn get_appointment(&self, id: &Ulid) -> Option<Appointment> {
        self.store.appointment(id)
    }

    pub fn weekly_availability(&self) -> Option<WeeklyAvailability> {
        self.store.weekly()
    }

    /// Dates with an override, for calendar highlighting.
    pub fn list_overrides(&self) -> Vec<AvailabilityOverride> {
        self.store.overrides()
    }
}
