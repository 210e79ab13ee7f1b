use std::sync::{PoisonError, RwLock};

use chrono::NaiveDate;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

/// The salon's authoritative in-memory projection of the WAL.
///
/// Three leaf stores (slots, appointments, clients) plus the service catalog.
/// Mutated only through [`InMemoryStore::apply_event`], after the event is durable.
pub struct InMemoryStore {
    services: DashMap<Ulid, Service>,
    weekly: RwLock<Option<WeeklyAvailability>>,
    overrides: DashMap<NaiveDate, AvailabilityOverride>,
    clients: DashMap<Ulid, Client>,
    appointments: DashMap<Ulid, Appointment>,
    /// Appointment ids by date.
    by_date: DashMap<NaiveDate, Vec<Ulid>>,
    /// Appointment ids by client.
    by_client: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            weekly: RwLock::new(None),
            overrides: DashMap::new(),
            clients: DashMap::new(),
            appointments: DashMap::new(),
            by_date: DashMap::new(),
            by_client: DashMap::new(),
        }
    }

    pub fn clear(&self) {
        self.services.clear();
        *self.weekly.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.overrides.clear();
        self.clients.clear();
        self.appointments.clear();
        self.by_date.clear();
        self.by_client.clear();
    }

    // ── Services ─────────────────────────────────────────────

    pub fn service(&self, id: &Ulid) -> Option<Service> {
        self.services.get(id).map(|e| e.value().clone())
    }

    pub fn services(&self) -> Vec<Service> {
        let mut all: Vec<Service> = self.services.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    // ── Slot store ───────────────────────────────────────────

    pub fn weekly(&self) -> Option<WeeklyAvailability> {
        self.weekly
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn override_for(&self, date: &NaiveDate) -> Option<AvailabilityOverride> {
        self.overrides.get(date).map(|e| e.value().clone())
    }

    pub fn overrides(&self) -> Vec<AvailabilityOverride> {
        let mut all: Vec<AvailabilityOverride> =
            self.overrides.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|o| o.date);
        all
    }

    // ── Client store ─────────────────────────────────────────

    pub fn client(&self, id: &Ulid) -> Option<Client> {
        self.clients.get(id).map(|e| e.value().clone())
    }

    pub fn contains_client(&self, id: &Ulid) -> bool {
        self.clients.contains_key(id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn clients(&self) -> Vec<Client> {
        let mut all: Vec<Client> = self.clients.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        all
    }

    pub fn clients_in(&self, status: JourneyState) -> Vec<Client> {
        self.clients
            .iter()
            .filter(|e| e.value().status == status && e.value().role == Role::Customer)
            .map(|e| e.value().clone())
            .collect()
    }

    // ── Appointment store ────────────────────────────────────

    pub fn appointment(&self, id: &Ulid) -> Option<Appointment> {
        self.appointments.get(id).map(|e| e.value().clone())
    }

    pub fn contains_appointment(&self, id: &Ulid) -> bool {
        self.appointments.contains_key(id)
    }

    pub fn appointment_count(&self) -> usize {
        self.appointments.len()
    }

    pub fn appointments_on(&self, date: &NaiveDate) -> Vec<Appointment> {
        self.collect_ids(self.by_date.get(date).map(|e| e.value().clone()))
    }

    pub fn appointments_of(&self, client_id: &Ulid) -> Vec<Appointment> {
        self.collect_ids(self.by_client.get(client_id).map(|e| e.value().clone()))
    }

    /// Scheduled appointments dated `from` or later.
    pub fn scheduled_since(&self, from: NaiveDate) -> Vec<Appointment> {
        self.appointments
            .iter()
            .filter(|e| e.value().is_scheduled() && e.value().date >= from)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn all_appointments(&self) -> Vec<Appointment> {
        self.appointments.iter().map(|e| e.value().clone()).collect()
    }

    fn collect_ids(&self, ids: Option<Vec<Ulid>>) -> Vec<Appointment> {
        ids.unwrap_or_default()
            .iter()
            .filter_map(|id| self.appointment(id))
            .collect()
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::ServiceSaved { id, name, price } => {
                self.services.insert(
                    *id,
                    Service {
                        id: *id,
                        name: name.clone(),
                        price: *price,
                    },
                );
            }
            Event::ServiceDeleted { id } => {
                self.services.remove(id);
            }
            Event::WeeklyAvailabilitySet {
                working_days,
                default_time_slots,
            } => {
                *self.weekly.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(WeeklyAvailability {
                        working_days: working_days.clone(),
                        default_time_slots: default_time_slots.clone(),
                    });
            }
            Event::OverrideSet { date, time_slots } => {
                self.overrides.insert(
                    *date,
                    AvailabilityOverride {
                        date: *date,
                        time_slots: time_slots.clone(),
                    },
                );
            }
            Event::OverrideRemoved { date } => {
                self.overrides.remove(date);
            }
            Event::ClientRegistered {
                id,
                name,
                email,
                phone,
                role,
                created_at,
            } => {
                self.clients.insert(
                    *id,
                    Client {
                        id: *id,
                        name: name.clone(),
                        email: email.clone(),
                        phone: phone.clone(),
                        role: *role,
                        status: JourneyState::Registered,
                        notes: None,
                        created_at: *created_at,
                    },
                );
            }
            Event::ClientStatusChanged {
                id,
                status,
                settled,
            } => {
                self.set_statuses(settled);
                if let Some(mut client) = self.clients.get_mut(id) {
                    client.status = *status;
                }
            }
            Event::ClientNotesUpdated { id, notes } => {
                if let Some(mut client) = self.clients.get_mut(id) {
                    client.notes = notes.clone();
                }
            }
            Event::AppointmentBooked { appointment } => {
                let id = appointment.id;
                self.by_date.entry(appointment.date).or_default().push(id);
                self.appointments.insert(id, appointment.clone());
                if let Some(client_id) = appointment.client_id {
                    self.by_client.entry(client_id).or_default().push(id);
                    if let Some(mut client) = self.clients.get_mut(&client_id) {
                        client.status = JourneyState::Scheduled;
                    }
                }
            }
            Event::AppointmentsResolved { outcomes } => {
                self.set_statuses(outcomes);
            }
        }
    }

    /// Only `Scheduled` rows move. A settled appointment keeps its outcome.
    fn set_statuses(&self, outcomes: &[(Ulid, AppointmentStatus)]) {
        for (id, status) in outcomes {
            if let Some(mut appt) = self.appointments.get_mut(id) {
                if appt.status == AppointmentStatus::Scheduled {
                    appt.status = *status;
                }
            }
        }
    }

    /// Minimal event sequence that recreates the current state.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();

        for service in self.services() {
            events.push(Event::ServiceSaved {
                id: service.id,
                name: service.name,
                price: service.price,
            });
        }
        if let Some(weekly) = self.weekly() {
            events.push(Event::WeeklyAvailabilitySet {
                working_days: weekly.working_days,
                default_time_slots: weekly.default_time_slots,
            });
        }
        for ov in self.overrides() {
            events.push(Event::OverrideSet {
                date: ov.date,
                time_slots: ov.time_slots,
            });
        }

        let mut clients: Vec<Client> = self.clients.iter().map(|e| e.value().clone()).collect();
        clients.sort_by_key(|c| c.id);
        for client in &clients {
            events.push(Event::ClientRegistered {
                id: client.id,
                name: client.name.clone(),
                email: client.email.clone(),
                phone: client.phone.clone(),
                role: client.role,
                created_at: client.created_at,
            });
        }

        // Ulids sort by creation time, which keeps per-date index order stable.
        let mut appointments = self.all_appointments();
        appointments.sort_by_key(|a| a.id);
        for appointment in appointments {
            events.push(Event::AppointmentBooked { appointment });
        }

        // Booking replays promote clients, so statuses go last.
        for client in clients {
            let booked = self.by_client.contains_key(&client.id);
            if client.status != JourneyState::Registered || booked {
                events.push(Event::ClientStatusChanged {
                    id: client.id,
                    status: client.status,
                    settled: Vec::new(),
                });
            }
            if client.notes.is_some() {
                events.push(Event::ClientNotesUpdated {
                    id: client.id,
                    notes: client.notes,
                });
            }
        }

        events
    }
}
