use chrono::{NaiveDate, NaiveDateTime};
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::BookingNotice;

use super::availability::{resolve, taken_slots};
use super::conflict::recompute_client_status;
use super::{Engine, EngineError};

/// Who a booking is for.
#[derive(Debug, Clone)]
pub enum ClientRef {
    Existing(Ulid),
    /// Registered as part of the booking.
    New {
        id: Ulid,
        name: String,
        email: Option<String>,
        phone: Option<String>,
    },
}

impl ClientRef {
    pub fn id(&self) -> Ulid {
        match self {
            ClientRef::Existing(id) | ClientRef::New { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub id: Ulid,
    pub client: ClientRef,
    pub service_id: Ulid,
    pub date: NaiveDate,
    pub time: Slot,
    /// Set when an admin books on a client's behalf.
    pub admin_id: Option<Ulid>,
}

#[derive(Debug, Clone)]
pub struct BookingReceipt {
    pub appointment: Appointment,
    /// Notification delivery failed. The booking stands.
    pub warning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CancelReceipt {
    pub appointment: Appointment,
    /// Client status after the follow-up recompute, when there is a client.
    pub client_status: Option<JourneyState>,
}

pub(super) fn validate_name(name: &str) -> Result<String, EngineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(EngineError::Validation("name is required"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(name.to_string())
}

fn validate_contact(value: Option<String>) -> Result<Option<String>, EngineError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v.len() > MAX_CONTACT_LEN => {
            Err(EngineError::LimitExceeded("contact field too long"))
        }
        other => Ok(other),
    }
}

fn registered(client: &Client) -> Event {
    Event::ClientRegistered {
        id: client.id,
        name: client.name.clone(),
        email: client.email.clone(),
        phone: client.phone.clone(),
        role: client.role,
        created_at: client.created_at,
    }
}

impl Engine {
    // ── Service catalog ──────────────────────────────────────

    pub async fn create_service(&self, id: Ulid, name: &str, price: &str) -> Result<(), EngineError> {
        if self.store.service(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.store.service_count() >= MAX_SERVICES {
            return Err(EngineError::LimitExceeded("too many services"));
        }
        self.save_service(id, name, price).await
    }

    pub async fn update_service(&self, id: Ulid, name: &str, price: &str) -> Result<(), EngineError> {
        if self.store.service(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        self.save_service(id, name, price).await
    }

    async fn save_service(&self, id: Ulid, name: &str, price: &str) -> Result<(), EngineError> {
        let name = validate_name(name)?;
        let price = Price::parse(price)?;
        self.persist_and_apply(Event::ServiceSaved { id, name, price })
            .await?;
        info!(service_id = %id, %price, "service saved");
        Ok(())
    }

    /// Existing appointments keep their name/price snapshot.
    pub async fn delete_service(&self, id: Ulid) -> Result<(), EngineError> {
        if self.store.service(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        self.persist_and_apply(Event::ServiceDeleted { id }).await?;
        info!(service_id = %id, "service deleted");
        Ok(())
    }

    // ── Clients ──────────────────────────────────────────────

    fn new_client(
        &self,
        id: Ulid,
        name: &str,
        email: Option<String>,
        phone: Option<String>,
        role: Role,
        now: NaiveDateTime,
    ) -> Result<Client, EngineError> {
        if self.store.contains_client(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.store.client_count() >= MAX_CLIENTS {
            return Err(EngineError::LimitExceeded("too many clients"));
        }
        Ok(Client {
            id,
            name: validate_name(name)?,
            email: validate_contact(email)?,
            phone: validate_contact(phone)?,
            role,
            status: JourneyState::Registered,
            notes: None,
            created_at: now,
        })
    }

    pub async fn register_client(
        &self,
        id: Ulid,
        name: &str,
        email: Option<String>,
        phone: Option<String>,
        role: Role,
        now: NaiveDateTime,
    ) -> Result<(), EngineError> {
        let client = self.new_client(id, name, email, phone, role, now)?;
        self.persist_and_apply(registered(&client)).await?;
        info!(client_id = %id, role = role.as_str(), "client registered");
        Ok(())
    }

    pub async fn update_client_notes(
        &self,
        id: Ulid,
        notes: Option<String>,
    ) -> Result<(), EngineError> {
        if !self.store.contains_client(&id) {
            return Err(EngineError::NotFound(id));
        }
        let notes = notes.filter(|n| !n.trim().is_empty());
        if notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(EngineError::LimitExceeded("notes too long"));
        }
        self.persist_and_apply(Event::ClientNotesUpdated { id, notes })
            .await
    }

    // ── Bookings ─────────────────────────────────────────────

    /// Book a slot. The slot is re-resolved under the date lock, so a slot
    /// picked earlier and taken since is rejected rather than double-booked.
    ///
    /// Registration (for a new client), the appointment and the promotion to
    /// `Scheduled` commit before the notifier runs. A notifier failure comes
    /// back as [`BookingReceipt::warning`].
    pub async fn create_booking(
        &self,
        req: BookingRequest,
        now: NaiveDateTime,
    ) -> Result<BookingReceipt, EngineError> {
        if req.date < now.date() {
            return Err(EngineError::DateInPast(req.date));
        }
        if self.store.contains_appointment(&req.id) {
            return Err(EngineError::AlreadyExists(req.id));
        }
        if self.store.appointment_count() >= MAX_APPOINTMENTS {
            return Err(EngineError::LimitExceeded("too many appointments"));
        }
        let service = self
            .store
            .service(&req.service_id)
            .ok_or(EngineError::NotFound(req.service_id))?;

        let mut events = Vec::with_capacity(2);
        let (client_id, client_name, client_phone) = match req.client {
            ClientRef::Existing(id) => {
                let client = self.store.client(&id).ok_or(EngineError::NotFound(id))?;
                (id, client.name, client.phone)
            }
            ClientRef::New {
                id,
                name,
                email,
                phone,
            } => {
                let client = self.new_client(id, &name, email, phone, Role::Customer, now)?;
                events.push(registered(&client));
                (client.id, client.name, client.phone)
            }
        };

        let appointment = Appointment {
            id: req.id,
            client_id: Some(client_id),
            client_name,
            service_id: service.id,
            service_name: service.name,
            service_price: service.price,
            date: req.date,
            time: req.time,
            status: AppointmentStatus::Scheduled,
            admin_id: req.admin_id,
        };

        {
            let _day = self.lock_date(appointment.date).await;
            let _client = self.lock_client(client_id).await;
            let booked = self.store.appointments_on(&appointment.date);
            let free = resolve(
                self.store.weekly().as_ref(),
                self.store.override_for(&appointment.date).as_ref(),
                appointment.date,
                now,
                &taken_slots(&booked, appointment.date),
            );
            if !free.contains(&appointment.time) {
                metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => "slot_unavailable")
                    .increment(1);
                return Err(EngineError::SlotUnavailable {
                    date: appointment.date,
                    time: appointment.time,
                });
            }

            events.push(Event::AppointmentBooked {
                appointment: appointment.clone(),
            });
            self.persist_all_and_apply(events).await?;
        }

        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => "created").increment(1);
        info!(
            appointment_id = %appointment.id,
            client_id = %client_id,
            date = %appointment.date,
            time = %appointment.time,
            "booking created"
        );

        let notice = BookingNotice::for_booking(&appointment, client_phone.as_deref());
        let warning = match self.notifier.notify(&notice).await {
            Ok(()) => None,
            Err(e) => {
                metrics::counter!(crate::observability::NOTIFY_FAILURES_TOTAL).increment(1);
                warn!(appointment_id = %appointment.id, "booking notification failed: {e}");
                Some(e.to_string())
            }
        };

        Ok(BookingReceipt {
            appointment,
            warning,
        })
    }

    /// Mark an appointment `Cancelled`, then re-derive the client's status.
    ///
    /// The appointment write is the operation. The status follow-up is a
    /// separate write; if it fails the cancel still stands and the periodic
    /// sweep settles the client later. The client lock is held across both,
    /// so a board move sees the appointment either scheduled or settled.
    pub async fn cancel_booking(
        &self,
        id: Ulid,
        now: NaiveDateTime,
    ) -> Result<CancelReceipt, EngineError> {
        let (date, owner) = self
            .store
            .appointment(&id)
            .map(|a| (a.date, a.client_id))
            .ok_or(EngineError::NotFound(id))?;
        let _day = self.lock_date(date).await;
        let _client = match owner {
            Some(client_id) => Some(self.lock_client(client_id).await),
            None => None,
        };
        let mut appointment = self.store.appointment(&id).ok_or(EngineError::NotFound(id))?;
        if !appointment.is_scheduled() {
            return Err(EngineError::NotScheduled(id));
        }

        self.persist_and_apply(Event::AppointmentsResolved {
            outcomes: vec![(id, AppointmentStatus::Cancelled)],
        })
        .await?;
        appointment.status = AppointmentStatus::Cancelled;
        metrics::counter!(crate::observability::CANCELLATIONS_TOTAL).increment(1);
        info!(appointment_id = %id, "booking cancelled");

        let client_status = match appointment.client_id {
            Some(client_id) => self.settle_client_status(client_id, now.date()).await,
            None => None,
        };

        Ok(CancelReceipt {
            appointment,
            client_status,
        })
    }

    /// Follow-up after appointments were cancelled: churn the client if
    /// nothing scheduled remains from `today` on. Failures are logged, not
    /// returned. The caller holds the client lock.
    pub(super) async fn settle_client_status(
        &self,
        client_id: Ulid,
        today: NaiveDate,
    ) -> Option<JourneyState> {
        let client = self.store.client(&client_id)?;
        let appointments = self.store.appointments_of(&client_id);
        let next = recompute_client_status(client.status, client_id, &appointments, today);
        if next == client.status {
            return Some(next);
        }
        let event = Event::ClientStatusChanged {
            id: client_id,
            status: next,
            settled: Vec::new(),
        };
        match self.persist_and_apply(event).await {
            Ok(()) => {
                info!(client_id = %client_id, from = %client.status, to = %next, "client status recomputed");
                Some(next)
            }
            Err(e) => {
                warn!(client_id = %client_id, "client status follow-up failed: {e}");
                Some(client.status)
            }
        }
    }
}
