use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A bookable `"HH:MM"` token. Zero-padded, so string order is time order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slot(String);

impl Slot {
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let raw = raw.trim();
        let bytes = raw.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(ModelError::BadSlot(raw.to_string()));
        }
        let digits = |a: u8, b: u8| -> Option<u32> {
            if a.is_ascii_digit() && b.is_ascii_digit() {
                Some(((a - b'0') * 10 + (b - b'0')) as u32)
            } else {
                None
            }
        };
        match (digits(bytes[0], bytes[1]), digits(bytes[3], bytes[4])) {
            (Some(h), Some(m)) if h < 24 && m < 60 => Ok(Self(raw.to_string())),
            _ => Err(ModelError::BadSlot(raw.to_string())),
        }
    }

    /// Current wall-clock minute as a slot token.
    pub fn from_time(time: NaiveTime) -> Self {
        Self(time.format("%H:%M").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn time(&self) -> NaiveTime {
        // Construction guarantees HH:MM within range.
        NaiveTime::parse_from_str(&self.0, "%H:%M").unwrap_or(NaiveTime::MIN)
    }

    pub fn on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.time())
    }
}

impl TryFrom<String> for Slot {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Slot::parse(&value)
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split a free-form list (one per line, or comma/space separated) into slots.
pub fn parse_slot_list(raw: &str) -> Result<Vec<Slot>, ModelError> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(Slot::parse)
        .collect()
}

/// Weekday index as the booking calendar counts them: 0 = Sunday … 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

pub fn parse_weekday_list(raw: &str) -> Result<Vec<u8>, ModelError> {
    let mut days = Vec::new();
    for token in raw.split(|c: char| c == ',' || c.is_whitespace()).filter(|t| !t.is_empty()) {
        let day: u8 = token
            .parse()
            .map_err(|_| ModelError::BadWeekday(token.to_string()))?;
        if day > 6 {
            return Err(ModelError::BadWeekday(token.to_string()));
        }
        if !days.contains(&day) {
            days.push(day);
        }
    }
    days.sort_unstable();
    Ok(days)
}

/// Price in cents. Rendered the way the salon shows it: `R$ 1.234,50`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub cents: i64,
}

impl Price {
    /// Accepts `45`, `45,5`, `45.50`, `R$ 45,00`. Comma is the decimal separator
    /// when present; a lone dot is also read as decimal.
    pub fn parse(input: &str) -> Result<Self, ModelError> {
        let cleaned = input.trim().trim_start_matches("R$").trim();
        let normalized = if cleaned.contains(',') {
            cleaned.replace('.', "").replace(',', ".")
        } else {
            cleaned.to_string()
        };
        let value: f64 = normalized
            .parse()
            .map_err(|_| ModelError::BadPrice(input.to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(ModelError::BadPrice(input.to_string()));
        }
        Ok(Self {
            cents: (value * 100.0).round() as i64,
        })
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = self.cents / 100;
        let cents = self.cents % 100;
        let digits = units.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(c);
        }
        write!(f, "R$ {grouped},{cents:02}")
    }
}

// ── Journey ──────────────────────────────────────────────────────

/// Position of a client on the workflow board.
///
/// `Registered → Contacted → Scheduled → Completed` is the forward path and is
/// ranked. `NoShow` and `Churned` are exits: reachable from anywhere, unranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JourneyState {
    #[serde(rename = "cadastrado")]
    Registered,
    #[serde(rename = "contatado")]
    Contacted,
    #[serde(rename = "agendado")]
    Scheduled,
    #[serde(rename = "realizado")]
    Completed,
    #[serde(rename = "nao_compareceu")]
    NoShow,
    #[serde(rename = "desistente")]
    Churned,
}

impl JourneyState {
    /// Board column order.
    pub const ALL: [JourneyState; 6] = [
        JourneyState::Registered,
        JourneyState::Contacted,
        JourneyState::Scheduled,
        JourneyState::Completed,
        JourneyState::NoShow,
        JourneyState::Churned,
    ];

    /// Index along the forward path. Exits have no rank.
    pub fn rank(self) -> Option<u8> {
        match self {
            JourneyState::Registered => Some(0),
            JourneyState::Contacted => Some(1),
            JourneyState::Scheduled => Some(2),
            JourneyState::Completed => Some(3),
            JourneyState::NoShow | JourneyState::Churned => None,
        }
    }

    pub fn is_exit(self) -> bool {
        self.rank().is_none()
    }

    /// Entering this state settles the client's open appointments.
    pub fn settles_appointments(self) -> bool {
        matches!(
            self,
            JourneyState::Completed | JourneyState::NoShow | JourneyState::Churned
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JourneyState::Registered => "cadastrado",
            JourneyState::Contacted => "contatado",
            JourneyState::Scheduled => "agendado",
            JourneyState::Completed => "realizado",
            JourneyState::NoShow => "nao_compareceu",
            JourneyState::Churned => "desistente",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        match raw.trim().to_lowercase().as_str() {
            "cadastrado" | "registered" => Ok(JourneyState::Registered),
            "contatado" | "contacted" => Ok(JourneyState::Contacted),
            "agendado" | "scheduled" => Ok(JourneyState::Scheduled),
            "realizado" | "completed" => Ok(JourneyState::Completed),
            "nao_compareceu" | "no_show" => Ok(JourneyState::NoShow),
            "desistente" | "churned" => Ok(JourneyState::Churned),
            _ => Err(ModelError::BadStatus(raw.to_string())),
        }
    }
}

impl fmt::Display for JourneyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[serde(rename = "Agendado")]
    Scheduled,
    #[serde(rename = "Realizado")]
    Completed,
    #[serde(rename = "Cancelado")]
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "Agendado",
            AppointmentStatus::Completed => "Realizado",
            AppointmentStatus::Cancelled => "Cancelado",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        match raw.trim().to_lowercase().as_str() {
            "agendado" | "scheduled" => Ok(AppointmentStatus::Scheduled),
            "realizado" | "completed" => Ok(AppointmentStatus::Completed),
            "cancelado" | "cancelled" => Ok(AppointmentStatus::Cancelled),
            _ => Err(ModelError::BadStatus(raw.to_string())),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "customer")]
    Customer,
    #[serde(rename = "admin")]
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        match raw.trim().to_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            _ => Err(ModelError::BadRole(raw.to_string())),
        }
    }
}

// ── Records ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub name: String,
    pub price: Price,
}

/// Salon-wide default hours. Slots are a flat allow-list; order is kept as entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyAvailability {
    pub working_days: Vec<u8>,
    pub default_time_slots: Vec<Slot>,
}

impl WeeklyAvailability {
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.working_days.contains(&weekday_index(date))
    }
}

/// Replaces the weekly slots for one date. Empty means closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityOverride {
    pub date: NaiveDate,
    pub time_slots: Vec<Slot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    /// `None` only on legacy records written before clients had ids.
    pub client_id: Option<Ulid>,
    pub client_name: String,
    pub service_id: Ulid,
    pub service_name: String,
    pub service_price: Price,
    pub date: NaiveDate,
    pub time: Slot,
    pub status: AppointmentStatus,
    pub admin_id: Option<Ulid>,
}

impl Appointment {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.time.on(self.date)
    }

    pub fn is_scheduled(&self) -> bool {
        self.status == AppointmentStatus::Scheduled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: Ulid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub status: JourneyState,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

/// The event types. Flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ServiceSaved {
        id: Ulid,
        name: String,
        price: Price,
    },
    ServiceDeleted {
        id: Ulid,
    },
    WeeklyAvailabilitySet {
        working_days: Vec<u8>,
        default_time_slots: Vec<Slot>,
    },
    OverrideSet {
        date: NaiveDate,
        time_slots: Vec<Slot>,
    },
    OverrideRemoved {
        date: NaiveDate,
    },
    ClientRegistered {
        id: Ulid,
        name: String,
        email: Option<String>,
        phone: Option<String>,
        role: Role,
        created_at: NaiveDateTime,
    },
    /// Status change plus the appointment outcomes it settles, as one record.
    ClientStatusChanged {
        id: Ulid,
        status: JourneyState,
        settled: Vec<(Ulid, AppointmentStatus)>,
    },
    ClientNotesUpdated {
        id: Ulid,
        notes: Option<String>,
    },
    /// Also promotes the booking client to `Scheduled`.
    AppointmentBooked {
        appointment: Appointment,
    },
    /// Batch of appointment outcomes, applied all-or-nothing.
    AppointmentsResolved {
        outcomes: Vec<(Ulid, AppointmentStatus)>,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardColumn {
    pub state: JourneyState,
    pub clients: Vec<Client>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pub columns: Vec<BoardColumn>,
    /// Clients the reconciliation pass moved to `NoShow` during this load.
    pub reconciled: Vec<Ulid>,
}

impl Board {
    pub fn column(&self, state: JourneyState) -> &[Client] {
        self.columns
            .iter()
            .find(|c| c.state == state)
            .map(|c| c.clients.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStats {
    pub client_id: Ulid,
    pub total_visits: usize,
    pub cancellations: usize,
    pub most_frequent_service: Option<String>,
    pub last_visit: Option<NaiveDate>,
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    BadSlot(String),
    BadWeekday(String),
    BadPrice(String),
    BadStatus(String),
    BadRole(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::BadSlot(s) => write!(f, "invalid time slot {s:?} (expected HH:MM)"),
            ModelError::BadWeekday(s) => write!(f, "invalid weekday {s:?} (expected 0-6)"),
            ModelError::BadPrice(s) => write!(f, "invalid price {s:?}"),
            ModelError::BadStatus(s) => write!(f, "unknown status {s:?}"),
            ModelError::BadRole(s) => write!(f, "unknown role {s:?}"),
        }
    }
}

impl std::error::Error for ModelError {}
