use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::model::Appointment;

/// Outbound message for the relay. `to: None` targets the salon's admin line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingNotice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub body: String,
}

impl BookingNotice {
    /// Manual bookings made by an admin always go to the admin line. Self-service
    /// bookings go to the client's phone when there is one.
    pub fn for_booking(appointment: &Appointment, client_phone: Option<&str>) -> Self {
        let to = match (appointment.admin_id, client_phone) {
            (None, Some(phone)) if !phone.trim().is_empty() => Some(phone.trim().to_string()),
            _ => None,
        };
        let body = format!(
            "Novo Agendamento! 🔔\n\nCliente: {}\nServiço: {}\nData: {}\nHorário: {}",
            appointment.client_name,
            appointment.service_name,
            appointment.date.format("%d/%m/%Y"),
            appointment.time,
        );
        Self { to, body }
    }
}

#[derive(Debug)]
pub enum NotifyError {
    Transport(String),
    Rejected(u16),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::Transport(e) => write!(f, "notification relay unreachable: {e}"),
            NotifyError::Rejected(status) => {
                write!(f, "notification relay answered {status}")
            }
        }
    }
}

impl std::error::Error for NotifyError {}

/// Best-effort delivery of booking notices. Failures never undo a booking.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &BookingNotice) -> Result<(), NotifyError>;
}

/// Used when no relay is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, notice: &BookingNotice) -> Result<(), NotifyError> {
        tracing::debug!(to = ?notice.to, "notifications disabled, dropping notice");
        Ok(())
    }
}

/// JSON POST of `{to?, body}` to a WhatsApp/SMS relay.
pub struct RelayNotifier {
    client: reqwest::Client,
    url: String,
}

impl RelayNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for RelayNotifier {
    async fn notify(&self, notice: &BookingNotice) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(notice)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Captures notices instead of sending them.
#[cfg(test)]
pub struct RecordingNotifier {
    pub sent: std::sync::Mutex<Vec<BookingNotice>>,
    pub fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            fail: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let n = Self::new();
        n.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        n
    }

    pub fn sent(&self) -> Vec<BookingNotice> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: &BookingNotice) -> Result<(), NotifyError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(NotifyError::Rejected(503));
        }
        self.sent.lock().unwrap().push(notice.clone());
        Ok(())
    }
}
