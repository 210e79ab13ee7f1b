use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "agenda_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "agenda_query_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: booking attempts. Labels: outcome (created, slot_unavailable).
pub const BOOKINGS_TOTAL: &str = "agenda_bookings_total";

/// Counter: bookings cancelled one at a time.
pub const CANCELLATIONS_TOTAL: &str = "agenda_cancellations_total";

/// Counter: booking notifications that could not be delivered.
pub const NOTIFY_FAILURES_TOTAL: &str = "agenda_notify_failures_total";

/// Counter: journey moves. Labels: outcome (applied, suspended, committed, vetoed).
pub const TRANSITIONS_TOTAL: &str = "agenda_transitions_total";

/// Counter: clients moved to no-show by reconciliation.
pub const NO_SHOWS_TOTAL: &str = "agenda_no_shows_total";

/// Counter: availability saves. Labels: outcome (committed, needs_confirmation).
pub const AVAILABILITY_EDITS_TOTAL: &str = "agenda_availability_edits_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "agenda_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "agenda_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "agenda_connections_rejected_total";

/// Gauge: number of loaded salons.
pub const TENANTS_ACTIVE: &str = "agenda_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "agenda_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (appends per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "agenda_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SelectSlots { .. } => "select_slots",
        Command::InsertAppointment { .. } => "insert_appointment",
        Command::CancelAppointment { .. } => "cancel_appointment",
        Command::SelectAppointments { .. } => "select_appointments",
        Command::InsertTransition { .. } => "insert_transition",
        Command::SelectConflicts { .. } => "select_conflicts",
        Command::InsertResolutions { .. } => "insert_resolutions",
        Command::DeleteConflicts { .. } => "delete_conflicts",
        Command::SelectBoard => "select_board",
        Command::InsertOverride { .. } => "insert_override",
        Command::DeleteOverride { .. } => "delete_override",
        Command::SelectOverrides => "select_overrides",
        Command::InsertWeeklyAvailability { .. } => "insert_weekly_availability",
        Command::SelectWeeklyAvailability => "select_weekly_availability",
        Command::InsertService { .. } => "insert_service",
        Command::DeleteService { .. } => "delete_service",
        Command::SelectServices => "select_services",
        Command::InsertClient { .. } => "insert_client",
        Command::SelectClients => "select_clients",
        Command::InsertClientNotes { .. } => "insert_client_notes",
        Command::SelectClientStats { .. } => "select_client_stats",
    }
}
