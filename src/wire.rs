use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::{Sink, SinkExt, stream};
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{AuthSource, DefaultServerParameterProvider, LoginInfo, Password, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::response::NoticeResponse;
use tokio::net::TcpStream;

use crate::engine::{
    BookingRequest, ClientRef, ConfirmOutcome, EditOutcome, Engine, EngineError, ErrorKind,
    TransitionOutcome, local_now,
};
use crate::model::*;
use crate::observability::{self, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, AppointmentFilter, Command, SqlError};
use crate::tenant::TenantManager;

// ── Auth ─────────────────────────────────────────────────────────

/// One shared cleartext password for every salon.
#[derive(Debug)]
pub struct PasswordSource {
    password: String,
}

impl PasswordSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for PasswordSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

// ── Handler ──────────────────────────────────────────────────────

pub struct AgendaHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<AgendaQueryParser>,
}

impl AgendaHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(AgendaQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager
            .get_or_create(&db)
            .map_err(|e| user_error("08006", format!("salon error: {e}")))
    }

    /// Execute with query metrics. Notices to send before the result land in `notices`.
    async fn run(
        &self,
        engine: &Engine,
        cmd: Command,
        notices: &mut Vec<String>,
    ) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let start = Instant::now();
        let result = self.execute_command(engine, cmd, notices).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
        notices: &mut Vec<String>,
    ) -> PgWireResult<Vec<Response>> {
        let now = local_now();
        match cmd {
            Command::SelectSlots { date } => {
                let slots = engine.available_slots(date, now);
                let day = date.to_string();
                rows(slots_schema(), slots, |enc, slot| {
                    enc.encode_field(&day)?;
                    enc.encode_field(&slot.to_string())
                })
            }
            Command::InsertAppointment {
                id,
                client_id,
                service_id,
                date,
                time,
                admin_id,
                new_client,
            } => {
                let client = match new_client {
                    Some(c) => ClientRef::New {
                        id: client_id,
                        name: c.name,
                        email: c.email,
                        phone: c.phone,
                    },
                    None => ClientRef::Existing(client_id),
                };
                let request = BookingRequest {
                    id,
                    client,
                    service_id,
                    date,
                    time,
                    admin_id,
                };
                let receipt = engine.create_booking(request, now).await.map_err(engine_err)?;
                if let Some(warning) = receipt.warning {
                    notices.push(format!("booking saved, but the notification failed: {warning}"));
                }
                executed("INSERT", 1)
            }
            Command::CancelAppointment { id } => {
                engine.cancel_booking(id, now).await.map_err(engine_err)?;
                executed("DELETE", 1)
            }
            Command::SelectAppointments { filter } => {
                let appointments = match filter {
                    AppointmentFilter::Upcoming => engine.upcoming_appointments(now.date()),
                    AppointmentFilter::Date(date) => engine.appointments_on(date),
                    AppointmentFilter::Client(client_id) => engine.client_history(&client_id),
                    AppointmentFilter::ClientUpcoming(client_id) => {
                        engine.client_bookings(&client_id, now)
                    }
                };
                rows(appointment_schema(), appointments, encode_appointment)
            }
            Command::InsertTransition {
                client_id,
                from,
                to,
            } => match engine.move_client(client_id, from, to).await.map_err(engine_err)? {
                TransitionOutcome::Unchanged => executed("INSERT", 0),
                TransitionOutcome::Applied { .. } => executed("INSERT", 1),
                TransitionOutcome::PendingConfirmation(set) => Err(user_error(
                    "23P01",
                    format!(
                        "moving client {client_id} to {to} needs confirmation: {} scheduled appointments ({}); \
                         read conflicts and insert resolutions",
                        set.appointments.len(),
                        describe(&set.appointments),
                    ),
                )),
            },
            Command::SelectConflicts { client_id } => {
                let Some(set) = engine.pending_conflict(&client_id) else {
                    return rows(conflict_schema(), Vec::new(), |_, _: &Appointment| Ok(()));
                };
                let (from, to) = (set.from.to_string(), set.to.to_string());
                let client = client_id.to_string();
                rows(conflict_schema(), set.appointments, |enc, a| {
                    enc.encode_field(&client)?;
                    enc.encode_field(&from)?;
                    enc.encode_field(&to)?;
                    enc.encode_field(&a.id.to_string())?;
                    enc.encode_field(&a.date.to_string())?;
                    enc.encode_field(&a.time.to_string())?;
                    enc.encode_field(&a.service_name)
                })
            }
            Command::InsertResolutions {
                client_id,
                dispositions,
            } => {
                let count = dispositions.len();
                match engine
                    .confirm_transition(client_id, dispositions)
                    .await
                    .map_err(engine_err)?
                {
                    ConfirmOutcome::Committed(_) => {}
                    ConfirmOutcome::Vetoed { remaining } => notices.push(format!(
                        "transition vetoed, {} bookings remain: {}",
                        remaining.len(),
                        describe(&remaining),
                    )),
                }
                executed("INSERT", count)
            }
            Command::DeleteConflicts { client_id } => {
                engine.abandon_transition(client_id).map_err(engine_err)?;
                executed("DELETE", 1)
            }
            Command::SelectBoard => {
                let board = engine.load_board(now).await;
                if !board.reconciled.is_empty() {
                    notices.push(format!(
                        "{} clients moved to no-show",
                        board.reconciled.len()
                    ));
                }
                let cards: Vec<(JourneyState, Client)> = board
                    .columns
                    .into_iter()
                    .flat_map(|col| col.clients.into_iter().map(move |c| (col.state, c)))
                    .collect();
                rows(board_schema(), cards, |enc, (state, c)| {
                    enc.encode_field(&state.to_string())?;
                    enc.encode_field(&c.id.to_string())?;
                    enc.encode_field(&c.name)?;
                    enc.encode_field(&c.email)?;
                    enc.encode_field(&c.phone)?;
                    enc.encode_field(&c.notes)
                })
            }
            Command::InsertOverride {
                date,
                slots,
                confirm,
            } => {
                let outcome = engine
                    .set_override(date, slots, confirm, now)
                    .await
                    .map_err(engine_err)?;
                edit_response("INSERT", outcome, notices)
            }
            Command::DeleteOverride { date, confirm } => {
                let outcome = engine
                    .delete_override(date, confirm, now)
                    .await
                    .map_err(engine_err)?;
                edit_response("DELETE", outcome, notices)
            }
            Command::SelectOverrides => {
                rows(override_schema(), engine.list_overrides(), |enc, o| {
                    enc.encode_field(&o.date.to_string())?;
                    enc.encode_field(&join(&o.time_slots))
                })
            }
            Command::InsertWeeklyAvailability {
                days,
                slots,
                confirm,
            } => {
                let outcome = engine
                    .set_weekly_availability(days, slots, confirm, now)
                    .await
                    .map_err(engine_err)?;
                edit_response("INSERT", outcome, notices)
            }
            Command::SelectWeeklyAvailability => {
                let weekly: Vec<WeeklyAvailability> =
                    engine.weekly_availability().into_iter().collect();
                rows(weekly_schema(), weekly, |enc, w| {
                    enc.encode_field(&join(&w.working_days))?;
                    enc.encode_field(&join(&w.default_time_slots))
                })
            }
            Command::InsertService { id, name, price } => {
                // Inserting over an existing id edits the service.
                let saved = if engine.store.service(&id).is_some() {
                    engine.update_service(id, &name, &price).await
                } else {
                    engine.create_service(id, &name, &price).await
                };
                saved.map_err(engine_err)?;
                executed("INSERT", 1)
            }
            Command::DeleteService { id } => {
                engine.delete_service(id).await.map_err(engine_err)?;
                executed("DELETE", 1)
            }
            Command::SelectServices => rows(service_schema(), engine.list_services(), |enc, s| {
                enc.encode_field(&s.id.to_string())?;
                enc.encode_field(&s.name)?;
                enc.encode_field(&s.price.to_string())?;
                enc.encode_field(&s.price.cents)
            }),
            Command::InsertClient {
                id,
                name,
                email,
                phone,
                role,
            } => {
                engine
                    .register_client(id, &name, email, phone, role, now)
                    .await
                    .map_err(engine_err)?;
                executed("INSERT", 1)
            }
            Command::SelectClients => rows(client_schema(), engine.list_clients(), |enc, c| {
                enc.encode_field(&c.id.to_string())?;
                enc.encode_field(&c.name)?;
                enc.encode_field(&c.email)?;
                enc.encode_field(&c.phone)?;
                enc.encode_field(&c.role.as_str().to_string())?;
                enc.encode_field(&c.status.to_string())?;
                enc.encode_field(&c.notes)?;
                enc.encode_field(&c.created_at.format("%Y-%m-%d %H:%M:%S").to_string())
            }),
            Command::InsertClientNotes { client_id, notes } => {
                engine
                    .update_client_notes(client_id, notes)
                    .await
                    .map_err(engine_err)?;
                executed("INSERT", 1)
            }
            Command::SelectClientStats { client_id } => {
                let stats = engine.client_stats(&client_id).map_err(engine_err)?;
                rows(stats_schema(), vec![stats], |enc, s| {
                    enc.encode_field(&s.client_id.to_string())?;
                    enc.encode_field(&(s.total_visits as i64))?;
                    enc.encode_field(&(s.cancellations as i64))?;
                    enc.encode_field(&s.most_frequent_service)?;
                    enc.encode_field(&s.last_visit.map(|d| d.to_string()))
                })
            }
        }
    }
}

fn executed(tag: &str, count: usize) -> PgWireResult<Vec<Response>> {
    Ok(vec![Response::Execution(Tag::new(tag).with_rows(count))])
}

fn edit_response(
    tag: &str,
    outcome: EditOutcome,
    notices: &mut Vec<String>,
) -> PgWireResult<Vec<Response>> {
    match outcome {
        EditOutcome::Committed { cancelled, churned } => {
            if !cancelled.is_empty() {
                notices.push(format!(
                    "{} bookings cancelled, {} clients churned",
                    cancelled.len(),
                    churned.len()
                ));
            }
            executed(tag, 1)
        }
        EditOutcome::NeedsConfirmation(conflicts) => Err(user_error(
            "23P01",
            format!(
                "{} bookings would lose their slot ({}); resubmit with confirm = true to cancel them",
                conflicts.len(),
                describe(&conflicts),
            ),
        )),
    }
}

/// `dd/mm HH:MM client` for each appointment, comma-joined.
fn describe(appointments: &[Appointment]) -> String {
    appointments
        .iter()
        .map(|a| format!("{} {} {}", a.date.format("%d/%m"), a.time, a.client_name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn rows<T>(
    schema: Vec<FieldInfo>,
    items: Vec<T>,
    encode: impl Fn(&mut DataRowEncoder, &T) -> PgWireResult<()>,
) -> PgWireResult<Vec<Response>> {
    let schema = Arc::new(schema);
    let data: Vec<PgWireResult<_>> = items
        .iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(vec![Response::Query(QueryResponse::new(
        schema,
        stream::iter(data),
    ))])
}

fn encode_appointment(enc: &mut DataRowEncoder, a: &Appointment) -> PgWireResult<()> {
    enc.encode_field(&a.id.to_string())?;
    enc.encode_field(&a.client_id.map(|id| id.to_string()))?;
    enc.encode_field(&a.client_name)?;
    enc.encode_field(&a.service_id.to_string())?;
    enc.encode_field(&a.service_name)?;
    enc.encode_field(&a.service_price.to_string())?;
    enc.encode_field(&a.date.to_string())?;
    enc.encode_field(&a.time.to_string())?;
    enc.encode_field(&a.status.to_string())?;
    enc.encode_field(&a.admin_id.map(|id| id.to_string()))
}

// ── Result schemas ───────────────────────────────────────────────

fn text(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn slots_schema() -> Vec<FieldInfo> {
    vec![text("date"), text("time")]
}

fn appointment_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("client_id"),
        text("client_name"),
        text("service_id"),
        text("service_name"),
        text("service_price"),
        text("date"),
        text("time"),
        text("status"),
        text("admin_id"),
    ]
}

fn conflict_schema() -> Vec<FieldInfo> {
    vec![
        text("client_id"),
        text("from_status"),
        text("to_status"),
        text("appointment_id"),
        text("date"),
        text("time"),
        text("service_name"),
    ]
}

fn board_schema() -> Vec<FieldInfo> {
    vec![
        text("status"),
        text("client_id"),
        text("name"),
        text("email"),
        text("phone"),
        text("notes"),
    ]
}

fn override_schema() -> Vec<FieldInfo> {
    vec![text("date"), text("slots")]
}

fn weekly_schema() -> Vec<FieldInfo> {
    vec![text("working_days"), text("slots")]
}

fn service_schema() -> Vec<FieldInfo> {
    vec![text("id"), text("name"), text("price"), int("price_cents")]
}

fn client_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("name"),
        text("email"),
        text("phone"),
        text("role"),
        text("status"),
        text("notes"),
        text("created_at"),
    ]
}

fn stats_schema() -> Vec<FieldInfo> {
    vec![
        text("client_id"),
        int("total_visits"),
        int("cancellations"),
        text("most_frequent_service"),
        text("last_visit"),
    ]
}

/// Columns a SELECT will return, for Describe before execution.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    match sql::select_table(sql).as_deref() {
        Some("slots") => slots_schema(),
        Some("appointments") => appointment_schema(),
        Some("conflicts") => conflict_schema(),
        Some("board") => board_schema(),
        Some("overrides") => override_schema(),
        Some("weekly_availability") => weekly_schema(),
        Some("services") => service_schema(),
        Some("clients") => client_schema(),
        Some("client_stats") => stats_schema(),
        _ => vec![],
    }
}

async fn send_notices<C>(client: &mut C, notices: Vec<String>) -> PgWireResult<()>
where
    C: Sink<PgWireBackendMessage> + Unpin + Send,
    PgWireError: From<C::Error>,
{
    for message in notices {
        let info = ErrorInfo::new("WARNING".into(), "01000".into(), message);
        client
            .send(PgWireBackendMessage::NoticeResponse(NoticeResponse::from(info)))
            .await?;
    }
    Ok(())
}

#[async_trait]
impl SimpleQueryHandler for AgendaHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let mut notices = Vec::new();
        let responses = self.run(&engine, cmd, &mut notices).await?;
        send_notices(client, notices).await?;
        Ok(responses)
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct AgendaQueryParser;

#[async_trait]
impl QueryParser for AgendaQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for AgendaHandler {
    type Statement = String;
    type QueryParser = AgendaQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut notices = Vec::new();
        let mut responses = self.run(&engine, cmd, &mut notices).await?;
        send_notices(client, notices).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    max = max.max(n);
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    bind_params(&portal.statement.statement, &portal.parameters)
}

/// One left-to-right pass over the statement. Inserted values are never
/// rescanned, and placeholders inside quoted literals stay as written.
fn bind_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((i, c)) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                result.push(c);
            }
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                result.push(c);
            }
            None if c == '$' => {
                let start = i + 1;
                let mut end = start;
                while let Some((j, d)) = chars.peek().copied() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    end = j + 1;
                    chars.next();
                }
                let bound = sql[start..end]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|n| params.get(n));
                match bound {
                    Some(Some(bytes)) => {
                        let text = String::from_utf8_lossy(bytes.as_ref());
                        result.push('\'');
                        result.push_str(&text.replace('\'', "''"));
                        result.push('\'');
                    }
                    Some(None) => result.push_str("NULL"),
                    None => result.push_str(&sql[i..end]),
                }
            }
            None => result.push(c),
        }
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct AgendaFactory {
    handler: Arc<AgendaHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<PasswordSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl AgendaFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = PasswordSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(AgendaHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for AgendaFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
) -> std::io::Result<()> {
    let factory = Arc::new(AgendaFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, None, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn sqlstate(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "22023",
        ErrorKind::NotFound => "P0002",
        ErrorKind::Conflict => "23P01",
        ErrorKind::Persistence => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(sqlstate(e.kind()), e.to_string())
}

fn sql_sqlstate(e: &SqlError) -> &'static str {
    match e {
        SqlError::Invalid(_) => "22023",
        _ => "42601",
    }
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error(sql_sqlstate(&e), e.to_string())
}
