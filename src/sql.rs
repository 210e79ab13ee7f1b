use chrono::NaiveDate;
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Contact details for a client registered as part of a booking.
#[derive(Debug, Clone, PartialEq)]
pub struct NewClient {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppointmentFilter {
    /// Scheduled from today on.
    Upcoming,
    Date(NaiveDate),
    /// Full history, newest first.
    Client(Ulid),
    /// The client's own scheduled bookings from today on, soonest first.
    ClientUpcoming(Ulid),
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    SelectSlots {
        date: NaiveDate,
    },
    InsertAppointment {
        id: Ulid,
        client_id: Ulid,
        service_id: Ulid,
        date: NaiveDate,
        time: Slot,
        admin_id: Option<Ulid>,
        new_client: Option<NewClient>,
    },
    CancelAppointment {
        id: Ulid,
    },
    SelectAppointments {
        filter: AppointmentFilter,
    },
    InsertTransition {
        client_id: Ulid,
        from: JourneyState,
        to: JourneyState,
    },
    SelectConflicts {
        client_id: Ulid,
    },
    InsertResolutions {
        client_id: Ulid,
        dispositions: Vec<(Ulid, AppointmentStatus)>,
    },
    DeleteConflicts {
        client_id: Ulid,
    },
    SelectBoard,
    InsertOverride {
        date: NaiveDate,
        slots: Vec<Slot>,
        confirm: bool,
    },
    DeleteOverride {
        date: NaiveDate,
        confirm: bool,
    },
    SelectOverrides,
    InsertWeeklyAvailability {
        days: Vec<u8>,
        slots: Vec<Slot>,
        confirm: bool,
    },
    SelectWeeklyAvailability,
    InsertService {
        id: Ulid,
        name: String,
        /// Raw price text; the engine parses it.
        price: String,
    },
    DeleteService {
        id: Ulid,
    },
    SelectServices,
    InsertClient {
        id: Ulid,
        name: String,
        email: Option<String>,
        phone: Option<String>,
        role: Role,
    },
    SelectClients,
    InsertClientNotes {
        client_id: Ulid,
        notes: Option<String>,
    },
    SelectClientStats {
        client_id: Ulid,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Table a SELECT reads from, if `sql` is one. Placeholders are fine here,
/// which lets the extended protocol describe a statement before binding.
pub fn select_table(sql: &str) -> Option<String> {
    let stmts = Parser::parse_sql(&PostgreSqlDialect {}, sql).ok()?;
    match stmts.first()? {
        Statement::Query(query) => match query.body.as_ref() {
            SetExpr::Select(select) => table_factor_name(&select.from.first()?.relation).ok(),
            _ => None,
        },
        _ => None,
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;

    if table == "resolutions" {
        return parse_resolutions(&extract_all_insert_rows(insert)?);
    }

    let values = extract_insert_values(insert)?;
    let arg = |i: usize| values.get(i);

    match table.as_str() {
        "appointments" => {
            if values.len() < 5 {
                return Err(SqlError::WrongArity("appointments", 5, values.len()));
            }
            let new_client = match arg(6).map(parse_string_or_null).transpose()?.flatten() {
                Some(name) => Some(NewClient {
                    name,
                    email: optional_string(arg(7))?,
                    phone: optional_string(arg(8))?,
                }),
                None => None,
            };
            Ok(Command::InsertAppointment {
                id: parse_ulid_expr(&values[0])?,
                client_id: parse_ulid_expr(&values[1])?,
                service_id: parse_ulid_expr(&values[2])?,
                date: parse_date(&values[3])?,
                time: Slot::parse(&parse_string(&values[4])?)?,
                admin_id: arg(5).map(parse_ulid_or_null).transpose()?.flatten(),
                new_client,
            })
        }
        "transitions" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("transitions", 3, values.len()));
            }
            Ok(Command::InsertTransition {
                client_id: parse_ulid_expr(&values[0])?,
                from: JourneyState::parse(&parse_string(&values[1])?)?,
                to: JourneyState::parse(&parse_string(&values[2])?)?,
            })
        }
        "overrides" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("overrides", 2, values.len()));
            }
            Ok(Command::InsertOverride {
                date: parse_date(&values[0])?,
                slots: parse_slot_list(&parse_string_or_null(&values[1])?.unwrap_or_default())?,
                confirm: optional_bool(arg(2))?,
            })
        }
        "weekly_availability" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("weekly_availability", 2, values.len()));
            }
            Ok(Command::InsertWeeklyAvailability {
                days: parse_weekday_list(&parse_string_or_null(&values[0])?.unwrap_or_default())?,
                slots: parse_slot_list(&parse_string_or_null(&values[1])?.unwrap_or_default())?,
                confirm: optional_bool(arg(2))?,
            })
        }
        "services" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("services", 3, values.len()));
            }
            Ok(Command::InsertService {
                id: parse_ulid_expr(&values[0])?,
                name: parse_string(&values[1])?,
                price: parse_string(&values[2])?,
            })
        }
        "clients" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("clients", 2, values.len()));
            }
            let role = match optional_string(arg(4))? {
                Some(raw) => Role::parse(&raw)?,
                None => Role::Customer,
            };
            Ok(Command::InsertClient {
                id: parse_ulid_expr(&values[0])?,
                name: parse_string(&values[1])?,
                email: optional_string(arg(2))?,
                phone: optional_string(arg(3))?,
                role,
            })
        }
        "client_notes" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("client_notes", 2, values.len()));
            }
            Ok(Command::InsertClientNotes {
                client_id: parse_ulid_expr(&values[0])?,
                notes: parse_string_or_null(&values[1])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Every row names the same client. The outcome column defaults to a cancel.
fn parse_resolutions(rows: &[Vec<Expr>]) -> Result<Command, SqlError> {
    let mut client_id = None;
    let mut dispositions = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if row.len() < 2 {
            return Err(SqlError::WrongArity("resolutions row", 2, row.len()));
        }
        let row_err = |e: SqlError| SqlError::Parse(format!("row {i}: {e}"));
        let row_client = parse_ulid_expr(&row[0]).map_err(row_err)?;
        if *client_id.get_or_insert(row_client) != row_client {
            return Err(SqlError::Parse(format!(
                "row {i}: all resolutions must name the same client"
            )));
        }
        let appointment_id = parse_ulid_expr(&row[1]).map_err(row_err)?;
        let outcome = match optional_string(row.get(2)).map_err(row_err)? {
            Some(raw) => AppointmentStatus::parse(&raw)?,
            None => AppointmentStatus::Cancelled,
        };
        dispositions.push((appointment_id, outcome));
    }
    Ok(Command::InsertResolutions {
        client_id: client_id.ok_or(SqlError::Parse("empty VALUES".into()))?,
        dispositions,
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = where_filters(delete.selection.as_ref())?;

    match table.as_str() {
        "appointments" => Ok(Command::CancelAppointment {
            id: parse_ulid_expr(required(&filters, "id")?)?,
        }),
        "conflicts" => Ok(Command::DeleteConflicts {
            client_id: parse_ulid_expr(required(&filters, "client_id")?)?,
        }),
        "overrides" => Ok(Command::DeleteOverride {
            date: parse_date(required(&filters, "date")?)?,
            confirm: optional_bool(lookup(&filters, "confirm"))?,
        }),
        "services" => Ok(Command::DeleteService {
            id: parse_ulid_expr(required(&filters, "id")?)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = where_filters(select.selection.as_ref())?;

    match table.as_str() {
        "slots" => Ok(Command::SelectSlots {
            date: parse_date(required(&filters, "date")?)?,
        }),
        "appointments" => {
            let filter = if let Some(date) = lookup(&filters, "date") {
                AppointmentFilter::Date(parse_date(date)?)
            } else if let Some(client_id) = lookup(&filters, "client_id") {
                let client_id = parse_ulid_expr(client_id)?;
                if optional_bool(lookup(&filters, "upcoming"))? {
                    AppointmentFilter::ClientUpcoming(client_id)
                } else {
                    AppointmentFilter::Client(client_id)
                }
            } else {
                AppointmentFilter::Upcoming
            };
            Ok(Command::SelectAppointments { filter })
        }
        "conflicts" => Ok(Command::SelectConflicts {
            client_id: parse_ulid_expr(required(&filters, "client_id")?)?,
        }),
        "board" => Ok(Command::SelectBoard),
        "overrides" => Ok(Command::SelectOverrides),
        "weekly_availability" => Ok(Command::SelectWeeklyAvailability),
        "services" => Ok(Command::SelectServices),
        "clients" => Ok(Command::SelectClients),
        "client_stats" => Ok(Command::SelectClientStats {
            client_id: parse_ulid_expr(required(&filters, "client_id")?)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── WHERE clauses ─────────────────────────────────────────────

/// `col = value` terms joined by AND. Anything else is rejected.
fn where_filters(selection: Option<&Expr>) -> Result<Vec<(String, &Expr)>, SqlError> {
    let mut filters = Vec::new();
    if let Some(expr) = selection {
        collect_eq_filters(expr, &mut filters)?;
    }
    Ok(filters)
}

fn collect_eq_filters<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_eq_filters(left, out)?;
            collect_eq_filters(right, out)
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
            out.push((col, right.as_ref()));
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!("WHERE {other}"))),
    }
}

fn lookup<'a>(filters: &[(String, &'a Expr)], column: &str) -> Option<&'a Expr> {
    filters
        .iter()
        .find(|(col, _)| col == column)
        .map(|(_, expr)| *expr)
}

fn required<'a>(filters: &[(String, &'a Expr)], column: &'static str) -> Result<&'a Expr, SqlError> {
    lookup(filters, column).ok_or(SqlError::MissingFilter(column))
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let mut rows = extract_all_insert_rows(insert)?;
    if rows.len() > 1 {
        return Err(SqlError::Unsupported("multi-row INSERT on this table".into()));
    }
    Ok(rows.swap_remove(0))
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_ulid_or_null(expr: &Expr) -> Result<Option<Ulid>, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        Ok(None)
    } else {
        parse_ulid_expr(expr).map(Some)
    }
}

/// Quoted text, or a bare number read as its literal text (prices).
fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    parse_string_or_null(expr)?.ok_or_else(|| SqlError::Parse("unexpected NULL".into()))
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Null => Ok(None),
            Value::SingleQuotedString(s)
            | Value::DoubleQuotedString(s)
            | Value::EscapedStringLiteral(s)
            | Value::Number(s, _) => Ok(Some(s.clone())),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn optional_string(expr: Option<&Expr>) -> Result<Option<String>, SqlError> {
    Ok(expr.map(parse_string_or_null).transpose()?.flatten())
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let raw = parse_string(expr)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| SqlError::Parse(format!("bad date {raw:?} (expected YYYY-MM-DD)")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            Value::Null => Ok(false),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn optional_bool(expr: Option<&Expr>) -> Result<bool, SqlError> {
    expr.map_or(Ok(false), parse_bool)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    /// Well-formed SQL carrying a malformed slot, weekday, status or role.
    Invalid(ModelError),
}

impl From<ModelError> for SqlError {
    fn from(e: ModelError) -> Self {
        SqlError::Invalid(e)
    }
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at least {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::Invalid(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SqlError {}
