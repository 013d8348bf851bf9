//! PostgreSQL: every routine is a set-returning `SELECT`.
//!
//! OUT and INOUT values come back as columns of the first row, in
//! declaration order. Refcursor parameters are not values at all: they name
//! portals that are fetched after the call, inside the same transaction.

use super::{CallPlan, CursorDrain, CursorSource, OutputSource, RoutineCall, Statement};
use crate::error::{DbError, DbResult};
use crate::models::{Engine, ParamKind, Value};
use uuid::Uuid;

pub(super) fn plan(call: &RoutineCall) -> DbResult<CallPlan> {
    let engine = Engine::PostgreSQL;
    let mut args = Vec::new();
    let mut slots = Vec::new();
    let mut drains = Vec::new();
    // Column of the next output in the result row
    let mut column = 0;

    for param in &call.params {
        match &param.kind {
            ParamKind::Cursor(name) => {
                let source = if param.direction.is_input() {
                    let name = name.clone().unwrap_or_else(generated_cursor_name);
                    let escaped = engine.escape(&Value::Text(name.clone()));
                    args.push(literal(escaped, param.hinted, &param.sql_type));
                    if param.direction.is_output() {
                        CursorSource::Column(column)
                    } else {
                        CursorSource::Literal(name)
                    }
                } else {
                    CursorSource::Column(column)
                };
                drains.push(CursorDrain {
                    param: param.name.clone(),
                    source,
                });
                if param.direction.is_output() {
                    column += 1;
                }
            }
            ParamKind::Scalar(value) => {
                if param.direction.is_input() {
                    args.push(literal(engine.escape(value), param.hinted, &param.sql_type));
                }
                if param.direction.is_output() {
                    slots.push((param.name.clone(), column));
                    column += 1;
                }
            }
            ParamKind::Table { .. } => {
                return Err(DbError::call_mismatch(
                    call.signature.qualified_name(),
                    "table-valued parameters are only supported on SQL Server",
                ));
            }
        }
    }

    let sql = format!(
        "SELECT * FROM {}({})",
        call.signature.qualified_name(),
        args.join(", ")
    );
    let mut plan = CallPlan::new(Statement::new(sql));
    if !slots.is_empty() {
        plan.outputs = OutputSource::SameRow(slots);
    }
    plan.needs_transaction = !drains.is_empty();
    // Cursor parameters only name portals; their rows come from the drains
    plan.include_call_result = drains.is_empty();
    plan.drains = drains;
    Ok(plan)
}

fn literal(escaped: String, hinted: bool, sql_type: &str) -> String {
    if hinted {
        format!("CAST({} AS {})", escaped, sql_type)
    } else {
        escaped
    }
}

fn generated_cursor_name() -> String {
    format!("cur_{}", Uuid::new_v4().simple())
}
