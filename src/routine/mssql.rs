//! SQL Server: one batch per call.
//!
//! OUTPUT parameters are declared as local variables, passed with the
//! `OUTPUT` keyword and selected after the `EXEC`, so their values arrive as
//! the last result set of the batch once the procedure's own results have
//! been read. Table-valued parameters are declared with their structured
//! type and filled before the call.

use super::{CallPlan, OutputSource, RoutineCall, Statement};
use crate::error::{DbError, DbResult};
use crate::models::{CallShape, Direction, Engine, ParamKind};

const DEFAULT_SCHEMA: &str = "dbo";
/// Row constructors allowed in one table value constructor
const MAX_INSERT_ROWS: usize = 1000;

pub(super) fn plan(call: &RoutineCall) -> DbResult<CallPlan> {
    let engine = Engine::SqlServer;
    let routine = call.signature.qualified_name();

    if call.shape == CallShape::Scalar {
        let mut args = Vec::with_capacity(call.params.len());
        for param in &call.params {
            match &param.kind {
                ParamKind::Scalar(value) if param.direction == Direction::In => {
                    args.push(engine.escape(value))
                }
                _ => {
                    return Err(DbError::call_mismatch(
                        routine,
                        format!("scalar functions only take input values ('{}')", param.name),
                    ));
                }
            }
        }
        // Scalar functions must be schema-qualified
        let schema = call.signature.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);
        return Ok(CallPlan::new(Statement::new(format!(
            "SELECT {}.{}({}) AS [result]",
            schema,
            call.signature.name,
            args.join(", ")
        ))));
    }

    let mut batch = Vec::new();
    let mut args = Vec::new();
    let mut selected = Vec::new();

    for (index, param) in call.params.iter().enumerate() {
        let position = index + 1;
        match &param.kind {
            ParamKind::Table { type_name, rows } => {
                let var = format!("@tvp{}", position);
                batch.push(format!("DECLARE {} {};", var, type_name));
                for chunk in rows.chunks(MAX_INSERT_ROWS) {
                    let values: Vec<String> = chunk
                        .iter()
                        .map(|row| {
                            let cells: Vec<String> = row.iter().map(|v| engine.escape(v)).collect();
                            format!("({})", cells.join(", "))
                        })
                        .collect();
                    batch.push(format!("INSERT INTO {} VALUES {};", var, values.join(", ")));
                }
                args.push(format!("@{} = {}", param.name, var));
            }
            ParamKind::Scalar(value) => {
                if param.direction == Direction::In {
                    args.push(format!("@{} = {}", param.name, engine.escape(value)));
                    continue;
                }
                let var = format!("@out{}", position);
                if param.direction == Direction::InOut {
                    batch.push(format!(
                        "DECLARE {} {} = {};",
                        var,
                        param.sql_type,
                        engine.escape(value)
                    ));
                } else {
                    batch.push(format!("DECLARE {} {};", var, param.sql_type));
                }
                args.push(format!("@{} = {} OUTPUT", param.name, var));
                selected.push(format!("{} AS {}", var, engine.escape_identifier(&param.name)));
            }
            ParamKind::Cursor(_) => {
                return Err(DbError::call_mismatch(
                    routine,
                    format!(
                        "parameter '{}': cursor parameters are only supported on PostgreSQL",
                        param.name
                    ),
                ));
            }
        }
    }

    if args.is_empty() {
        batch.push(format!("EXEC {};", routine));
    } else {
        batch.push(format!("EXEC {} {};", routine, args.join(", ")));
    }
    let has_outputs = !selected.is_empty();
    if has_outputs {
        batch.push(format!("SELECT {};", selected.join(", ")));
    }

    let mut plan = CallPlan::new(Statement::new(batch.join("\n")));
    if has_outputs {
        plan.outputs = OutputSource::LastResultSet;
    }
    Ok(plan)
}
