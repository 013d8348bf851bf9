//! Stored-routine invocation.
//!
//! A call goes through three stages:
//!
//! 1. [`RoutineCall::bind`] checks the supplied parameters against the
//!    routine's declared signature (arity, direction, engine support) and
//!    resolves every parameter's SQL type.
//! 2. A per-engine generator turns the bound call into a [`CallPlan`]: the
//!    statements to send, where output parameters come back from and which
//!    cursors must be drained.
//! 3. [`run_plan`] executes the plan on a session, draining every result in
//!    order before output parameters are read.
//!
//! Generators are pure, so call text can be tested without a server.

pub mod catalog;
mod mssql;
mod mysql;
mod postgres;

pub use catalog::RoutineCache;

use crate::db::result::{OutputParameters, ResultCollection, ResultSet, RowCursor};
use crate::db::Database;
use crate::error::{DbError, DbResult};
use crate::models::{
    CallShape, DeclaredParam, Direction, Engine, Param, ParamKind, RoutineSignature, Value,
};
use tracing::{debug, warn};

static NULL: Value = Value::Null;

/// A parameter checked against its declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    /// Declared name, without any `@` prefix
    pub name: String,
    pub kind: ParamKind,
    pub direction: Direction,
    /// Resolved SQL type: hint, else declared type, else the generic text type
    pub sql_type: String,
    /// Whether the caller supplied the type explicitly
    pub hinted: bool,
}

impl BoundParam {
    pub fn value(&self) -> &Value {
        match &self.kind {
            ParamKind::Scalar(v) => v,
            _ => &NULL,
        }
    }

    pub fn is_cursor(&self) -> bool {
        matches!(self.kind, ParamKind::Cursor(_))
    }
}

/// Engine-independent description of one routine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineCall {
    pub engine: Engine,
    pub signature: RoutineSignature,
    pub shape: CallShape,
    pub params: Vec<BoundParam>,
}

impl RoutineCall {
    /// Validate `params` against `signature` for `engine`.
    ///
    /// Every mismatch is reported as `CALL_MISMATCH` before any statement
    /// is sent.
    pub fn bind(
        engine: Engine,
        signature: &RoutineSignature,
        shape: CallShape,
        params: Vec<Param>,
    ) -> DbResult<Self> {
        let routine = signature.qualified_name();
        let mismatch = |message: String| DbError::call_mismatch(routine.clone(), message);

        if !engine.supports_routines() {
            return Err(mismatch(format!("{} has no stored routines", engine)));
        }
        validate_routine_name(&routine).map_err(&mismatch)?;

        if params.len() != signature.params.len() {
            return Err(mismatch(format!(
                "expected {} parameters, got {}",
                signature.params.len(),
                params.len()
            )));
        }

        let params = params
            .into_iter()
            .zip(&signature.params)
            .map(|(param, declared)| bind_param(engine, param, declared).map_err(&mismatch))
            .collect::<DbResult<Vec<_>>>()?;

        Ok(Self {
            engine,
            signature: signature.clone(),
            shape,
            params,
        })
    }

    pub fn outputs(&self) -> impl Iterator<Item = &BoundParam> {
        self.params
            .iter()
            .filter(|p| p.direction.is_output() && !p.is_cursor())
    }

    pub fn has_outputs(&self) -> bool {
        self.outputs().next().is_some()
    }

    /// Generate the engine-specific plan.
    pub fn plan(&self) -> DbResult<CallPlan> {
        match self.engine {
            Engine::PostgreSQL => postgres::plan(self),
            Engine::MySQL => mysql::plan(self),
            Engine::SqlServer => mssql::plan(self),
            Engine::SQLite => Err(DbError::call_mismatch(
                self.signature.qualified_name(),
                "SQLite has no stored routines",
            )),
        }
    }
}

fn direction_compatible(supplied: Direction, declared: Direction) -> bool {
    // SQL Server reports every OUTPUT parameter as INOUT
    matches!(
        (supplied, declared),
        (Direction::In, Direction::In)
            | (Direction::Out, Direction::Out)
            | (Direction::Out, Direction::InOut)
            | (Direction::InOut, Direction::InOut)
    )
}

fn bind_param(
    engine: Engine,
    param: Param,
    declared: &DeclaredParam,
) -> Result<BoundParam, String> {
    let Param {
        kind,
        direction,
        sql_type,
    } = param;

    // A refcursor declaration is a drain target no matter what was supplied
    let (kind, direction) = match kind {
        ParamKind::Scalar(value) if declared.is_cursor() => {
            let name = value.as_str().map(String::from);
            (ParamKind::Cursor(name), declared.direction)
        }
        ParamKind::Cursor(name) => {
            if engine != Engine::PostgreSQL {
                return Err(format!(
                    "parameter '{}': cursor parameters are only supported on PostgreSQL",
                    declared.name
                ));
            }
            if !declared.is_cursor() {
                return Err(format!(
                    "parameter '{}' is declared {} and cannot take a cursor",
                    declared.name, declared.data_type
                ));
            }
            (ParamKind::Cursor(name), declared.direction)
        }
        ParamKind::Table { type_name, rows } => {
            if engine != Engine::SqlServer {
                return Err(format!(
                    "parameter '{}': table-valued parameters are only supported on SQL Server",
                    declared.name
                ));
            }
            if direction != Direction::In {
                return Err(format!(
                    "parameter '{}': table-valued parameters are input only",
                    declared.name
                ));
            }
            check_type_name(&type_name)?;
            (ParamKind::Table { type_name, rows }, direction)
        }
        scalar => {
            if !direction_compatible(direction, declared.direction) {
                return Err(format!(
                    "parameter '{}' is declared {:?} but was supplied as {:?}",
                    declared.name, declared.direction, direction
                ));
            }
            (scalar, direction)
        }
    };

    let hinted = sql_type.is_some();
    let sql_type = sql_type
        .or_else(|| Some(declared.data_type.clone()).filter(|t| !t.trim().is_empty()))
        .unwrap_or_else(|| engine.generic_text_type().to_string());
    check_type_name(&sql_type)?;

    Ok(BoundParam {
        name: declared.name.clone(),
        kind,
        direction,
        sql_type,
        hinted,
    })
}

/// Routine names are rendered unquoted, so only identifier characters pass.
fn validate_routine_name(name: &str) -> Result<(), String> {
    let valid = !name.is_empty()
        && name.split('.').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        });
    if valid {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid routine name", name))
    }
}

/// Type names are spliced into call text.
fn check_type_name(type_name: &str) -> Result<(), String> {
    let valid = type_name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | ' ' | '(' | ')' | ',' | '[' | ']'));
    if valid {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid type name", type_name))
    }
}

/// One statement of a plan.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }

    pub fn with_binds(sql: impl Into<String>, binds: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            binds,
        }
    }
}

/// Where output parameter values come back from.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSource {
    None,
    /// Columns of the call's first row: (parameter name, column index)
    SameRow(Vec<(String, usize)>),
    /// A follow-up SELECT run after every call result has been drained
    TrailingSelect(Statement),
    /// The last result set of the call batch
    LastResultSet,
}

/// How a cursor to drain is named.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorSource {
    /// Name chosen before the call
    Literal(String),
    /// Name returned in this column of the call's first row
    Column(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CursorDrain {
    pub param: String,
    pub source: CursorSource,
}

/// Engine-specific statements for one routine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPlan {
    pub setup: Vec<Statement>,
    pub call: Statement,
    /// The call ends with a status-only result that carries no rows
    pub status_segment: bool,
    pub outputs: OutputSource,
    /// Cursors to fetch after the call, in parameter order
    pub drains: Vec<CursorDrain>,
    /// Cursors only live inside a transaction
    pub needs_transaction: bool,
    /// Keep the call's own result sets in the collection
    pub include_call_result: bool,
}

impl CallPlan {
    pub fn new(call: Statement) -> Self {
        Self {
            setup: Vec::new(),
            call,
            status_segment: false,
            outputs: OutputSource::None,
            drains: Vec::new(),
            needs_transaction: false,
            include_call_result: true,
        }
    }

    /// Every statement in send order, for logging and tests.
    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.setup.iter().chain(std::iter::once(&self.call)).chain(
            match &self.outputs {
                OutputSource::TrailingSelect(stmt) => Some(stmt),
                _ => None,
            },
        )
    }
}

/// Execute `plan` on `db` and normalize everything it returned.
pub(crate) async fn run_plan(
    db: &mut Database,
    routine: &str,
    plan: &CallPlan,
    shape: CallShape,
) -> DbResult<ResultCollection> {
    let opened = plan.needs_transaction && !db.in_transaction();
    if opened {
        db.trans_begin().await?;
    }

    let result = execute_plan(db, routine, plan, shape).await;

    if opened {
        if result.is_ok() {
            db.trans_commit().await?;
        } else if let Err(e) = db.trans_rollback(None).await {
            warn!(routine = %routine, error = %e, "Failed to roll back after routine error");
        }
    }
    result
}

async fn execute_plan(
    db: &mut Database,
    routine: &str,
    plan: &CallPlan,
    shape: CallShape,
) -> DbResult<ResultCollection> {
    for stmt in &plan.setup {
        db.execute(&stmt.sql, &stmt.binds).await?;
    }

    let mut sets = db
        .execute(&plan.call.sql, &plan.call.binds)
        .await?
        .result_sets;
    if plan.status_segment {
        let trailing_status = sets
            .last()
            .is_some_and(|s| s.is_empty() && s.columns().is_empty());
        if trailing_status {
            sets.pop();
        }
    }

    let outputs = match &plan.outputs {
        OutputSource::None => None,
        OutputSource::SameRow(slots) => {
            let row = sets.first().and_then(|s| s.get(0));
            let mut outputs = OutputParameters::new();
            for (name, index) in slots {
                let value = row.and_then(|r| r.get(*index)).cloned().unwrap_or_default();
                outputs.insert(name.clone(), value);
            }
            Some(outputs)
        }
        OutputSource::TrailingSelect(stmt) => {
            let cursor = db.execute(&stmt.sql, &stmt.binds).await?.into_first();
            Some(outputs_from(&cursor))
        }
        OutputSource::LastResultSet => sets.pop().map(|cursor| outputs_from(&cursor)),
    };

    let mut drained = Vec::with_capacity(plan.drains.len());
    for drain in &plan.drains {
        let name = match &drain.source {
            CursorSource::Literal(name) => name.clone(),
            CursorSource::Column(index) => sets
                .first()
                .and_then(|s| s.get(0))
                .and_then(|row| row.get(*index))
                .and_then(|v| v.as_str())
                .map(String::from)
                .ok_or_else(|| {
                    DbError::call_mismatch(
                        routine,
                        format!("no cursor name returned for parameter '{}'", drain.param),
                    )
                })?,
        };
        let quoted = db.engine().escape_identifier(&name);
        debug!(routine = %routine, cursor = %name, "Draining cursor");
        let cursor = db
            .execute(&format!("FETCH ALL FROM {}", quoted), &[])
            .await?
            .into_first();
        db.execute(&format!("CLOSE {}", quoted), &[]).await?;
        drained.push(cursor);
    }

    let mut result_sets = if plan.include_call_result {
        sets
    } else {
        Vec::new()
    };
    result_sets.extend(drained);

    if shape != CallShape::MultiResultSet && result_sets.len() > 1 {
        if shape == CallShape::SingleResultSet {
            warn!(
                routine = %routine,
                discarded = result_sets.len() - 1,
                "Single result set call produced extra result sets; keeping the first"
            );
        }
        result_sets.truncate(1);
    }
    if shape != CallShape::MultiResultSet && result_sets.is_empty() {
        result_sets.push(RowCursor::default());
    }

    Ok(ResultCollection::new(
        result_sets.into_iter().map(ResultSet::new).collect(),
        outputs,
    ))
}

/// Output parameters from the first row of a result, keyed by column name.
fn outputs_from(cursor: &RowCursor) -> OutputParameters {
    let mut outputs = OutputParameters::new();
    let row = cursor.get(0);
    for (index, column) in cursor.columns().iter().enumerate() {
        let value = row.and_then(|r| r.get(index)).cloned().unwrap_or_default();
        outputs.insert(column.name.clone(), value);
    }
    outputs
}
