//! MySQL / MariaDB: `CALL` with positional binds.
//!
//! OUT and INOUT parameters travel through session variables. They are only
//! readable once every result of the `CALL` has been consumed, so the
//! trailing `SELECT @_<ordinal>_x` runs as a separate statement after the
//! call.

use super::{CallPlan, OutputSource, RoutineCall, Statement};
use crate::error::{DbError, DbResult};
use crate::models::{CallShape, Direction, Engine, ParamKind};

pub(super) fn plan(call: &RoutineCall) -> DbResult<CallPlan> {
    let engine = Engine::MySQL;
    let routine = call.signature.qualified_name();

    if let Some(param) = call.params.iter().find(|p| !matches!(p.kind, ParamKind::Scalar(_))) {
        return Err(DbError::call_mismatch(
            routine,
            format!("parameter '{}' is not a scalar value", param.name),
        ));
    }

    if call.shape == CallShape::Scalar {
        if call.params.iter().any(|p| p.direction.is_output()) {
            return Err(DbError::call_mismatch(
                routine,
                "scalar functions cannot return OUT parameters",
            ));
        }
        let placeholders = vec!["?"; call.params.len()].join(", ");
        let binds = call.params.iter().map(|p| p.value().clone()).collect();
        return Ok(CallPlan::new(Statement::with_binds(
            format!("SELECT {}({}) AS result", routine, placeholders),
            binds,
        )));
    }

    let mut setup = Vec::new();
    let mut args = Vec::new();
    let mut binds = Vec::new();
    let mut selected = Vec::new();

    for (index, param) in call.params.iter().enumerate() {
        if param.direction == Direction::In {
            args.push("?".to_string());
            binds.push(param.value().clone());
            continue;
        }
        let var = session_variable(index + 1, &param.name);
        if param.direction == Direction::InOut {
            setup.push(Statement::with_binds(
                format!("SET {} = ?", var),
                vec![param.value().clone()],
            ));
        }
        selected.push(format!("{} AS {}", var, engine.escape_identifier(&param.name)));
        args.push(var);
    }

    let mut plan = CallPlan::new(Statement::with_binds(
        format!("CALL {}({})", routine, args.join(", ")),
        binds,
    ));
    plan.setup = setup;
    plan.status_segment = true;
    if !selected.is_empty() {
        plan.outputs =
            OutputSource::TrailingSelect(Statement::new(format!("SELECT {}", selected.join(", "))));
    }
    Ok(plan)
}

/// Session variable for the parameter at `ordinal`. The ordinal keeps names
/// that only differ in non-ASCII characters apart.
fn session_variable(ordinal: usize, name: &str) -> String {
    let clean: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    format!("@_{}_{}", ordinal, clean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeclaredParam, Param, RoutineKind, RoutineSignature, Value};

    fn signature() -> RoutineSignature {
        RoutineSignature::new(
            "close_invoice",
            RoutineKind::Procedure,
            vec![
                DeclaredParam::new("number", "int", Direction::In, 1),
                DeclaredParam::new("total", "decimal", Direction::Out, 2),
                DeclaredParam::new("counter", "int", Direction::InOut, 3),
            ],
        )
    }

    #[test]
    fn test_call_with_session_variables() {
        let call = RoutineCall::bind(
            Engine::MySQL,
            &signature(),
            CallShape::MultiResultSet,
            vec![Param::input(100), Param::output(), Param::inout(5)],
        )
        .unwrap();
        let plan = call.plan().unwrap();

        assert_eq!(plan.setup.len(), 1);
        assert_eq!(plan.setup[0].sql, "SET @_3_counter = ?");
        assert_eq!(plan.setup[0].binds, vec![Value::Int(5)]);
        assert_eq!(plan.call.sql, "CALL close_invoice(?, @_2_total, @_3_counter)");
        assert_eq!(plan.call.binds, vec![Value::Int(100)]);
        assert!(plan.status_segment);
        assert_eq!(
            plan.outputs,
            OutputSource::TrailingSelect(Statement::new(
                "SELECT @_2_total AS `total`, @_3_counter AS `counter`"
            ))
        );
        let order: Vec<&str> = plan.statements().map(|s| s.sql.as_str()).collect();
        assert_eq!(order.len(), 3);
        assert!(order[2].starts_with("SELECT @_2_total"));
    }

    #[test]
    fn test_session_variables_stay_distinct_for_non_ascii_names() {
        let sig = RoutineSignature::new(
            "fiscal_close",
            RoutineKind::Procedure,
            vec![
                DeclaredParam::new("año", "int", Direction::Out, 1),
                DeclaredParam::new("ao", "int", Direction::Out, 2),
            ],
        );
        let plan = RoutineCall::bind(
            Engine::MySQL,
            &sig,
            CallShape::SingleResultSet,
            vec![Param::output(), Param::output()],
        )
        .unwrap()
        .plan()
        .unwrap();
        assert_eq!(plan.call.sql, "CALL fiscal_close(@_1_ao, @_2_ao)");
        assert_eq!(
            plan.outputs,
            OutputSource::TrailingSelect(Statement::new(
                "SELECT @_1_ao AS `año`, @_2_ao AS `ao`"
            ))
        );
    }

    #[test]
    fn test_scalar_function() {
        let sig = RoutineSignature::new(
            "tax_rate",
            RoutineKind::Function,
            vec![DeclaredParam::new("region", "varchar", Direction::In, 1)],
        );
        let plan = RoutineCall::bind(
            Engine::MySQL,
            &sig,
            CallShape::Scalar,
            vec![Param::input("EU")],
        )
        .unwrap()
        .plan()
        .unwrap();
        assert_eq!(plan.call.sql, "SELECT tax_rate(?) AS result");
        assert_eq!(plan.call.binds, vec![Value::Text("EU".into())]);
        assert_eq!(plan.outputs, OutputSource::None);
    }

    #[test]
    fn test_scalar_with_out_is_mismatch() {
        let call = RoutineCall::bind(
            Engine::MySQL,
            &signature(),
            CallShape::Scalar,
            vec![Param::input(1), Param::output(), Param::inout(1)],
        )
        .unwrap();
        let err = call.plan().unwrap_err();
        assert_eq!(err.status(), crate::error::OperationStatus::CallMismatch);
    }
}
