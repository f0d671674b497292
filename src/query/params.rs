//! Parameter type coercion and SQL binding.

use crate::config::model::ParamType;
use crate::error::AppError;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::Arguments;

/// Coerces a raw string (as extracted from a path segment, query string, or
/// body field) into a typed [`Value`] per the declared parameter type.
pub fn coerce(name: &str, raw: &str, param_type: ParamType) -> Result<Value, AppError> {
    match param_type {
        ParamType::Integer | ParamType::Long => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| AppError::BadRequest(format!("parameter '{name}' must be an integer"))),
        ParamType::Decimal => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| AppError::BadRequest(format!("parameter '{name}' must be a decimal"))),
        ParamType::Boolean => {
            let truthy = matches!(raw.to_ascii_lowercase().as_str(), "true" | "1" | "yes");
            Ok(Value::Bool(truthy))
        }
        ParamType::Timestamp | ParamType::String => Ok(Value::String(raw.to_string())),
    }
}

/// Binds a query's formal parameters, in declared order, onto a fresh
/// [`PgArguments`] set using the SQL type implied by each parameter's
/// declared type (STRING→VARCHAR, INTEGER→INTEGER, LONG→BIGINT,
/// DECIMAL→DECIMAL, BOOLEAN→BOOLEAN, TIMESTAMP→TIMESTAMP).
pub fn build_arguments(
    parameters: &[crate::config::model::QueryParam],
    bound: &std::collections::BTreeMap<String, Value>,
) -> Result<PgArguments, AppError> {
    let mut arguments = PgArguments::default();
    for param in parameters {
        let value = bound.get(&param.name).cloned().unwrap_or(Value::Null);
        bind_one(&mut arguments, param.param_type, &value, &param.name)?;
    }
    Ok(arguments)
}

fn bind_one(
    arguments: &mut PgArguments,
    param_type: ParamType,
    value: &Value,
    name: &str,
) -> Result<(), AppError> {
    let bind_error = |e: sqlx::error::BoxDynError| {
        AppError::ExecError {
            query_name: name.to_string(),
            cause: e.to_string(),
        }
    };
    match param_type {
        ParamType::String | ParamType::Timestamp => match value {
            Value::Null => arguments.add(Option::<String>::None).map_err(bind_error),
            Value::String(s) => arguments.add(s.clone()).map_err(bind_error),
            other => arguments.add(other.to_string()).map_err(bind_error),
        },
        ParamType::Integer => arguments
            .add(value.as_i64().map(|n| n as i32))
            .map_err(bind_error),
        ParamType::Long => arguments.add(value.as_i64()).map_err(bind_error),
        ParamType::Decimal => arguments.add(value.as_f64()).map_err(bind_error),
        ParamType::Boolean => arguments.add(value.as_bool()).map_err(bind_error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_integer_from_string() {
        assert_eq!(coerce("size", "20", ParamType::Integer).unwrap(), Value::from(20));
    }

    #[test]
    fn rejects_non_numeric_integer() {
        assert!(coerce("size", "abc", ParamType::Integer).is_err());
    }

    #[test]
    fn boolean_accepts_common_truthy_tokens() {
        assert_eq!(coerce("flag", "yes", ParamType::Boolean).unwrap(), Value::Bool(true));
        assert_eq!(coerce("flag", "1", ParamType::Boolean).unwrap(), Value::Bool(true));
        assert_eq!(coerce("flag", "nope", ParamType::Boolean).unwrap(), Value::Bool(false));
    }

    #[test]
    fn string_and_timestamp_pass_through() {
        assert_eq!(coerce("s", "hello", ParamType::String).unwrap(), Value::String("hello".to_string()));
        assert_eq!(
            coerce("t", "2024-01-01T00:00:00Z", ParamType::Timestamp).unwrap(),
            Value::String("2024-01-01T00:00:00Z".to_string())
        );
    }
}
