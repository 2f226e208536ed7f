//! Schema validation for product payloads.
//!
//! Runs on the raw `serde_json::Value` before deserialization so error
//! messages can name the offending field and the index of the product in a
//! list. Business rules: positive price, known category, ISO 8601 timestamps.

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};
use thiserror::Error;

pub const VALID_CATEGORIES: [&str; 5] = ["frutas", "verduras", "lacteos", "miel", "conservas"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SchemaError(pub String);

/// Validate a single product. `context` prefixes every message.
pub fn validate_product(data: &Value, context: &str) -> Result<(), SchemaError> {
    let Some(obj) = data.as_object() else {
        return Err(SchemaError(format!(
            "{context}expected a product object, got {}",
            type_name(data)
        )));
    };

    let id = required(obj, "id", context)?;
    if id.as_u64().is_none() {
        return Err(wrong_type(context, "id", "non-negative integer", id));
    }

    let nombre = required(obj, "nombre", context)?;
    if !nombre.is_string() {
        return Err(wrong_type(context, "nombre", "string", nombre));
    }

    let precio = required(obj, "precio", context)?;
    let Some(price) = precio.as_f64() else {
        return Err(wrong_type(context, "precio", "number", precio));
    };
    if price <= 0.0 {
        return Err(SchemaError(format!(
            "{context}field 'precio' must be greater than 0, got {price}"
        )));
    }

    let categoria = required(obj, "categoria", context)?;
    let Some(category) = categoria.as_str() else {
        return Err(wrong_type(context, "categoria", "string", categoria));
    };
    if !VALID_CATEGORIES.contains(&category) {
        return Err(SchemaError(format!(
            "{context}field 'categoria' has invalid value '{category}', allowed: {VALID_CATEGORIES:?}"
        )));
    }

    if let Some(v) = obj.get("disponible") {
        if !v.is_boolean() {
            return Err(wrong_type(context, "disponible", "bool", v));
        }
    }
    if let Some(v) = obj.get("descripcion") {
        if !v.is_string() {
            return Err(wrong_type(context, "descripcion", "string", v));
        }
    }
    if let Some(v) = obj.get("productor") {
        validate_producer(v, context)?;
    }
    if let Some(v) = obj.get("creado_en") {
        let Some(ts) = v.as_str() else {
            return Err(wrong_type(context, "creado_en", "string", v));
        };
        if !is_iso8601(ts) {
            return Err(SchemaError(format!(
                "{context}field 'creado_en' is not a valid ISO 8601 timestamp: '{ts}'"
            )));
        }
    }
    Ok(())
}

/// Validate a list of products, prefixing errors with `Producto[i]: `.
pub fn validate_product_list(data: &Value) -> Result<(), SchemaError> {
    let Some(items) = data.as_array() else {
        return Err(SchemaError(format!(
            "expected a list of products, got {}",
            type_name(data)
        )));
    };
    for (i, item) in items.iter().enumerate() {
        validate_product(item, &format!("Producto[{i}]: "))?;
    }
    Ok(())
}

fn validate_producer(v: &Value, context: &str) -> Result<(), SchemaError> {
    let Some(obj) = v.as_object() else {
        return Err(wrong_type(context, "productor", "object", v));
    };
    let id = required(obj, "id", &format!("{context}productor: "))?;
    if id.as_u64().is_none() {
        return Err(wrong_type(context, "productor.id", "non-negative integer", id));
    }
    let nombre = required(obj, "nombre", &format!("{context}productor: "))?;
    if !nombre.is_string() {
        return Err(wrong_type(context, "productor.nombre", "string", nombre));
    }
    Ok(())
}

/// `YYYY-MM-DDTHH:MM:SS[.fff][Z|±HH:MM]`.
fn is_iso8601(ts: &str) -> bool {
    DateTime::parse_from_rfc3339(ts).is_ok()
        || NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

fn required<'a>(obj: &'a Map<String, Value>, field: &str, context: &str) -> Result<&'a Value, SchemaError> {
    obj.get(field).ok_or_else(|| {
        SchemaError(format!("{context}required field '{field}' is missing"))
    })
}

fn wrong_type(context: &str, field: &str, expected: &str, got: &Value) -> SchemaError {
    SchemaError(format!(
        "{context}field '{field}' must be {expected}, got {}: {got}",
        type_name(got)
    ))
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "id": 1,
            "nombre": "Manzanas Orgánicas",
            "precio": 25.5,
            "categoria": "frutas",
            "productor": {"id": 7, "nombre": "Granja Sol"},
            "creado_en": "2024-01-15T10:30:00Z"
        })
    }

    #[test]
    fn accepts_complete_product() {
        assert!(validate_product(&valid(), "").is_ok());
    }

    #[test]
    fn accepts_timestamp_without_zone() {
        let mut p = valid();
        p["creado_en"] = json!("2024-01-15T10:30:00.123");
        assert!(validate_product(&p, "").is_ok());
    }

    #[test]
    fn rejects_non_positive_price() {
        let mut p = valid();
        p["precio"] = json!(-100);
        let err = validate_product(&p, "").unwrap_err();
        assert!(err.0.contains("'precio' must be greater than 0"), "{err}");
    }

    #[test]
    fn rejects_unknown_category() {
        let mut p = valid();
        p["categoria"] = json!("test");
        let err = validate_product(&p, "").unwrap_err();
        assert!(err.0.contains("invalid value 'test'"), "{err}");
    }

    #[test]
    fn rejects_missing_required_field() {
        let mut p = valid();
        p.as_object_mut().unwrap().remove("nombre");
        let err = validate_product(&p, "").unwrap_err();
        assert_eq!(err.0, "required field 'nombre' is missing");
    }

    #[test]
    fn rejects_string_id() {
        let mut p = valid();
        p["id"] = json!("1");
        assert!(validate_product(&p, "").is_err());
    }

    #[test]
    fn rejects_bad_producer_and_timestamp() {
        let mut p = valid();
        p["productor"] = json!({"id": 7});
        let err = validate_product(&p, "").unwrap_err();
        assert!(err.0.contains("productor: required field 'nombre'"), "{err}");

        let mut p = valid();
        p["creado_en"] = json!("15/01/2024");
        assert!(validate_product(&p, "").is_err());
    }

    #[test]
    fn list_errors_carry_index() {
        let mut bad = valid();
        bad["precio"] = json!(0);
        let err = validate_product_list(&json!([valid(), bad])).unwrap_err();
        assert!(err.0.starts_with("Producto[1]: "), "{err}");
    }

    #[test]
    fn list_requires_array() {
        let err = validate_product_list(&json!({"items": []})).unwrap_err();
        assert_eq!(err.0, "expected a list of products, got object");
    }
}
