//! Record transformation
//!
//! Pure mapping from raw records to [`TransformedRecord`]s, one output per
//! input, same order. The price markup is computed in `f64` and truncated
//! toward zero, so the same input always yields the same stored price and
//! reprocessing an object is idempotent.

use etl_common::types::TransformedRecord;
use serde_json::Value;

use crate::error::ValidationError;
use crate::fetcher::RawRecord;

/// Price multiplier applied to every record
pub const MARKUP: f64 = 1.1;

pub fn transform(records: &[RawRecord]) -> Result<Vec<TransformedRecord>, ValidationError> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| transform_record(index, record))
        .collect()
}

pub fn transform_record(
    index: usize,
    record: &RawRecord,
) -> Result<TransformedRecord, ValidationError> {
    let id = integer_field(index, record, "id")?;
    let name = name_field(index, record)?;
    let price = integer_field(index, record, "price")?;

    Ok(TransformedRecord {
        id,
        name,
        price: apply_markup(price).ok_or(ValidationError::PriceOverflow { index, price })?,
    })
}

/// `price * 1.1` truncated toward zero; `None` when the result does not fit
/// in an `i64`.
pub fn apply_markup(price: i64) -> Option<i64> {
    let marked = (price as f64 * MARKUP).trunc();
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range
    if marked.is_finite() && marked >= i64::MIN as f64 && marked < i64::MAX as f64 {
        Some(marked as i64)
    } else {
        None
    }
}

fn field<'a>(
    index: usize,
    record: &'a RawRecord,
    field: &'static str,
) -> Result<&'a Value, ValidationError> {
    match record.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField { index, field }),
        Some(value) => Ok(value),
    }
}

/// Integers, floats truncated toward zero (`99.5` is 99) and decimal strings
/// (`"100"`). Strings must hold a whole number.
fn integer_field(
    index: usize,
    record: &RawRecord,
    name: &'static str,
) -> Result<i64, ValidationError> {
    let value = field(index, record, name)?;
    let not_integer = || ValidationError::NotInteger {
        index,
        field: name,
        value: value.to_string(),
    };

    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64().map(f64::trunc) {
                Some(f) if f >= i64::MIN as f64 && f < i64::MAX as f64 => Ok(f as i64),
                _ => Err(not_integer()),
            }
        },
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| not_integer()),
        _ => Err(not_integer()),
    }
}

fn name_field(index: usize, record: &RawRecord) -> Result<String, ValidationError> {
    match field(index, record, "name")? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ValidationError::InvalidName {
            index,
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_markup_truncates_toward_zero() {
        assert_eq!(apply_markup(100), Some(110));
        assert_eq!(apply_markup(99), Some(108));
        assert_eq!(apply_markup(50), Some(55));
        assert_eq!(apply_markup(1), Some(1));
        assert_eq!(apply_markup(0), Some(0));
        assert_eq!(apply_markup(-7), Some(-7));
        assert_eq!(apply_markup(-99), Some(-108));
        assert_eq!(apply_markup(i64::MAX), None);
    }

    #[test]
    fn test_transform_is_deterministic_and_preserves_order() {
        let input = vec![
            raw(json!({"id": 2, "name": "Banana", "price": 50})),
            raw(json!({"id": 1, "name": "Apple", "price": 100})),
            raw(json!({"id": 3, "name": "Cherry", "price": 99})),
        ];
        let snapshot = input.clone();

        let first = transform(&input).unwrap();
        let second = transform(&input).unwrap();

        assert_eq!(first, second);
        assert_eq!(input, snapshot);
        assert_eq!(
            first,
            vec![
                TransformedRecord { id: 2, name: "Banana".into(), price: 55 },
                TransformedRecord { id: 1, name: "Apple".into(), price: 110 },
                TransformedRecord { id: 3, name: "Cherry".into(), price: 108 },
            ]
        );
    }

    #[test]
    fn test_accepts_integer_like_values() {
        let record = transform_record(
            0,
            &raw(json!({"id": "7", "name": 42, "price": 100.0, "extra": true})),
        )
        .unwrap();
        assert_eq!(record, TransformedRecord { id: 7, name: "42".into(), price: 110 });

        let record = transform_record(0, &raw(json!({"id": " 8 ", "name": "x", "price": "99"})))
            .unwrap();
        assert_eq!(record.id, 8);
        assert_eq!(record.price, 108);
    }

    #[test]
    fn test_fractional_numbers_are_truncated() {
        let record =
            transform_record(0, &raw(json!({"id": 3.9, "name": "Apple", "price": 99.5}))).unwrap();
        assert_eq!(record, TransformedRecord { id: 3, name: "Apple".into(), price: 108 });

        let record =
            transform_record(0, &raw(json!({"id": 1, "name": "Apple", "price": -7.9}))).unwrap();
        assert_eq!(record.price, -7);
    }

    #[test]
    fn test_missing_fields() {
        for (value, missing) in [
            (json!({"name": "Apple", "price": 100}), "id"),
            (json!({"id": 1, "price": 100}), "name"),
            (json!({"id": 1, "name": "Apple"}), "price"),
            (json!({"id": 1, "name": "Apple", "price": null}), "price"),
        ] {
            let err = transform_record(4, &raw(value)).unwrap_err();
            assert_eq!(err, ValidationError::MissingField { index: 4, field: missing });
        }
    }

    #[test]
    fn test_non_integer_values_rejected() {
        for value in [
            json!({"id": 1, "name": "Apple", "price": "99.5"}),
            json!({"id": 1, "name": "Apple", "price": "cheap"}),
            json!({"id": 1, "name": "Apple", "price": true}),
            json!({"id": [1], "name": "Apple", "price": 100}),
            json!({"id": 1e300, "name": "Apple", "price": 100}),
        ] {
            let err = transform_record(0, &raw(value)).unwrap_err();
            assert!(matches!(err, ValidationError::NotInteger { .. }), "{err:?}");
        }
    }

    #[test]
    fn test_invalid_name_rejected() {
        let err = transform_record(0, &raw(json!({"id": 1, "name": {"en": "Apple"}, "price": 1})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidName { .. }));
    }

    #[test]
    fn test_first_invalid_record_fails_whole_transform() {
        let input = vec![
            raw(json!({"id": 1, "name": "Apple", "price": 100})),
            raw(json!({"id": 2, "name": "Banana"})),
        ];
        let err = transform(&input).unwrap_err();
        assert_eq!(err, ValidationError::MissingField { index: 1, field: "price" });
    }
}
