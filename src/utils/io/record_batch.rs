//! Conversion of results and resolved rows into Arrow record batches

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray, UInt64Array,
};
use arrow::datatypes::{DataType, Date32Type, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;

use crate::algorithm::measure::CohortResult;
use crate::error::Result;
use crate::models::{ResolvedRow, RowSchema, Value, ValueType};
use crate::study::PATIENT_ID;

/// Name of the ratio column in measure output
pub const VALUE_COLUMN: &str = "value";

/// Name of the index date column in measure output
pub const DATE_COLUMN: &str = "date";

/// Arrow schema of a measure's output
///
/// Columns: group-by dimensions, numerator, denominator, `value`, `date`.
#[must_use]
pub fn measure_schema(result: &CohortResult) -> Schema {
    let mut fields: Vec<Field> = result
        .group_by
        .iter()
        .map(|name| Field::new(name, DataType::Utf8, true))
        .collect();
    fields.push(Field::new(&result.numerator, DataType::UInt64, true));
    fields.push(Field::new(&result.denominator, DataType::UInt64, true));
    fields.push(Field::new(VALUE_COLUMN, DataType::Float64, true));
    fields.push(Field::new(DATE_COLUMN, DataType::Date32, false));
    Schema::new(fields)
}

/// Convert one measure result into a record batch
///
/// Undefined and suppressed ratios become nulls, as do redacted counts.
///
/// # Errors
/// Returns an error if Arrow rejects the assembled columns
pub fn result_to_record_batch(result: &CohortResult) -> Result<RecordBatch> {
    let mut columns: Vec<ArrayRef> = (0..result.group_by.len())
        .map(|dimension| {
            let values: Vec<Option<&str>> = result
                .rows
                .iter()
                .map(|row| row.key.get(dimension).map(String::as_str))
                .collect();
            Arc::new(StringArray::from(values)) as ArrayRef
        })
        .collect();

    let numerators: Vec<Option<u64>> = result.rows.iter().map(|row| row.numerator).collect();
    let denominators: Vec<Option<u64>> = result.rows.iter().map(|row| row.denominator).collect();
    let ratios: Vec<Option<f64>> = result.rows.iter().map(|row| row.ratio.value()).collect();
    let dates = vec![date32(result.index_date); result.rows.len()];

    columns.push(Arc::new(UInt64Array::from(numerators)));
    columns.push(Arc::new(UInt64Array::from(denominators)));
    columns.push(Arc::new(Float64Array::from(ratios)));
    columns.push(Arc::new(Date32Array::from(dates)));

    Ok(RecordBatch::try_new(Arc::new(measure_schema(result)), columns)?)
}

/// Arrow schema of a per-patient extract
#[must_use]
pub fn extract_schema(schema: &RowSchema) -> Schema {
    let mut fields = vec![Field::new(PATIENT_ID, DataType::Utf8, false)];
    fields.extend(schema.names().iter().enumerate().map(|(slot, name)| {
        let data_type = match schema.value_type(slot) {
            Some(ValueType::Bool) => DataType::Boolean,
            Some(ValueType::Int) => DataType::Int64,
            Some(ValueType::Float) => DataType::Float64,
            Some(ValueType::Date) => DataType::Date32,
            Some(ValueType::Str) | None => DataType::Utf8,
        };
        Field::new(name, data_type, true)
    }));
    Schema::new(fields)
}

/// Convert resolved rows into a record batch, one row per patient
///
/// Values whose type differs from the declared column type are written as
/// text in string columns and as nulls elsewhere.
///
/// # Errors
/// Returns an error if Arrow rejects the assembled columns
pub fn extract_to_record_batch(schema: &RowSchema, rows: &[ResolvedRow]) -> Result<RecordBatch> {
    let ids: Vec<&str> = rows.iter().map(ResolvedRow::patient_id).collect();
    let mut columns: Vec<ArrayRef> = vec![Arc::new(StringArray::from(ids))];

    for slot in 0..schema.len() {
        let cells = rows.iter().map(|row| row.value_at(slot));
        let column: ArrayRef = match schema.value_type(slot) {
            Some(ValueType::Bool) => Arc::new(
                cells
                    .map(|cell| match cell {
                        Some(Value::Bool(flag)) => Some(*flag),
                        _ => None,
                    })
                    .collect::<BooleanArray>(),
            ),
            Some(ValueType::Int) => Arc::new(cells.map(|cell| cell.and_then(Value::as_int)).collect::<Int64Array>()),
            Some(ValueType::Float) => Arc::new(
                cells
                    .map(|cell| match cell {
                        Some(Value::Float(number)) => Some(*number),
                        Some(Value::Int(number)) => Some(*number as f64),
                        _ => None,
                    })
                    .collect::<Float64Array>(),
            ),
            Some(ValueType::Date) => Arc::new(
                cells
                    .map(|cell| cell.and_then(Value::as_date).map(date32))
                    .collect::<Date32Array>(),
            ),
            Some(ValueType::Str) | None => Arc::new(
                cells
                    .map(|cell| cell.map(ToString::to_string))
                    .collect::<StringArray>(),
            ),
        };
        columns.push(column);
    }

    Ok(RecordBatch::try_new(Arc::new(extract_schema(schema)), columns)?)
}

fn date32(date: NaiveDate) -> i32 {
    Date32Type::from_naive_date(date)
}
