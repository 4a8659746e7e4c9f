use sqlx::postgres::PgRow;
use sqlx::{Column as _, Row as _, TypeInfo as _, ValueRef as _};

use crate::recordset::{Column, Recordset, Schema};
use crate::value::Value;
use crate::{RowGraphError, RowGraphResult};

impl Recordset {
    /// A recordset of fetched PostgreSQL rows, decoded by column type name.
    ///
    /// Without rows there is no column information, so the recordset is empty.
    pub fn from_pg_rows(rows: Vec<PgRow>) -> RowGraphResult<Recordset> {
        let schema = match rows.first() {
            Some(row) => Schema::new(
                row.columns()
                    .iter()
                    .map(|column| Column::new(column.name(), column.type_info().name()))
                    .collect(),
            ),
            None => return Ok(Recordset::empty()),
        };

        let values = rows
            .iter()
            .map(|row| (0..row.len()).map(|index| decode(row, index)).collect())
            .collect::<RowGraphResult<Vec<Vec<Value>>>>()?;

        Ok(Recordset::new(schema, values))
    }
}

fn decode(row: &PgRow, index: usize) -> RowGraphResult<Value> {
    let type_name = {
        let raw = row.try_get_raw(index).map_err(source)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_owned()
    };

    let value = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(index).map(Value::Bool),
        "INT2" => row.try_get::<i16, _>(index).map(Value::from),
        "INT4" => row.try_get::<i32, _>(index).map(Value::from),
        "INT8" => row.try_get::<i64, _>(index).map(Value::Int),
        "FLOAT4" => row.try_get::<f32, _>(index).map(Value::from),
        "FLOAT8" => row.try_get::<f64, _>(index).map(Value::Float),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row.try_get::<String, _>(index).map(Value::Text),
        "BYTEA" => row.try_get::<Vec<u8>, _>(index).map(Value::Bytes),
        other => {
            return Err(RowGraphError::Source(format!(
                "unsupported column type {} at column {}",
                other, index
            )))
        }
    };

    value.map_err(source)
}

fn source(error: sqlx::Error) -> RowGraphError {
    RowGraphError::Source(error.to_string())
}
