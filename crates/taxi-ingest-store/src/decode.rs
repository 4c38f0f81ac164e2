use std::collections::HashSet;
use std::io::{Cursor, Read};

use bytes::Bytes;
use flate2::read::GzDecoder;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use parquet::record::reader::RowIter;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use taxi_ingest::FileFormat;

/// Storage class of a warehouse column.
///
/// Ordered from narrowest to widest; inference takes the widest class seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }

    /// Whether a column of this type can take values inferred as `incoming`.
    pub fn accepts(self, incoming: ColumnType) -> bool {
        self == incoming || (self == Self::Real && incoming == Self::Integer)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.sql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// `None` while every value loaded into the column has been null.
    pub kind: Option<ColumnType>,
}

/// Column names and inferred types of one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    pub names: Vec<String>,
    /// Inferred type per column; `None` when every value was null.
    pub kinds: Vec<Option<ColumnType>>,
    pub rows: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("csv: {0}")]
    Csv(String),

    #[error("parquet: {0}")]
    Parquet(String),

    #[error("missing header row")]
    MissingHeader,
}

enum Rows {
    Csv {
        pending: Option<csv::StringRecord>,
        records: csv::StringRecordsIntoIter<Box<dyn Read>>,
    },
    Parquet(RowIter<'static>),
}

/// Streams the rows of one object.
///
/// CSV cells come out as unparsed text, or null when empty; pass them
/// through [`coerce`] with the column's type. Parquet cells keep their
/// stored type.
pub struct ObjectReader {
    names: Vec<String>,
    rows: Rows,
}

impl ObjectReader {
    /// For CSV input the first of the `skip_leading_rows` rows names the
    /// columns; without skipped rows columns are named `string_field_{i}`.
    pub fn open(
        body: Bytes,
        format: FileFormat,
        skip_leading_rows: usize,
    ) -> Result<Self, DecodeError> {
        match format {
            FileFormat::CsvGz => {
                open_csv(Box::new(GzDecoder::new(Cursor::new(body))), skip_leading_rows)
            }
            FileFormat::Csv => open_csv(Box::new(Cursor::new(body)), skip_leading_rows),
            FileFormat::Parquet => open_parquet(body),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Infer the type of a cell this reader produced.
    fn cell_kind(&self, cell: &Value) -> Option<ColumnType> {
        match (&self.rows, cell) {
            (Rows::Csv { .. }, Value::Text(raw)) => Some(classify(raw)),
            (_, value) => value_kind(value),
        }
    }
}

impl Iterator for ObjectReader {
    type Item = Result<Vec<Value>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.rows {
            Rows::Csv { pending, records } => {
                let record = match pending.take() {
                    Some(record) => Ok(record),
                    None => records.next()?.map_err(|e| DecodeError::Csv(e.to_string())),
                };
                Some(record.map(|record| record.iter().map(raw_cell).collect()))
            }
            Rows::Parquet(rows) => Some(
                rows.next()?
                    .map(|row| {
                        row.get_column_iter()
                            .map(|(_, field)| field_value(field))
                            .collect()
                    })
                    .map_err(|e| DecodeError::Parquet(e.to_string())),
            ),
        }
    }
}

/// Read a whole object once to learn its columns and their types.
pub fn scan(
    body: Bytes,
    format: FileFormat,
    skip_leading_rows: usize,
) -> Result<Schema, DecodeError> {
    let mut reader = ObjectReader::open(body, format, skip_leading_rows)?;
    let mut kinds = vec![None; reader.names.len()];
    let mut rows = 0u64;

    while let Some(row) = reader.next() {
        let row = row?;
        for (kind, cell) in kinds.iter_mut().zip(&row) {
            *kind = (*kind).max(reader.cell_kind(cell));
        }
        rows += 1;
    }

    Ok(Schema {
        names: reader.names,
        kinds,
        rows,
    })
}

/// Convert a cell to the storage class of its column. Text that does not
/// parse as the column's type is kept as text.
pub fn coerce(cell: Value, kind: Option<ColumnType>) -> Value {
    match (cell, kind) {
        (Value::Text(raw), Some(ColumnType::Integer)) => raw
            .parse()
            .map(Value::Integer)
            .unwrap_or(Value::Text(raw)),
        (Value::Text(raw), Some(ColumnType::Real)) => {
            raw.parse().map(Value::Real).unwrap_or(Value::Text(raw))
        }
        (Value::Integer(n), Some(ColumnType::Real)) => Value::Real(n as f64),
        (cell, _) => cell,
    }
}

fn open_csv(input: Box<dyn Read>, skip_leading_rows: usize) -> Result<ObjectReader, DecodeError> {
    let csv_error = |e: csv::Error| DecodeError::Csv(e.to_string());
    let mut records = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(input)
        .into_records();

    let mut header = None;
    for i in 0..skip_leading_rows {
        match records.next() {
            Some(record) => {
                let record = record.map_err(csv_error)?;
                if i == 0 {
                    header = Some(record);
                }
            }
            None => break,
        }
    }

    let (names, pending) = match (header, skip_leading_rows) {
        (Some(header), _) => (sanitize_names(header.iter()), None),
        (None, 0) => {
            let first = records.next().transpose().map_err(csv_error)?;
            let width = first.as_ref().map_or(0, |r| r.len());
            let names = (0..width).map(|i| format!("string_field_{i}")).collect();
            (names, first)
        }
        (None, _) => return Err(DecodeError::MissingHeader),
    };

    Ok(ObjectReader {
        names,
        rows: Rows::Csv { pending, records },
    })
}

fn open_parquet(body: Bytes) -> Result<ObjectReader, DecodeError> {
    let reader =
        SerializedFileReader::new(body).map_err(|e| DecodeError::Parquet(e.to_string()))?;

    let fields = reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .root_schema()
        .get_fields()
        .iter()
        .map(|f| f.name().to_owned())
        .collect::<Vec<_>>();

    Ok(ObjectReader {
        names: sanitize_names(fields.iter().map(String::as_str)),
        rows: Rows::Parquet(RowIter::from_file_into(Box::new(reader))),
    })
}

fn raw_cell(raw: &str) -> Value {
    if raw.is_empty() {
        Value::Null
    } else {
        Value::Text(raw.to_owned())
    }
}

fn classify(raw: &str) -> ColumnType {
    if raw.parse::<i64>().is_ok() {
        ColumnType::Integer
    } else if raw.parse::<f64>().is_ok_and(f64::is_finite) {
        ColumnType::Real
    } else {
        ColumnType::Text
    }
}

fn field_value(field: &Field) -> Value {
    match field {
        Field::Null => Value::Null,
        Field::Bool(b) => Value::Integer(i64::from(*b)),
        Field::Byte(n) => Value::Integer(i64::from(*n)),
        Field::Short(n) => Value::Integer(i64::from(*n)),
        Field::Int(n) => Value::Integer(i64::from(*n)),
        Field::Long(n) => Value::Integer(*n),
        Field::UByte(n) => Value::Integer(i64::from(*n)),
        Field::UShort(n) => Value::Integer(i64::from(*n)),
        Field::UInt(n) => Value::Integer(i64::from(*n)),
        Field::ULong(n) => i64::try_from(*n)
            .map(Value::Integer)
            .unwrap_or(Value::Real(*n as f64)),
        Field::Float(n) => Value::Real(f64::from(*n)),
        Field::Double(n) => Value::Real(*n),
        Field::Str(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn value_kind(value: &Value) -> Option<ColumnType> {
    match value {
        Value::Null => None,
        Value::Integer(_) => Some(ColumnType::Integer),
        Value::Real(_) => Some(ColumnType::Real),
        Value::Text(_) | Value::Blob(_) => Some(ColumnType::Text),
    }
}

/// Make header cells usable as column names.
///
/// Non-alphanumeric characters become `_`, a leading digit gets a `_`
/// prefix, blanks fall back to `string_field_{i}` and case-insensitive
/// duplicates get a numeric suffix.
pub fn sanitize_names<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();

    raw.enumerate()
        .map(|(i, cell)| {
            let mut name: String = cell
                .trim_start_matches('\u{feff}')
                .trim()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
                .collect();

            if name.is_empty() {
                name = format!("string_field_{i}");
            } else if name.starts_with(|c: char| c.is_ascii_digit()) {
                name.insert(0, '_');
            }

            let base = name.clone();
            let mut n = 1;
            while !seen.insert(name.to_ascii_lowercase()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            name
        })
        .collect()
}
