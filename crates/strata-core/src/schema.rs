//! Target table schema and value coercion
//!
//! Column types are written the way PostgreSQL spells them (`integer`,
//! `numeric(5,2)`, `varchar(100)`, ...). The coercion functions here are total:
//! anything that does not parse becomes a SQL `NULL` instead of an error.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Column type of the target table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    /// 32-bit integer
    Integer,
    /// 64-bit integer
    BigInt,
    /// Fixed-point decimal
    Decimal {
        /// Total number of digits
        precision: u8,
        /// Digits after the decimal point
        scale: u8,
    },
    /// Bounded text
    Varchar(u32),
    /// Unbounded text
    Text,
    /// Calendar date (`YYYY-MM-DD`)
    Date,
}

impl ColumnType {
    /// Name reported by `information_schema.columns.data_type`
    pub fn data_type(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::BigInt => "bigint",
            Self::Decimal { .. } => "numeric",
            Self::Varchar(_) => "character varying",
            Self::Text => "text",
            Self::Date => "date",
        }
    }

    /// Whether a live column of `live_type` can be altered in place to this type
    pub fn can_migrate_from(&self, live_type: &str) -> bool {
        let live = live_type.to_ascii_lowercase();
        let allowed: &[&str] = match self {
            Self::Decimal { .. } => &["smallint", "integer", "bigint", "real", "double precision"],
            Self::BigInt => &["smallint", "integer"],
            Self::Integer => &["smallint"],
            Self::Text => &["character varying", "character"],
            Self::Date => &["text", "character varying"],
            Self::Varchar(_) => &[],
        };
        allowed.contains(&live.as_str())
    }

    /// Coerce one raw cell to a typed value
    pub fn coerce(&self, raw: Option<&str>, nullable: bool) -> SqlValue {
        match self {
            Self::Integer => SqlValue::Int(to_int(raw).and_then(|i| i32::try_from(i).ok())),
            Self::BigInt => SqlValue::BigInt(to_int(raw)),
            Self::Decimal { .. } => SqlValue::Decimal(to_float(raw)),
            Self::Varchar(_) | Self::Text => SqlValue::Text(to_text(raw, nullable)),
            Self::Date => SqlValue::Date(to_date(raw)),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("INTEGER"),
            Self::BigInt => f.write_str("BIGINT"),
            Self::Decimal { precision, scale } => write!(f, "NUMERIC({precision},{scale})"),
            Self::Varchar(n) => write!(f, "VARCHAR({n})"),
            Self::Text => f.write_str("TEXT"),
            Self::Date => f.write_str("DATE"),
        }
    }
}

impl FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(' ', "");
        let invalid = || Error::ConfigInvalid {
            message: format!("unsupported column type '{}'", s),
        };

        let (name, args) = match normalized.split_once('(') {
            Some((name, rest)) => (
                name.to_string(),
                Some(rest.strip_suffix(')').ok_or_else(invalid)?.to_string()),
            ),
            None => (normalized.clone(), None),
        };

        match (name.as_str(), args) {
            ("integer" | "int" | "int4", None) => Ok(Self::Integer),
            ("bigint" | "int8", None) => Ok(Self::BigInt),
            ("text", None) => Ok(Self::Text),
            ("date", None) => Ok(Self::Date),
            ("varchar", Some(n)) => n.parse().map(Self::Varchar).map_err(|_| invalid()),
            ("numeric" | "decimal", Some(args)) => {
                let (p, s) = args.split_once(',').ok_or_else(invalid)?;
                let precision: u8 = p.parse().map_err(|_| invalid())?;
                let scale: u8 = s.parse().map_err(|_| invalid())?;
                if precision == 0 || scale > precision {
                    return Err(invalid());
                }
                Ok(Self::Decimal { precision, scale })
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ColumnType> for String {
    fn from(t: ColumnType) -> Self {
        t.to_string().to_lowercase()
    }
}

/// A typed value ready to be bound to a statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// `INTEGER` value
    Int(Option<i32>),
    /// `BIGINT` value
    BigInt(Option<i64>),
    /// `NUMERIC` value
    Decimal(Option<f64>),
    /// `VARCHAR`/`TEXT` value
    Text(Option<String>),
    /// `DATE` value
    Date(Option<NaiveDate>),
}

impl SqlValue {
    /// True when the value is SQL `NULL`
    pub fn is_null(&self) -> bool {
        match self {
            Self::Int(v) => v.is_none(),
            Self::BigInt(v) => v.is_none(),
            Self::Decimal(v) => v.is_none(),
            Self::Text(v) => v.is_none(),
            Self::Date(v) => v.is_none(),
        }
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Integer coercion: blank is null, otherwise parse through a float and
/// truncate, so `"25.0"` becomes `25`.
pub fn to_int(raw: Option<&str>) -> Option<i64> {
    let s = non_blank(raw)?;
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    let x = s.parse::<f64>().ok().filter(|x| x.is_finite())?.trunc();
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    (x >= i64::MIN as f64 && x < i64::MAX as f64).then_some(x as i64)
}

/// Lenient float coercion; blank, unparseable and non-finite values are null
pub fn to_float(raw: Option<&str>) -> Option<f64> {
    non_blank(raw)?.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// `YYYY-MM-DD` date coercion
pub fn to_date(raw: Option<&str>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(non_blank(raw)?, "%Y-%m-%d").ok()
}

/// Text passthrough. Blank cells become null unless the column is `NOT NULL`.
pub fn to_text(raw: Option<&str>, nullable: bool) -> Option<String> {
    match raw {
        Some(s) if !s.is_empty() => Some(s.to_string()),
        _ if nullable => None,
        _ => Some(String::new()),
    }
}

fn default_nullable() -> bool {
    true
}

/// One column of the target table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    /// Column name (matches a header of the intermediate file)
    pub name: String,

    /// Column type
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Whether the column accepts `NULL`
    #[serde(default = "default_nullable")]
    pub nullable: bool,

    /// Whether this column is the primary key
    #[serde(default)]
    pub primary_key: bool,
}

/// Target table definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    /// Table name
    pub name: String,

    /// Columns in declaration order
    pub columns: Vec<ColumnSpec>,
}

/// Quote an identifier for PostgreSQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl TableSchema {
    /// The primary key column, if one is declared
    pub fn primary_key(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// `CREATE TABLE IF NOT EXISTS` statement
    pub fn create_table_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let constraint = if c.primary_key {
                    "PRIMARY KEY"
                } else if c.nullable {
                    "NULL"
                } else {
                    "NOT NULL"
                };
                format!("    {} {} {}", quote_ident(&c.name), c.column_type, constraint)
            })
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            quote_ident(&self.name),
            columns.join(",\n")
        )
    }

    /// `ALTER TABLE .. ALTER COLUMN .. TYPE` statement converting existing data
    pub fn alter_column_sql(&self, column: &ColumnSpec) -> String {
        let col = quote_ident(&column.name);
        format!(
            "ALTER TABLE {} ALTER COLUMN {col} TYPE {ty} USING {col}::{ty}",
            quote_ident(&self.name),
            ty = column.column_type,
        )
    }

    /// `INSERT INTO t (cols) ` prefix; the `VALUES` list is appended by the caller
    pub fn insert_prefix(&self) -> String {
        let names: Vec<String> = self.columns.iter().map(|c| quote_ident(&c.name)).collect();
        format!(
            "INSERT INTO {} ({}) ",
            quote_ident(&self.name),
            names.join(", ")
        )
    }

    /// `ON CONFLICT` clause overwriting every non-key column
    pub fn conflict_clause(&self) -> String {
        let Some(pk) = self.primary_key() else {
            return String::new();
        };
        let updates: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !c.primary_key)
            .map(|c| {
                let name = quote_ident(&c.name);
                format!("{name} = EXCLUDED.{name}")
            })
            .collect();

        if updates.is_empty() {
            format!(" ON CONFLICT ({}) DO NOTHING", quote_ident(&pk.name))
        } else {
            format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                quote_ident(&pk.name),
                updates.join(", ")
            )
        }
    }

    /// Coerce one row of the intermediate file into typed values, in column order.
    ///
    /// `cell` returns the raw text for a column name, or `None` when the file
    /// has no such column. `line` is used for error reporting only.
    pub fn parse_row<'a, F>(&self, line: usize, cell: F) -> Result<Vec<SqlValue>>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let values: Vec<SqlValue> = self
            .columns
            .iter()
            .map(|c| c.column_type.coerce(cell(&c.name), c.nullable))
            .collect();

        if let Some((idx, pk)) = self.columns.iter().enumerate().find(|(_, c)| c.primary_key) {
            if values[idx].is_null() {
                return Err(Error::MissingKey {
                    line,
                    column: pk.name.clone(),
                });
            }
        }
        Ok(values)
    }
}
