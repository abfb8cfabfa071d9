//! Load stage: intermediate CSV to relational table

use sqlx::{Connection, PgConnection, Postgres, QueryBuilder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use strata_core::SqlValue;
use strata_core::TableSchema;
use strata_core::table_file::TableFile;

use crate::error::{Error, Result};

/// PostgreSQL accepts at most this many bind parameters per statement
const MAX_BIND_PARAMS: usize = 65_535;

/// Upserts the intermediate file into the target table
pub struct Loader<'a> {
    table: &'a TableSchema,
    input: PathBuf,
}

impl<'a> Loader<'a> {
    /// Create a loader reading `input` into `table`
    pub fn new(table: &'a TableSchema, input: PathBuf) -> Self {
        Self { table, input }
    }

    /// Ensure the schema, then upsert every row in a single transaction.
    ///
    /// Returns the number of distinct rows written. Any failure rolls the
    /// whole batch back.
    pub async fn load(&self, conn: &mut PgConnection) -> Result<usize> {
        let migrated = ensure_schema(conn, self.table).await?;
        if !migrated.is_empty() {
            tracing::info!(
                "Migrated columns of table '{}': {}",
                self.table.name,
                migrated.join(", ")
            );
        }

        tracing::info!("Starting load: reading {}", self.input.display());
        let rows = read_rows(&self.input, self.table)?;
        let count = upsert_rows(conn, self.table, &rows).await?;

        tracing::info!(
            "Load done. Upserted {} records into table '{}'",
            count,
            self.table.name
        );
        Ok(count)
    }
}

/// Create the table when absent and convert columns whose live type differs
/// from the declared one.
///
/// Runs in its own transaction. Returns the names of migrated columns.
pub async fn ensure_schema(conn: &mut PgConnection, table: &TableSchema) -> Result<Vec<String>> {
    let mut tx = conn.begin().await?;

    sqlx::query(&table.create_table_sql()).execute(&mut *tx).await?;

    let live: HashMap<String, String> = sqlx::query_as::<_, (String, String)>(
        "SELECT column_name::text, data_type::text \
         FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1",
    )
    .bind(&table.name)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .collect();

    let mut migrated = Vec::new();
    for column in &table.columns {
        let Some(actual) = live.get(&column.name) else {
            tracing::warn!(
                "Column '{}' is missing from table '{}'",
                column.name,
                table.name
            );
            continue;
        };

        let expected = column.column_type.data_type();
        if actual.eq_ignore_ascii_case(expected) {
            continue;
        }

        if !column.column_type.can_migrate_from(actual) {
            return Err(Error::SchemaMismatch {
                table: table.name.clone(),
                column: column.name.clone(),
                expected: column.column_type.to_string(),
                actual: actual.clone(),
            });
        }

        tracing::debug!(
            "Altering {}.{} from {} to {}",
            table.name,
            column.name,
            actual,
            column.column_type
        );
        sqlx::query(&table.alter_column_sql(column))
            .execute(&mut *tx)
            .await?;
        migrated.push(column.name.clone());
    }

    tx.commit().await?;
    Ok(migrated)
}

/// Read and coerce the intermediate file.
///
/// Rows sharing a primary key collapse to the last one, kept at the position
/// of the first.
pub fn read_rows(path: &Path, table: &TableSchema) -> Result<Vec<Vec<SqlValue>>> {
    if !path.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!(
                "intermediate file {} not found; run the transform stage first",
                path.display()
            ),
        )));
    }

    let file = TableFile::read(path)?;
    for column in &table.columns {
        if !file.has_column(&column.name) {
            tracing::warn!(
                "{} has no '{}' column; loading it as empty",
                path.display(),
                column.name
            );
        }
    }

    if file.is_empty() {
        tracing::warn!("{} has no data rows", path.display());
        return Ok(Vec::new());
    }

    let key_index = table.columns.iter().position(|c| c.primary_key);
    let mut rows: Vec<Vec<SqlValue>> = Vec::with_capacity(file.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut duplicates = 0;

    // line 1 is the header
    for (i, row) in file.rows().enumerate() {
        let values = table.parse_row(i + 2, |name| row.get(name))?;

        let Some(key_index) = key_index else {
            rows.push(values);
            continue;
        };
        let key = format!("{:?}", values[key_index]);
        match positions.get(&key) {
            Some(&pos) => {
                rows[pos] = values;
                duplicates += 1;
            }
            None => {
                positions.insert(key, rows.len());
                rows.push(values);
            }
        }
    }

    if duplicates > 0 {
        tracing::warn!(
            "{} duplicate primary keys in {}; the last occurrence wins",
            duplicates,
            path.display()
        );
    }
    Ok(rows)
}

/// Rows per `INSERT` so that no statement exceeds the bind parameter limit
pub fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// Upsert `rows` (in column order) in one transaction
pub async fn upsert_rows(
    conn: &mut PgConnection,
    table: &TableSchema,
    rows: &[Vec<SqlValue>],
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut tx = conn.begin().await?;
    let prefix = table.insert_prefix();
    let conflict = table.conflict_clause();

    for chunk in rows.chunks(rows_per_statement(table.columns.len())) {
        let mut query = QueryBuilder::<Postgres>::new(&prefix);
        query.push_values(chunk, |mut b, row| {
            for value in row {
                match value {
                    SqlValue::Int(v) => b.push_bind(v),
                    SqlValue::BigInt(v) => b.push_bind(v),
                    SqlValue::Decimal(v) => b.push_bind(v),
                    SqlValue::Text(v) => b.push_bind(v),
                    SqlValue::Date(v) => b.push_bind(v),
                };
            }
        });
        query.push(&conflict);
        query.build().execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::DatasetSpec;
    use tempfile::TempDir;

    fn pokemon_table() -> TableSchema {
        DatasetSpec::resolve("pokemon").unwrap().table
    }

    fn write(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("pokemon.csv");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_read_rows_coerces_in_column_order() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "id,name,height,weight,base_experience,primary_type,types,abilities\n\
             25,Pikachu,4,60,112.0,electric,electric,\"static,lightning-rod\"\n",
        );

        let rows = read_rows(&path, &pokemon_table()).unwrap();
        assert_eq!(
            rows,
            vec![vec![
                SqlValue::Int(Some(25)),
                SqlValue::Text(Some("Pikachu".to_string())),
                SqlValue::Decimal(Some(4.0)),
                SqlValue::Decimal(Some(60.0)),
                SqlValue::Int(Some(112)),
                SqlValue::Text(Some("electric".to_string())),
                SqlValue::Text(Some("electric".to_string())),
                SqlValue::Text(Some("static,lightning-rod".to_string())),
            ]]
        );
    }

    #[test]
    fn test_read_rows_blank_cells_are_null() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "id,name,height\n7,Squirtle,\n");

        let rows = read_rows(&path, &pokemon_table()).unwrap();
        assert_eq!(rows[0][2], SqlValue::Decimal(None));
        // absent from the header
        assert_eq!(rows[0][7], SqlValue::Text(None));
    }

    #[test]
    fn test_duplicate_keys_last_wins_first_position() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "id,name\n1,A\n2,B\n1,C\n");

        let rows = read_rows(&path, &pokemon_table()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], SqlValue::Int(Some(1)));
        assert_eq!(rows[0][1], SqlValue::Text(Some("C".to_string())));
        assert_eq!(rows[1][1], SqlValue::Text(Some("B".to_string())));
    }

    #[test]
    fn test_missing_key_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "id,name\n1,A\n,B\n");

        let err = read_rows(&path, &pokemon_table()).unwrap_err();
        assert!(matches!(
            err,
            Error::Core(strata_core::Error::MissingKey { line: 3, .. })
        ));
    }

    #[test]
    fn test_missing_file_mentions_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.csv");

        let err = read_rows(&path, &pokemon_table()).unwrap_err();
        assert!(err.to_string().contains("absent.csv"));
    }

    #[test]
    fn test_header_only_file_has_no_rows() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "id,name\n");
        assert!(read_rows(&path, &pokemon_table()).unwrap().is_empty());
    }

    #[test]
    fn test_rows_per_statement_stays_under_limit() {
        assert_eq!(rows_per_statement(8), 8191);
        assert!(rows_per_statement(8) * 8 <= MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(0), MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(100_000), 1);
    }
}
