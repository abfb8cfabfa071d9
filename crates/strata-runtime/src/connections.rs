//! Store connections
//!
//! Stages never construct clients themselves; they receive handles opened
//! here from the shared configuration.

use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use std::fmt;
use strata_core::PipelineConfig;
use strata_core::schema::quote_ident;
use url::Url;

use crate::error::{Error, Result};
use crate::store::MongoStore;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;
const DEFAULT_DATABASE: &str = "pokemon";

/// Database used to create the target database when it is missing
const MAINTENANCE_DATABASE: &str = "postgres";

/// PostgreSQL `duplicate_database`
const DUPLICATE_DATABASE: &str = "42P04";

/// PostgreSQL `invalid_catalog_name`, raised when the target database is absent
const UNKNOWN_DATABASE: &str = "3D000";

/// Components of a `postgres://` connection URL
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseUrl {
    /// Login user; empty when the URL has none
    pub user: String,
    /// Login password
    pub password: Option<String>,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Target database
    pub database: String,
}

impl DatabaseUrl {
    /// Parse a connection URL, percent-decoding the credentials.
    ///
    /// Missing parts fall back to `localhost`, `5432` and `pokemon`.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |message: String| {
            Error::Core(strata_core::Error::ConfigInvalid {
                message: format!("DATABASE_URL {}", message),
            })
        };

        let url = Url::parse(raw).map_err(|e| invalid(format!("is not a valid URL: {}", e)))?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(invalid(format!(
                "must use the postgres:// scheme, got '{}'",
                url.scheme()
            )));
        }

        let decode = |s: &str| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .map_err(|e| invalid(format!("has invalid percent-encoding: {}", e)))
        };

        let database = url.path().trim_start_matches('/');
        Ok(Self {
            user: decode(url.username())?,
            password: url.password().map(decode).transpose()?,
            host: url
                .host_str()
                .filter(|h| !h.is_empty())
                .unwrap_or(DEFAULT_HOST)
                .to_string(),
            port: url.port().unwrap_or(DEFAULT_PORT),
            database: if database.is_empty() {
                DEFAULT_DATABASE.to_string()
            } else {
                decode(database)?
            },
        })
    }

    /// Options for connecting to the target database
    pub fn connect_options(&self) -> PgConnectOptions {
        self.options_for(&self.database)
    }

    fn options_for(&self, database: &str) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(database);
        if !self.user.is_empty() {
            options = options.username(&self.user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        options
    }
}

/// Renders the URL without the password
impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "postgres://")?;
        if !self.user.is_empty() {
            write!(f, "{}@", self.user)?;
        }
        write!(f, "{}:{}/{}", self.host, self.port, self.database)
    }
}

impl fmt::Debug for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatabaseUrl({})", self)
    }
}

/// Open the document store collection for a pipeline run
pub async fn document_store(config: &PipelineConfig, collection: &str) -> Result<MongoStore> {
    MongoStore::connect(&config.mongo_uri, &config.mongo_db, collection).await
}

/// Open a connection to the target database, creating the database first if
/// it does not exist.
pub async fn relational_store(config: &PipelineConfig) -> Result<PgConnection> {
    let url = DatabaseUrl::parse(&config.database_url)?;

    let conn = match PgConnection::connect_with(&url.connect_options()).await {
        Ok(conn) => conn,
        Err(e) if is_unknown_database(&e) => {
            create_database(&url).await?;
            PgConnection::connect_with(&url.connect_options())
                .await
                .map_err(|e| Error::connection(url.to_string(), e))?
        }
        Err(e) => return Err(Error::connection(url.to_string(), e)),
    };
    tracing::debug!("Connected to {}", url);
    Ok(conn)
}

/// Make sure the target database exists.
///
/// The target is tried first; only when the server reports it missing is the
/// maintenance database used to create it. A concurrent creation by another
/// process is not an error.
pub async fn ensure_database(url: &DatabaseUrl) -> Result<()> {
    match PgConnection::connect_with(&url.connect_options()).await {
        Ok(conn) => {
            conn.close().await?;
            Ok(())
        }
        Err(e) if is_unknown_database(&e) => create_database(url).await,
        Err(e) => Err(Error::connection(url.to_string(), e)),
    }
}

fn is_unknown_database(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(e) if e.code().as_deref() == Some(UNKNOWN_DATABASE))
}

async fn create_database(url: &DatabaseUrl) -> Result<()> {
    tracing::debug!("Database '{}' not found, creating it", url.database);
    let mut admin = PgConnection::connect_with(&url.options_for(MAINTENANCE_DATABASE))
        .await
        .map_err(|e| {
            Error::connection(
                format!("postgres://{}:{}/{}", url.host, url.port, MAINTENANCE_DATABASE),
                e,
            )
        })?;

    let created = create_if_missing(&mut admin, &url.database).await;
    admin.close().await?;

    if created? {
        tracing::info!("Created database '{}'", url.database);
    }
    Ok(())
}

async fn create_if_missing(admin: &mut PgConnection, database: &str) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(database)
            .fetch_one(&mut *admin)
            .await?;
    if exists {
        return Ok(false);
    }

    let statement = format!("CREATE DATABASE {}", quote_ident(database));
    match sqlx::query(&statement).execute(&mut *admin).await {
        Ok(_) => Ok(true),
        Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(DUPLICATE_DATABASE) => {
            tracing::debug!("Database '{}' was created concurrently", database);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
