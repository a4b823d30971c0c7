//! Destination database variants and connection descriptors
//!
//! The set of destinations is closed: each one is a static [`DriverSpec`]
//! (driver name, JDBC driver class, URL template, credential escaping)
//! selected by the [`Destination`] tag.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::error::LoaderError;

/// Static description of one destination driver
pub struct DriverSpec {
    /// Scheme used in JDBC URLs, e.g. `clickhouse`
    pub name: &'static str,
    pub jdbc_class: &'static str,
    pub default_port: u16,
    /// Placeholders: `{driver}`, `{host}`, `{port}`, `{database}`, `{user}`, `{password}`
    pub url_template: &'static str,
    /// Applied to user and password before they are embedded in a URL
    pub escape_credential: for<'a> fn(&'a str) -> Cow<'a, str>,
}

fn percent_encode(raw: &str) -> Cow<'_, str> {
    urlencoding::encode(raw)
}

static CLICKHOUSE: DriverSpec = DriverSpec {
    name: "clickhouse",
    jdbc_class: "com.clickhouse.jdbc.ClickHouseDriver",
    default_port: 8123,
    url_template: "jdbc:{driver}://{host}:{port}/{database}?user={user}&password={password}",
    escape_credential: percent_encode,
};

static POSTGRES: DriverSpec = DriverSpec {
    name: "postgresql",
    jdbc_class: "org.postgresql.Driver",
    default_port: 5432,
    url_template: "jdbc:{driver}://{host}:{port}/{database}?user={user}&password={password}",
    escape_credential: percent_encode,
};

static MYSQL: DriverSpec = DriverSpec {
    name: "mysql",
    jdbc_class: "com.mysql.cj.jdbc.Driver",
    default_port: 3306,
    url_template: "jdbc:{driver}://{host}:{port}/{database}?user={user}&password={password}",
    escape_credential: percent_encode,
};

/// Supported destination databases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    #[default]
    ClickHouse,
    Postgres,
    MySql,
}

impl Destination {
    pub fn spec(&self) -> &'static DriverSpec {
        match self {
            Destination::ClickHouse => &CLICKHOUSE,
            Destination::Postgres => &POSTGRES,
            Destination::MySql => &MYSQL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.spec().name
    }
}

impl std::str::FromStr for Destination {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clickhouse" => Ok(Destination::ClickHouse),
            "postgres" | "postgresql" => Ok(Destination::Postgres),
            "mysql" => Ok(Destination::MySql),
            other => Err(LoaderError::Config(format!("Unsupported destination: {}", other))),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination connection parameters
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub destination: Destination,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

// Keeps the password out of logs.
impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("destination", &self.destination)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectionParams {
    /// JDBC-style URL with escaped credentials
    pub fn jdbc_url(&self) -> String {
        let spec = self.destination.spec();
        let escape = spec.escape_credential;

        spec.url_template
            .replace("{driver}", spec.name)
            .replace("{host}", &self.host)
            .replace("{port}", &self.port.to_string())
            .replace("{database}", &self.database)
            .replace("{user}", &escape(&self.user))
            .replace("{password}", &escape(&self.password))
    }

    /// Same URL with the password masked, safe to log
    pub fn redacted_jdbc_url(&self) -> String {
        Self {
            password: "***".to_string(),
            ..self.clone()
        }
        .jdbc_url()
    }

    /// Base URL of the ClickHouse HTTP interface
    pub fn http_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }

    /// `postgres://` connection string for sqlx
    pub fn postgres_url(&self) -> String {
        let escape = self.destination.spec().escape_credential;
        format!(
            "postgres://{}:{}@{}:{}/{}",
            escape(&self.user),
            escape(&self.password),
            self.host,
            self.port,
            self.database
        )
    }
}
