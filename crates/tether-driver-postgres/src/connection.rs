//! PostgreSQL connection implementation

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use native_tls::{Certificate, Identity, TlsConnector};
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{Client, NoTls};

use tether_core::{Connection, ConnectionConfig, Result, TetherError};

fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    match error.as_db_error() {
        Some(db_error) => format!(
            "{} (code: {})",
            db_error.message(),
            db_error.code().code()
        ),
        None => error.to_string(),
    }
}

fn build_pg_config(config: &ConnectionConfig) -> tokio_postgres::Config {
    let host = if config.host.is_empty() {
        "localhost".to_string()
    } else {
        config.host.clone()
    };
    let port = if config.port > 0 { config.port } else { 5432 };
    let database = config.database.clone().unwrap_or_else(|| "postgres".to_string());

    let mut pg_config = tokio_postgres::Config::new();
    pg_config.host(&host).port(port).dbname(&database);

    if let Some(user) = &config.username {
        pg_config.user(user);
    }
    if let Some(password) = &config.password {
        pg_config.password(password);
    }
    if let Some(app_name) = config.get_string("application_name") {
        pg_config.application_name(&app_name);
    }
    if let Some(timeout) = config
        .get_string("connect_timeout")
        .and_then(|t| t.parse::<u64>().ok())
    {
        pg_config.connect_timeout(Duration::from_secs(timeout));
    }

    let ssl_mode = config
        .get_string("ssl_mode")
        .unwrap_or_else(|| "prefer".to_string());
    let ssl_mode_enum = match ssl_mode.to_lowercase().as_str() {
        "disable" => tokio_postgres::config::SslMode::Disable,
        "allow" | "prefer" => tokio_postgres::config::SslMode::Prefer,
        "require" | "verify-ca" | "verify_ca" | "verify-full" | "verify_full" => {
            tokio_postgres::config::SslMode::Require
        }
        _ => tokio_postgres::config::SslMode::Prefer,
    };
    pg_config.ssl_mode(ssl_mode_enum);

    pg_config
}

fn build_tls_connector(ssl_mode: &str, config: &ConnectionConfig) -> Result<MakeTlsConnector> {
    let ca_cert_path = config.get_string("ssl_ca_cert").filter(|p| !p.is_empty());
    let client_cert_path = config
        .get_string("ssl_client_cert")
        .filter(|p| !p.is_empty());
    let client_key_path = config
        .get_string("ssl_client_key")
        .filter(|p| !p.is_empty());

    let mut tls_builder = TlsConnector::builder();

    if let Some(path) = &ca_cert_path {
        let ca_cert_data = fs::read(path).map_err(|e| {
            TetherError::Configuration(format!("failed to read CA certificate: {}", e))
        })?;
        let ca_cert = Certificate::from_pem(&ca_cert_data).map_err(|e| {
            TetherError::Configuration(format!("failed to parse CA certificate: {}", e))
        })?;
        tls_builder.add_root_certificate(ca_cert);
    }

    if let (Some(cert_path), Some(key_path)) = (&client_cert_path, &client_key_path) {
        let cert_data = fs::read(cert_path).map_err(|e| {
            TetherError::Configuration(format!("failed to read client certificate: {}", e))
        })?;
        let key_data = fs::read(key_path).map_err(|e| {
            TetherError::Configuration(format!("failed to read client key: {}", e))
        })?;
        let identity = Identity::from_pkcs8(&cert_data, &key_data).map_err(|e| {
            TetherError::Configuration(format!(
                "failed to create identity from certificate and key: {}",
                e
            ))
        })?;
        tls_builder.identity(identity);
    }

    // "require" and "verify-ca" skip hostname verification, matching libpq.
    let accept_invalid_hostnames = matches!(
        ssl_mode.to_lowercase().as_str(),
        "require" | "verify-ca" | "verify_ca"
    );
    tls_builder.danger_accept_invalid_hostnames(accept_invalid_hostnames);

    // "require" without a CA certificate accepts any server certificate.
    let accept_invalid_certs =
        ssl_mode.to_lowercase().as_str() == "require" && ca_cert_path.is_none();
    tls_builder.danger_accept_invalid_certs(accept_invalid_certs);

    let tls_connector = tls_builder.build().map_err(|e| {
        TetherError::Driver(format!("failed to build TLS connector: {}", e))
    })?;
    Ok(MakeTlsConnector::new(tls_connector))
}

/// PostgreSQL connection wrapper
///
/// Holds the tokio-postgres client. The connection driver task is
/// spawned at connect time; dropping the last handle to the client
/// terminates it and closes the socket.
pub struct PgConnection {
    client: Client,
    closed: AtomicBool,
}

impl PgConnection {
    /// Connect to a PostgreSQL database
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let ssl_mode = config
            .get_string("ssl_mode")
            .unwrap_or_else(|| "prefer".to_string());

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = config.database.as_deref(),
            ssl_mode = %ssl_mode,
            "connecting to PostgreSQL database"
        );

        let pg_config = build_pg_config(config);

        let client = if ssl_mode.to_lowercase() == "disable" {
            let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
                TetherError::Driver(format!(
                    "failed to connect to PostgreSQL: {}",
                    format_postgres_error(&e)
                ))
            })?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        } else {
            let tls = build_tls_connector(&ssl_mode, config)?;
            let (client, connection) = pg_config.connect(tls).await.map_err(|e| {
                TetherError::Driver(format!(
                    "failed to connect to PostgreSQL: {}",
                    format_postgres_error(&e)
                ))
            })?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        };

        tracing::debug!("PostgreSQL connection established");
        Ok(Self {
            client,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Connection for PgConnection {
    fn driver_name(&self) -> &str {
        "postgres"
    }

    async fn ping(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TetherError::Driver("connection is closed".into()));
        }
        self.client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| TetherError::Driver(format_postgres_error(&e)))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("PostgreSQL connection closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.client.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_pg_config_defaults() {
        let config = ConnectionConfig::new("postgres");
        let pg_config = build_pg_config(&config);
        assert_eq!(
            pg_config.get_hosts(),
            &[tokio_postgres::config::Host::Tcp("localhost".to_string())]
        );
        assert_eq!(pg_config.get_ports(), &[5432]);
        assert_eq!(pg_config.get_dbname(), Some("postgres"));
        assert_eq!(
            pg_config.get_ssl_mode(),
            tokio_postgres::config::SslMode::Prefer
        );
    }

    #[test]
    fn test_build_pg_config_explicit_values() {
        let config = ConnectionConfig::new("postgres")
            .with_host("db.example.com")
            .with_port(5433)
            .with_database("appdb")
            .with_username("alice")
            .with_param("ssl_mode", "disable")
            .with_param("application_name", "tether");
        let pg_config = build_pg_config(&config);
        assert_eq!(
            pg_config.get_hosts(),
            &[tokio_postgres::config::Host::Tcp("db.example.com".to_string())]
        );
        assert_eq!(pg_config.get_ports(), &[5433]);
        assert_eq!(pg_config.get_dbname(), Some("appdb"));
        assert_eq!(pg_config.get_user(), Some("alice"));
        assert_eq!(pg_config.get_application_name(), Some("tether"));
        assert_eq!(
            pg_config.get_ssl_mode(),
            tokio_postgres::config::SslMode::Disable
        );
    }

    #[test]
    fn test_build_pg_config_require_maps_to_require() {
        let config = ConnectionConfig::new("postgres").with_param("ssl_mode", "require");
        let pg_config = build_pg_config(&config);
        assert_eq!(
            pg_config.get_ssl_mode(),
            tokio_postgres::config::SslMode::Require
        );
    }

    #[test]
    fn test_build_tls_connector_without_certs() {
        let config = ConnectionConfig::new("postgres");
        assert!(build_tls_connector("prefer", &config).is_ok());
        assert!(build_tls_connector("require", &config).is_ok());
    }

    #[test]
    fn test_build_tls_connector_missing_ca_file() {
        let config =
            ConnectionConfig::new("postgres").with_param("ssl_ca_cert", "/nonexistent/ca.pem");
        let result = build_tls_connector("verify-full", &config);
        assert!(matches!(result, Err(TetherError::Configuration(_))));
    }
}
