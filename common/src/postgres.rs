use anyhow::{Result, bail};
use deadpool_postgres::{Config as PgConfig, ManagerConfig, Pool, RecyclingMethod};
use postgres::NoTls;
use rustls::pki_types::CertificateDer;
use std::env;
use tempfile::NamedTempFile;

/// Connection settings for the state-store Postgres instance. Populated
/// from environment variables rather than `clap::Parser` — flag parsing is
/// explicitly out of scope for this process (`SPEC_FULL.md` §1, §10.2).
#[derive(Clone, Debug)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Option<String>,
    pub ca_cert: Option<String>,
}

impl PostgresSettings {
    pub fn from_env() -> Self {
        PostgresSettings {
            host: env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("POSTGRES_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5432),
            database: env::var("POSTGRES_DATABASE").unwrap_or_else(|_| "postgres".to_string()),
            username: env::var("POSTGRES_USERNAME").unwrap_or_else(|_| "postgres".to_string()),
            password: env::var("POSTGRES_PASSWORD").ok(),
            ca_cert: env::var("POSTGRES_CA_CERT").ok(),
        }
    }
}

pub async fn create_pool(settings: PostgresSettings) -> Result<Pool> {
    let mut _ca_tempfile = None;
    let mut tls_connector = None;
    if let Some(ref ca_cert) = settings.ca_cert {
        let mut file = NamedTempFile::new()?;
        use std::io::Write;
        file.write_all(ca_cert.as_bytes())?;
        let cert_bytes = std::fs::read(file.path())?;
        let extra_roots = parse_ca_certs(&cert_bytes)?;
        tls_connector = Some(crate::make_rustls(extra_roots)?);
        _ca_tempfile = Some(file); // keep tempfile alive for the duration of pool creation
    }

    let mut pg_pool_cfg = PgConfig::new();
    pg_pool_cfg.dbname = Some(settings.database);
    pg_pool_cfg.host = Some(settings.host);
    pg_pool_cfg.port = Some(settings.port);
    pg_pool_cfg.user = Some(settings.username);
    pg_pool_cfg.password = settings.password;
    pg_pool_cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    let pool = if let Some(tls) = tls_connector {
        pg_pool_cfg.create_pool(Some(deadpool_postgres::Runtime::Tokio1), tls)?
    } else {
        pg_pool_cfg.create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)?
    };
    Ok(pool)
}

fn parse_ca_certs(bytes: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    // If it's PEM, decode all the certs; otherwise treat as raw DER.
    if bytes.starts_with(b"-----BEGIN") {
        let mut rd: &[u8] = bytes;
        let mut out = Vec::new();
        for item in rustls_pemfile::read_all(&mut rd) {
            let item = item.map_err(|e| anyhow::anyhow!("failed to parse PEM bundle: {}", e))?;
            if let rustls_pemfile::Item::X509Certificate(der) = item {
                out.push(der);
            }
        }
        if out.is_empty() {
            bail!("no X509 certificates found in provided PEM");
        }
        Ok(out)
    } else {
        Ok(vec![CertificateDer::from(bytes.to_vec())])
    }
}
