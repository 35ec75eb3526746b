//! Ambient stack shared by the reconciler binary: process bootstrap,
//! structured logging, graceful shutdown, the health/metrics HTTP surface,
//! and the Postgres connection pool. None of this is reconciliation logic —
//! see `reconciler` for that — it is the scaffolding every entrypoint in
//! this workspace wires up the same way.

use anyhow::Result;
use rustls::{ClientConfig, RootCertStore, pki_types::CertificateDer};
use tokio_postgres_rustls::MakeRustlsConnect;

pub mod metrics;
pub mod postgres;
pub mod shutdown;
pub mod wait;

/// Process-wide one-time setup: colored terminal output (respecting
/// `DISABLE_COLORS`, e.g. when running under a log collector), the rustls
/// crypto provider, and the `tracing` subscriber driven by `RUST_LOG`.
pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_else(|_| String::new())
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);

    install_rustls_provider();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // On panic, print the default report then exit non-zero so the
    // orchestrator restarts the container rather than leaving a half-dead
    // process around with some tasks silently gone.
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));
}

pub fn install_rustls_provider() {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("install aws-lc-rs provider");
}

/// Builds a `tokio_postgres` TLS connector trusting the platform roots plus
/// any caller-supplied CA certificates (e.g. a managed Postgres service's
/// custom CA).
pub fn make_rustls(certs: Vec<CertificateDer<'_>>) -> Result<MakeRustlsConnect> {
    let mut roots = RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs().expect("could not load platform certs") {
        roots.add(cert).unwrap();
    }
    for cert in certs {
        roots.add(cert)?;
    }
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(MakeRustlsConnect::new(config))
}
