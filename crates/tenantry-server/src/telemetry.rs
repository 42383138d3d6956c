//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install a JSON subscriber. `RUST_LOG` overrides the default of `info`
/// for the Tenantry crates.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("tenantry_server=info,tenantry_db=info,tenantry_auth=info,tenantry_core=info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .init();
}
