// config.rs - Environment-driven configuration and logging setup
//
// Configuration is small on purpose: the only thing the lifecycle needs
// from its surroundings is where dataset resources live. Everything
// about a single fixture comes from its descriptor.

use std::env;
use std::path::PathBuf;

use serde::Deserialize;

/// Environment variable holding extra dataset resource roots
pub const RESOURCE_PATH_VAR: &str = "DBFIXTURE_RESOURCE_PATH";

/// Default log filter when RUST_LOG is not set
const DEFAULT_LOG_FILTER: &str = "dbfixture=info";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Directories searched, in order, for dataset resources
    pub resource_roots: Vec<PathBuf>,
}

impl Default for FixtureConfig {
    /// Tests can run from the crate root or from a workspace root
    fn default() -> Self {
        FixtureConfig {
            resource_roots: vec![
                PathBuf::from("tests/resources"),
                PathBuf::from("resources"),
                PathBuf::from("."),
            ],
        }
    }
}

impl FixtureConfig {
    /// Reads `.env` (if any) and then `DBFIXTURE_RESOURCE_PATH`.
    ///
    /// The variable is a platform path list (`:` on Unix, `;` on Windows).
    /// Its entries are searched before the defaults.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let mut config = FixtureConfig::default();
        if let Some(paths) = env::var_os(RESOURCE_PATH_VAR) {
            let mut roots: Vec<PathBuf> = env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            roots.append(&mut config.resource_roots);
            config.resource_roots = roots;
        }
        config
    }
}

/// Installs a fmt subscriber filtered by RUST_LOG.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}
