use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use herbtrace_ledger::OrgTopology;
use herbtrace_store::SyncMode;

use crate::error::{ServerError, ServerResult};

/// File name of the commit log inside the data directory.
pub const LEDGER_FILE: &str = "ledger.log";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub orgs: OrgTopology,
    pub sync_mode: SyncMode,
    /// Serve read routes to callers without an org credential.
    pub allow_anonymous_read: bool,
    /// Refuse credentials naming neither configured organization.
    pub reject_unknown_orgs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            data_dir: PathBuf::from("herbtrace-data"),
            orgs: OrgTopology::default(),
            sync_mode: SyncMode::default(),
            allow_anonymous_read: true,
            reject_unknown_orgs: false,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Load from a TOML file; missing keys take their defaults.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }
}
