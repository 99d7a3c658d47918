use clap::Parser;
use machinesd::config::{MACHINES_DIR_NAME, RegistryConfig, ServerConfig, lookup_config_dir};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "machinesd")]
#[command(about = "Directory-backed machine registry exported over HTTP")]
pub struct Cli {
    /// Fragment directory (defaults to <XDG_CONFIG_DIRS>/machinesd/machines.d)
    #[arg(long, env = "MACHINESD_DIR")]
    pub directory: Option<PathBuf>,

    #[arg(long, env = "MACHINESD_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "MACHINESD_PORT", default_value_t = 9091)]
    pub port: u16,

    /// Quiescence window for change notifications, in milliseconds
    #[arg(long, env = "MACHINESD_DEBOUNCE_MS", default_value_t = 1000)]
    pub debounce_ms: u64,

    /// Do not watch the directory for external changes
    #[arg(long)]
    pub no_watch: bool,
}

impl Cli {
    pub fn into_config(self) -> ServerConfig {
        let directory = self
            .directory
            .unwrap_or_else(|| lookup_config_dir(MACHINES_DIR_NAME));

        let registry = RegistryConfig::new(directory)
            .debounce(Duration::from_millis(self.debounce_ms))
            .watch(!self.no_watch);

        ServerConfig::new(registry).host(&self.host).port(self.port)
    }
}
