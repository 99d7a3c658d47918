use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-application directory under each configuration root.
pub const CONFIG_NAMESPACE: &str = "machinesd";

/// Directory (relative to the configuration root) holding machine fragments.
pub const MACHINES_DIR_NAME: &str = "machines.d";

/// Quiescence window between the first change of a burst and its notification.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Environment variable naming the inherited login-messages descriptor.
pub const LOGIN_MESSAGES_FD_VAR: &str = "MACHINESD_LOGIN_MESSAGES_FD";

/// Registry service configuration
///
/// Built with the same chained-setter style as the rest of the crate:
///
/// ```
/// use machinesd::config::RegistryConfig;
/// use std::time::Duration;
///
/// let config = RegistryConfig::new("/etc/machinesd/machines.d")
///     .debounce(Duration::from_millis(250))
///     .watch(false);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory holding the fragment files
    pub directory: PathBuf,

    /// Quiescence window of the change debouncer
    pub debounce: Duration,

    /// Watch the directory for external changes
    pub watch: bool,

    /// Buffered notifications per subscriber before it starts lagging
    pub notification_capacity: usize,
}

impl RegistryConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            debounce: DEFAULT_DEBOUNCE,
            watch: true,
            notification_capacity: 16,
        }
    }

    /// Configuration for the machines directory found via [`lookup_config_dir`].
    pub fn machines() -> Self {
        Self::new(lookup_config_dir(MACHINES_DIR_NAME))
    }

    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    pub fn watch(mut self, enabled: bool) -> Self {
        self.watch = enabled;
        self
    }

    pub fn notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.directory.as_os_str().is_empty() {
            return Err("Registry directory cannot be empty".to_string());
        }

        if self.debounce.is_zero() {
            return Err("Debounce window must be > 0".to_string());
        }

        if self.notification_capacity == 0 {
            return Err("notification_capacity must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::machines()
    }
}

/// Server configuration: listen address plus the exported registry.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub registry: RegistryConfig,
    pub login_messages_var: String,
}

impl ServerConfig {
    pub fn new(registry: RegistryConfig) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9091,
            registry,
            login_messages_var: LOGIN_MESSAGES_FD_VAR.to_string(),
        }
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Host cannot be empty".to_string());
        }
        self.registry.validate()
    }
}

/// Resolves `name` against the configuration roots in `XDG_CONFIG_DIRS`
/// (default `/etc`).
pub fn lookup_config_dir(name: &str) -> PathBuf {
    let roots = env::var("XDG_CONFIG_DIRS").unwrap_or_default();
    lookup_config_in(&roots, name)
}

/// Returns the first `<root>/machinesd/<name>` that exists, or the one under
/// the first root when none does.
pub fn lookup_config_in(roots: &str, name: &str) -> PathBuf {
    let mut fallback = None;

    for root in roots.split(':').filter(|root| !root.is_empty()) {
        let candidate = Path::new(root).join(CONFIG_NAMESPACE).join(name);
        if candidate.exists() {
            return candidate;
        }
        fallback.get_or_insert(candidate);
    }

    fallback.unwrap_or_else(|| Path::new("/etc").join(CONFIG_NAMESPACE).join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_registry_config() {
        let config = RegistryConfig::new("/srv/machines.d");
        assert_eq!(config.debounce, DEFAULT_DEBOUNCE);
        assert!(config.watch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(RegistryConfig::new("").validate().is_err());
        assert!(
            RegistryConfig::new("/x")
                .debounce(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            RegistryConfig::new("/x")
                .notification_capacity(0)
                .validate()
                .is_err()
        );
        assert!(
            ServerConfig::new(RegistryConfig::new("/x"))
                .host("")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_address() {
        let config = ServerConfig::new(RegistryConfig::new("/x"))
            .host("0.0.0.0")
            .port(8080);
        assert_eq!(config.address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_lookup_prefers_existing_root() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let existing = second.path().join(CONFIG_NAMESPACE).join(MACHINES_DIR_NAME);
        std::fs::create_dir_all(&existing).unwrap();

        let roots = format!("{}:{}", first.path().display(), second.path().display());
        assert_eq!(lookup_config_in(&roots, MACHINES_DIR_NAME), existing);
    }

    #[test]
    fn test_lookup_falls_back_to_first_root() {
        let first = TempDir::new().unwrap();
        let roots = format!("{}:/nonexistent-root", first.path().display());
        assert_eq!(
            lookup_config_in(&roots, MACHINES_DIR_NAME),
            first.path().join(CONFIG_NAMESPACE).join(MACHINES_DIR_NAME)
        );
    }

    #[test]
    fn test_lookup_without_roots() {
        assert_eq!(
            lookup_config_in("", MACHINES_DIR_NAME),
            PathBuf::from("/etc/machinesd/machines.d")
        );
    }
}
