use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use esm_console::ConsoleConfig;
use esm_everos::EverosConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Process bootstrap configuration. Operator-tunable runtime settings live in
/// the datastore; this only wires the process to its store and providers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManagerConfig {
    /// Path of the election-record store document.
    pub datastore: PathBuf,
    /// Direct-API provider configuration.
    #[serde(default)]
    pub everos: EverosConfig,
    /// Console provider configuration; only used in console mode.
    #[serde(default)]
    pub console: ConsoleConfig,
}

pub fn from_toml_path<P: AsRef<Path>, R: DeserializeOwned>(path: P) -> anyhow::Result<R> {
    let mut contents = String::new();
    {
        let mut file = File::open(path)?;
        file.read_to_string(&mut contents)?;
    }

    let result: R = toml::from_str(&contents)?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn create_config_from(content: &str) -> NamedTempFile {
        let mut config_file = NamedTempFile::new().unwrap();
        config_file.write_all(content.as_bytes()).unwrap();
        config_file
    }

    #[test]
    fn full_config_parses() {
        let config = r#"
            datastore = "/data/staking-manager/db.json"
            [everos]
            endpoint = "http://localhost:11111/"
            request_timeout_seconds = 30
            [console]
            cmd = "/usr/bin/console"
        "#;

        let config_file = create_config_from(config);

        let config: ManagerConfig = from_toml_path(config_file.path()).unwrap();
        assert_eq!(config.datastore, PathBuf::from("/data/staking-manager/db.json"));
        assert_eq!(config.everos.endpoint, "http://localhost:11111/");
        assert_eq!(config.everos.request_timeout_seconds, 30);
        assert_eq!(config.console.cmd, "/usr/bin/console");
        assert_eq!(config.console.config_path, "console.json");
    }

    #[test]
    fn provider_sections_are_optional() {
        let config_file = create_config_from(r#"datastore = "/tmp/db.json""#);
        let config: ManagerConfig = from_toml_path(config_file.path()).unwrap();
        assert_eq!(config.everos, EverosConfig::default());
        assert_eq!(config.console, ConsoleConfig::default());
    }
}
