use crate::errors::ConfigError;
use crate::log_mode::LogMode;
use crate::models::normalize_ip;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE: &str = "/etc/zwatch/config.json";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Version du logiciel ayant écrit le fichier
    pub version: String,

    /// Nombre de connexions établies simultanées à partir duquel une IP est suspecte
    pub connection_threshold: u32,

    /// Intervalle (en secondes) entre deux échantillonnages
    pub check_interval: u64,

    /// Chemin du journal d'audit des blocages
    pub log_file: String,

    /// Niveau de log
    pub log_level: String,

    /// Mode de journalisation (fichier ou systemd-journal)
    pub log_mode: LogMode,

    /// Bloquer les IPs suspectes ; sinon elles sont seulement signalées
    pub block_enabled: bool,

    /// Couper les connexions déjà suivies après un blocage
    pub terminate_connections: bool,

    /// Ne plus compter les IPs déjà bloquées
    pub exclude_blocked: bool,

    /// IPs jamais bloquées
    pub whitelist: Vec<String>,

    /// Délai maximal (en secondes) accordé à iptables, conntrack et ss
    pub command_timeout: u64,

    /// Effacer le terminal au démarrage
    pub clear_console: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: env!("CARGO_PKG_VERSION").to_string(),
            connection_threshold: 100,
            check_interval: 5,
            log_file: "/var/log/zwatch/dos_alertes.log".to_string(),
            log_level: "info".to_string(),
            log_mode: LogMode::File,
            block_enabled: true,
            terminate_connections: true,
            exclude_blocked: false,
            whitelist: vec!["127.0.0.1".to_string(), "::1".to_string()],
            command_timeout: 10,
            clear_console: true,
        }
    }
}

impl Config {
    /// Charge la configuration depuis `path`, en créant le fichier par défaut s'il n'existe pas.
    ///
    /// Appelée avant l'initialisation du logger : les messages passent par stderr.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let default_config = Config::default();
            match default_config.save(path) {
                Ok(()) => eprintln!("Configuration par défaut créée dans {}", path.display()),
                Err(e) => eprintln!(
                    "Attention: impossible de créer la configuration par défaut ({}), utilisation des valeurs par défaut",
                    e
                ),
            }
            return Ok(default_config);
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_json::from_str(&content)?;

        Ok(config)
    }

    /// Sauvegarde la configuration dans `path`
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(io_error)?;
            }
        }

        let config_json = serde_json::to_string_pretty(self)?;
        fs::write(path, config_json).map_err(io_error)?;

        Ok(())
    }

    /// Vérifie la cohérence des valeurs
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_threshold == 0 {
            return Err(ConfigError::Invalid(
                "connection_threshold doit être supérieur à 0".to_string(),
            ));
        }
        if self.check_interval == 0 {
            return Err(ConfigError::Invalid(
                "check_interval doit être supérieur à 0".to_string(),
            ));
        }
        if self.log_file.trim().is_empty() {
            return Err(ConfigError::Invalid("log_file ne peut pas être vide".to_string()));
        }
        for entry in &self.whitelist {
            if entry.parse::<IpAddr>().is_err() {
                return Err(ConfigError::Invalid(format!(
                    "Adresse invalide dans la liste blanche: {}",
                    entry
                )));
            }
        }
        Ok(())
    }

    /// Liste blanche sous forme d'adresses normalisées ; les entrées invalides sont ignorées
    pub fn whitelist_ips(&self) -> Vec<IpAddr> {
        self.whitelist
            .iter()
            .filter_map(|entry| entry.parse().ok())
            .map(normalize_ip)
            .collect()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }
}
