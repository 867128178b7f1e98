use crate::log_mode::LogMode;
use chrono::{DateTime, Local};
use log::{error, warn};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Destination des lignes d'audit
pub trait AuditSink: Send + Sync {
    /// Ajoute une ligne au journal d'audit
    fn append(&self, line: &str) -> io::Result<()>;
}

/// Formate une ligne d'audit pour un blocage confirmé
pub fn alert_line(timestamp: DateTime<Local>, ip: IpAddr, count: u32) -> String {
    format!(
        "{} - ALERTE: {} avec {} connexions suspectes.",
        timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
        ip,
        count
    )
}

/// Journal d'audit en ajout seul.
///
/// Le fichier est rouvert à chaque écriture : une erreur de droits est
/// signalée à chaque tentative et disparaît dès que les droits sont corrigés.
pub struct AuditLogger {
    log_path: PathBuf,
    log_mode: LogMode,
}

impl AuditLogger {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self::new_with_mode(log_path, LogMode::File)
    }

    pub fn new_with_mode(log_path: impl Into<PathBuf>, log_mode: LogMode) -> Self {
        let log_path = log_path.into();

        if log_mode == LogMode::File {
            // Créer le répertoire si nécessaire
            if let Some(parent) = log_path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        error!("Erreur lors de la création du répertoire de logs: {}", e);
                    }
                }
            }
        }

        Self { log_path, log_mode }
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

impl AuditSink for AuditLogger {
    fn append(&self, line: &str) -> io::Result<()> {
        match self.log_mode {
            LogMode::File => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.log_path)?;
                writeln!(file, "{}", line)
            }
            LogMode::SystemdJournal => {
                warn!("{}", line);
                Ok(())
            }
        }
    }
}
