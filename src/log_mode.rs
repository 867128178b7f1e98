use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Destination du journal d'audit et des traces du moniteur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogMode {
    /// Journal d'audit dans un fichier local, traces sur la console
    #[default]
    File,
    /// Tout passe par systemd-journal
    SystemdJournal,
}

impl fmt::Display for LogMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogMode::File => write!(f, "file"),
            LogMode::SystemdJournal => write!(f, "journal"),
        }
    }
}

impl FromStr for LogMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" | "fichier" => Ok(LogMode::File),
            "journal" | "systemd" | "systemd-journal" => Ok(LogMode::SystemdJournal),
            other => Err(format!("Mode de journalisation inconnu: {}", other)),
        }
    }
}
