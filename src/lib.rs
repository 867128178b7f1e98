//! Bibliothèque zwatch de surveillance des connexions établies
//!
//! zwatch échantillonne périodiquement la table des connexions TCP du système,
//! compte les connexions établies par IP distante et bloque via iptables les
//! IPs qui dépassent un seuil de connexions simultanées.

// Modules principaux
pub mod models;   // Structures de données
pub mod config;   // Configuration du système
pub mod errors;   // Erreurs des collaborateurs
pub mod logger;   // Journal d'audit des blocages
pub mod log_mode; // Modes de journalisation
pub mod monitor;  // Boucle échantillonnage / détection / mitigation

// Collaborateurs système
pub mod firewall; // iptables, conntrack, ss
pub mod console;  // Affichage terminal
pub mod cli;      // Interface en ligne de commande

// Re-export des structures principales pour faciliter l'utilisation
pub use config::Config;
pub use firewall::{Firewall, IptablesFirewall};
pub use log_mode::LogMode;
pub use logger::{AuditLogger, AuditSink};
pub use models::{BlockedSet, ConnectionEntry, ConnectionSample, CycleReport, MitigationOutcome, MonitorState, Suspect, TcpState};
pub use monitor::{detect, sample, ConnectionSource, Mitigator, Monitor, MonitorSettings, ProcNetSource};
