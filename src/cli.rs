use crate::config::{Config, CONFIG_FILE};
use crate::log_mode::LogMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "zwatch", author, version, about = "Moniteur de connexions TCP établies contre les inondations de connexions")]
pub struct Cli {
    /// Chemin du fichier de configuration
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Seuil de connexions simultanées par IP
    #[arg(short, long, global = true)]
    pub threshold: Option<u32>,

    /// Intervalle entre deux vérifications (secondes)
    #[arg(short, long, global = true)]
    pub interval: Option<u64>,

    /// Chemin du journal d'audit
    #[arg(long, global = true)]
    pub log_file: Option<String>,

    /// Mode de journalisation (file ou journal)
    #[arg(long, global = true)]
    pub log_mode: Option<LogMode>,

    /// Signaler les IPs suspectes sans les bloquer
    #[arg(long, global = true)]
    pub no_block: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Lance la surveillance (commande par défaut)
    Start,
    /// Effectue un seul échantillonnage et affiche les IPs les plus actives
    Check {
        /// Nombre d'IPs à afficher
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Affiche la configuration par défaut au format JSON
    DumpConfig,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Start)
    }

    /// Applique les options de la ligne de commande sur la configuration chargée
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(threshold) = self.threshold {
            config.connection_threshold = threshold;
        }
        if let Some(interval) = self.interval {
            config.check_interval = interval;
        }
        if let Some(log_file) = &self.log_file {
            config.log_file = log_file.clone();
        }
        if let Some(log_mode) = self.log_mode {
            config.log_mode = log_mode;
        }
        if self.no_block {
            config.block_enabled = false;
        }
    }
}
