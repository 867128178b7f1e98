use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use zwatch::cli::{Cli, Command};
use zwatch::config::Config;
use zwatch::log_mode::LogMode;
use zwatch::monitor::{detect, sample, Mitigator, Monitor, MonitorSettings, ProcNetSource};
use zwatch::{AuditLogger, IptablesFirewall};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Analyser les arguments de ligne de commande
    let cli = Cli::parse();

    if cli.command() == Command::DumpConfig {
        println!("{}", serde_json::to_string_pretty(&Config::default())?);
        return Ok(());
    }

    // Charger la configuration, une seule fois pour toute la durée du processus
    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Chargement de {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    init_logging(&config);

    match cli.command() {
        Command::Start | Command::DumpConfig => run_monitor(config).await,
        Command::Check { top } => check(config, top).await,
    }
}

fn init_logging(config: &Config) {
    match config.log_mode {
        LogMode::File => {
            env_logger::init_from_env(env_logger::Env::default().default_filter_or(&config.log_level));
        }
        LogMode::SystemdJournal => {
            #[cfg(feature = "systemd")]
            {
                use systemd_journal_logger::JournalLog;

                let log_level = match config.log_level.to_lowercase().as_str() {
                    "trace" => log::LevelFilter::Trace,
                    "debug" => log::LevelFilter::Debug,
                    "warn" => log::LevelFilter::Warn,
                    "error" => log::LevelFilter::Error,
                    _ => log::LevelFilter::Info,
                };

                match JournalLog::new() {
                    Ok(logger) => {
                        if let Err(e) = logger.with_syslog_identifier("zwatch".to_string()).install() {
                            eprintln!("Erreur lors de l'installation du logger systemd: {}", e);
                            env_logger::init_from_env(env_logger::Env::default().default_filter_or(&config.log_level));
                        } else {
                            log::set_max_level(log_level);
                            info!("Logger systemd initialisé avec niveau: {}", config.log_level);
                        }
                    }
                    Err(e) => {
                        eprintln!("Erreur lors de l'initialisation du logger systemd: {}", e);
                        env_logger::init_from_env(env_logger::Env::default().default_filter_or(&config.log_level));
                    }
                }
            }

            #[cfg(not(feature = "systemd"))]
            {
                eprintln!("AVERTISSEMENT: Le mode SystemdJournal n'est pas disponible (feature 'systemd' non activée). Utilisation du logger standard à la place.");
                env_logger::init_from_env(env_logger::Env::default().default_filter_or(&config.log_level));
            }
        }
    }
}

async fn run_monitor(config: Config) -> anyhow::Result<()> {
    let firewall = Arc::new(IptablesFirewall::new(config.command_timeout()));
    let audit = Arc::new(AuditLogger::new_with_mode(&config.log_file, config.log_mode));
    let mitigator = Mitigator::new(firewall, audit)
        .with_whitelist(config.whitelist_ips())
        .with_connection_termination(config.terminate_connections);

    let mut monitor = Monitor::new(
        MonitorSettings::from_config(&config),
        Arc::new(ProcNetSource::new()),
        mitigator,
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Signal d'arrêt reçu");
        let _ = stop_tx.send(true);
    });

    monitor.run(stop_rx).await;
    Ok(())
}

/// Un seul échantillonnage, sans aucune mitigation
async fn check(config: Config, top: usize) -> anyhow::Result<()> {
    let source = ProcNetSource::new();
    let sample = sample(&source).await.context("Lecture de la table des connexions")?;
    let suspects = detect(&sample, config.connection_threshold);
    let whitelist = config.whitelist_ips();

    println!("=== Connexions établies ===");
    println!("IPs distantes: {}", sample.len());
    println!("Connexions: {}", sample.total_connections());
    println!("Seuil: {} connexions", config.connection_threshold);

    println!("\n=== Top {} IPs ===", top);
    for (i, (ip, count)) in sample.top(top).iter().enumerate() {
        let flag = if whitelist.contains(ip) {
            "liste blanche"
        } else if *count >= config.connection_threshold {
            "SUSPECTE"
        } else {
            "normale"
        };
        println!("{}. {} - {} connexions ({})", i + 1, ip, count, flag);
    }

    if suspects.is_empty() {
        println!("\nAucune IP au-dessus du seuil");
    } else {
        println!("\n{} IP(s) au-dessus du seuil", suspects.len());
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!("Impossible d'écouter SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
