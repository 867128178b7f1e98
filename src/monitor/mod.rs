//! Boucle de surveillance des connexions
//!
//! À chaque cycle : échantillonnage de la table des connexions, détection des
//! IPs au-dessus du seuil, puis mitigation de chacune, avant de dormir jusqu'au
//! cycle suivant. Un échec d'échantillonnage ne fait que sauter le cycle.

mod detection;
mod mitigation;
mod sampler;

use crate::config::Config;
use crate::console;
use crate::errors::SampleError;
use crate::models::{BlockedSet, ConnectionSample, CycleReport, MonitorState};
use chrono::Local;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;

pub use detection::*;
pub use mitigation::*;
pub use sampler::*;

/// Paramètres fixés au démarrage
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub threshold: u32,
    pub interval: Duration,
    pub block_enabled: bool,
    pub exclude_blocked: bool,
    pub clear_console: bool,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.connection_threshold,
            interval: config.interval(),
            block_enabled: config.block_enabled,
            exclude_blocked: config.exclude_blocked,
            clear_console: config.clear_console,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct Monitor {
    settings: MonitorSettings,
    source: Arc<dyn ConnectionSource>,
    mitigator: Mitigator,
    state: MonitorState,
    completed_cycles: u64,
}

impl Monitor {
    pub fn new(settings: MonitorSettings, source: Arc<dyn ConnectionSource>, mitigator: Mitigator) -> Self {
        Self {
            settings,
            source,
            mitigator,
            state: MonitorState::Idle,
            completed_cycles: 0,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn blocked(&self) -> &BlockedSet {
        self.mitigator.blocked()
    }

    /// Nombre de cycles menés jusqu'au bout
    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles
    }

    fn transition(&mut self, state: MonitorState) {
        debug!("État du moniteur: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Exécute un cycle échantillonnage → détection → mitigation
    pub async fn run_cycle(&mut self) -> Result<CycleReport, SampleError> {
        let sample = self.take_sample().await?;
        Ok(self.evaluate(sample, None).await)
    }

    async fn take_sample(&mut self) -> Result<ConnectionSample, SampleError> {
        self.transition(MonitorState::Sampling);
        match sample(self.source.as_ref()).await {
            Ok(sample) => Ok(sample),
            Err(e) => {
                self.transition(MonitorState::Idle);
                Err(e)
            }
        }
    }

    /// Détection puis mitigation. Une mitigation commencée va toujours à son
    /// terme ; l'arrêt n'est pris en compte qu'entre deux IPs.
    async fn evaluate(&mut self, sample: ConnectionSample, shutdown: Option<&watch::Receiver<bool>>) -> CycleReport {
        let sample = if self.settings.exclude_blocked {
            sample.without(self.mitigator.blocked())
        } else {
            sample
        };

        self.transition(MonitorState::Evaluating);
        let suspects = detect(&sample, self.settings.threshold);
        for suspect in &suspects {
            console::alert(suspect);
        }

        let mut outcomes = Vec::with_capacity(suspects.len());
        if self.settings.block_enabled && !suspects.is_empty() {
            self.transition(MonitorState::Mitigating);
            for suspect in &suspects {
                if shutdown.is_some_and(|rx| *rx.borrow()) {
                    debug!("Arrêt demandé, mitigation interrompue avant {}", suspect.ip);
                    break;
                }
                let outcome = self.mitigator.mitigate(suspect).await;
                outcomes.push((suspect.ip, outcome));
            }
        } else if !self.settings.block_enabled {
            for suspect in &suspects {
                self.mitigator.record_alert(suspect);
            }
        }

        self.transition(MonitorState::Idle);
        self.completed_cycles += 1;

        CycleReport {
            remote_ips: sample.len(),
            total_connections: sample.total_connections(),
            suspects,
            outcomes,
        }
    }

    /// Tourne jusqu'à ce que `shutdown` passe à `true` ou que l'émetteur disparaisse
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        if self.settings.clear_console {
            console::clear_console();
        }
        console::banner();
        info!(
            "Surveillance démarrée (seuil: {} connexions, intervalle: {:?}, blocage: {})",
            self.settings.threshold,
            self.settings.interval,
            if self.settings.block_enabled { "activé" } else { "désactivé" }
        );

        while !*shutdown.borrow() {
            console::status(Local::now());

            // Seul l'échantillonnage peut être abandonné en cours de route
            let sampled = tokio::select! {
                result = self.take_sample() => result,
                _ = stop_requested(&mut shutdown) => break,
            };

            match sampled {
                Ok(sample) => {
                    let report = self.evaluate(sample, Some(&shutdown)).await;
                    debug!(
                        "Cycle terminé: {} IPs, {} connexions, {} suspectes",
                        report.remote_ips,
                        report.total_connections,
                        report.suspects.len()
                    );
                }
                Err(e) => error!("Échec de l'échantillonnage des connexions: {}", e),
            }

            tokio::select! {
                _ = time::sleep(self.settings.interval) => {}
                _ = stop_requested(&mut shutdown) => break,
            }
        }

        self.transition(MonitorState::Stopped);
        console::shutdown();
        info!("Surveillance arrêtée, {} IP(s) bloquée(s)", self.blocked().len());
    }
}

async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
