//! Mitigation des IPs suspectes
//!
//! Chaque IP n'est bloquée qu'une seule fois pendant la vie du processus.
//! Un blocage refusé par le pare-feu n'est pas mémorisé : l'IP sera retentée
//! au prochain cycle où elle dépasse encore le seuil.

use crate::firewall::Firewall;
use crate::logger::{alert_line, AuditSink};
use crate::models::{normalize_ip, BlockedSet, MitigationOutcome, Suspect};
use crate::console;
use chrono::Local;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

pub struct Mitigator {
    firewall: Arc<dyn Firewall>,
    audit: Arc<dyn AuditSink>,
    blocked: BlockedSet,
    /// IPs déjà signalées dans le journal en mode signalement seul
    reported: HashSet<IpAddr>,
    whitelist: HashSet<IpAddr>,
    terminate_connections: bool,
}

impl Mitigator {
    pub fn new(firewall: Arc<dyn Firewall>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            firewall,
            audit,
            blocked: BlockedSet::new(),
            reported: HashSet::new(),
            whitelist: HashSet::new(),
            terminate_connections: true,
        }
    }

    pub fn with_whitelist(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.whitelist.extend(ips.into_iter().map(normalize_ip));
        self
    }

    pub fn with_connection_termination(mut self, enabled: bool) -> Self {
        self.terminate_connections = enabled;
        self
    }

    /// IPs bloquées jusqu'ici
    pub fn blocked(&self) -> &BlockedSet {
        &self.blocked
    }

    pub fn is_whitelisted(&self, ip: &IpAddr) -> bool {
        self.whitelist.contains(&normalize_ip(*ip))
    }

    /// Bloque `suspect.ip` si ce n'est pas déjà fait
    pub async fn mitigate(&mut self, suspect: &Suspect) -> MitigationOutcome {
        let ip = normalize_ip(suspect.ip);

        if self.blocked.contains(&ip) {
            debug!("IP {} déjà bloquée, aucune action", ip);
            return MitigationOutcome::AlreadyBlocked;
        }

        if self.is_whitelisted(&ip) {
            info!("Tentative de blocage d'une IP en liste blanche ignorée: {}", ip);
            return MitigationOutcome::Exempt;
        }

        console::blocking(ip);
        if let Err(e) = self.firewall.block(ip).await {
            error!("Échec du blocage de l'IP {}: {}", ip, e);
            return MitigationOutcome::Failed;
        }

        if self.terminate_connections {
            if let Err(e) = self.firewall.terminate_existing_connections(ip).await {
                warn!("Impossible de couper les connexions existantes de {}: {}", ip, e);
            }
        }

        self.blocked.insert(ip);
        console::blocked(ip);
        info!("IP bloquée: {}", suspect);

        self.write_audit(ip, suspect.count);
        MitigationOutcome::Blocked
    }

    /// Signale une IP suspecte dans le journal sans la bloquer, une seule fois par IP.
    ///
    /// Retourne `false` si l'IP avait déjà été signalée.
    pub fn record_alert(&mut self, suspect: &Suspect) -> bool {
        let ip = normalize_ip(suspect.ip);
        if !self.reported.insert(ip) {
            return false;
        }
        info!("IP suspecte signalée sans blocage: {}", suspect);
        self.write_audit(ip, suspect.count);
        true
    }

    fn write_audit(&self, ip: IpAddr, count: u32) {
        let line = alert_line(Local::now(), ip, count);
        if let Err(e) = self.audit.append(&line) {
            error!("Écriture du journal d'audit impossible: {}", e);
        }
    }
}
