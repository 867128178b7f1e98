//! Actions réseau appliquées aux IPs suspectes
//!
//! Le blocage passe par iptables (ip6tables pour IPv6) ; la coupure des
//! connexions déjà établies passe par conntrack et ss.

use crate::errors::FirewallError;
use async_trait::async_trait;
use log::{debug, info};
use std::net::IpAddr;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio::time;

#[async_trait]
pub trait Firewall: Send + Sync {
    /// Installe une règle DROP pour tout le trafic entrant venant de `ip`
    async fn block(&self, ip: IpAddr) -> Result<(), FirewallError>;

    /// Invalide l'état des connexions déjà suivies pour `ip`
    async fn terminate_existing_connections(&self, ip: IpAddr) -> Result<(), FirewallError>;
}

pub struct IptablesFirewall {
    timeout: Duration,
}

impl IptablesFirewall {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn program_for(ip: &IpAddr) -> &'static str {
        match ip {
            IpAddr::V4(_) => "iptables",
            IpAddr::V6(_) => "ip6tables",
        }
    }

    /// Vérifie si la règle DROP existe déjà
    async fn rule_exists(&self, ip: IpAddr) -> bool {
        let program = Self::program_for(&ip);
        let ip_str = ip.to_string();
        match run_command(program, &["-C", "INPUT", "-s", &ip_str, "-j", "DROP"], self.timeout).await {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!("Vérification de la règle {} impossible: {}", program, e);
                false
            }
        }
    }
}

impl Default for IptablesFirewall {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Firewall for IptablesFirewall {
    async fn block(&self, ip: IpAddr) -> Result<(), FirewallError> {
        if self.rule_exists(ip).await {
            info!("Une règle DROP existe déjà pour l'IP {}", ip);
            return Ok(());
        }

        let program = Self::program_for(&ip);
        let ip_str = ip.to_string();
        let output = run_command(program, &["-A", "INPUT", "-s", &ip_str, "-j", "DROP"], self.timeout).await?;
        check_status(program, output)
    }

    async fn terminate_existing_connections(&self, ip: IpAddr) -> Result<(), FirewallError> {
        let ip_str = ip.to_string();

        // conntrack retourne 1 lorsqu'aucune entrée ne correspond
        let conntrack = run_command("conntrack", &["-D", "-s", &ip_str], self.timeout)
            .await
            .and_then(|output| check_status("conntrack", output));
        let ss = run_command("ss", &["-K", "dst", &ip_str], self.timeout)
            .await
            .and_then(|output| check_status("ss", output));

        match (conntrack, ss) {
            (Err(conntrack_err), Err(ss_err)) => {
                debug!("ss n'a pas pu couper les connexions de {}: {}", ip, ss_err);
                Err(conntrack_err)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => {
                debug!("Coupure partielle des connexions de {}: {}", ip, e);
                Ok(())
            }
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}

/// Exécute une commande avec un délai maximal
async fn run_command(program: &str, args: &[&str], timeout: Duration) -> Result<Output, FirewallError> {
    debug!("Exécution: {} {}", program, args.join(" "));

    let child = Command::new(program).args(args).kill_on_drop(true).output();

    match time::timeout(timeout, child).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(FirewallError::Spawn {
            program: program.to_string(),
            source,
        }),
        Err(_) => Err(FirewallError::Timeout {
            program: program.to_string(),
            timeout,
        }),
    }
}

fn check_status(program: &str, output: Output) -> Result<(), FirewallError> {
    if output.status.success() {
        Ok(())
    } else {
        Err(FirewallError::Command {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
