//! Échantillonnage de la table des connexions
//!
//! Ce module lit la table des connexions TCP du système et produit, pour
//! l'instant présent, le nombre de connexions établies par IP distante.

use crate::errors::SampleError;
use crate::models::{ConnectionEntry, ConnectionSample, TcpState};
use async_trait::async_trait;
use log::debug;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

pub const PROC_NET_TCP: &str = "/proc/net/tcp";
pub const PROC_NET_TCP6: &str = "/proc/net/tcp6";

/// Fournit la table des connexions inet du système
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    async fn list_connections(&self) -> Result<Vec<ConnectionEntry>, SampleError>;
}

/// Compte les connexions établies par IP distante
pub async fn sample(source: &dyn ConnectionSource) -> Result<ConnectionSample, SampleError> {
    let connections = source.list_connections().await?;

    let mut sample = ConnectionSample::new();
    for connection in connections.iter().filter(|c| c.is_established()) {
        if let Some(remote) = connection.remote {
            sample.record(remote.ip());
        }
    }

    debug!(
        "{} connexions lues, {} IPs distantes avec connexions établies",
        connections.len(),
        sample.len()
    );
    Ok(sample)
}

/// Source Linux lisant /proc/net/tcp et /proc/net/tcp6
pub struct ProcNetSource {
    tcp_path: PathBuf,
    tcp6_path: PathBuf,
}

impl ProcNetSource {
    pub fn new() -> Self {
        Self::with_paths(PROC_NET_TCP, PROC_NET_TCP6)
    }

    pub fn with_paths(tcp_path: impl Into<PathBuf>, tcp6_path: impl Into<PathBuf>) -> Self {
        Self {
            tcp_path: tcp_path.into(),
            tcp6_path: tcp6_path.into(),
        }
    }
}

impl Default for ProcNetSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionSource for ProcNetSource {
    async fn list_connections(&self) -> Result<Vec<ConnectionEntry>, SampleError> {
        let tcp_path = self.tcp_path.display().to_string();
        let content = tokio::fs::read_to_string(&self.tcp_path)
            .await
            .map_err(|source| SampleError::Io {
                path: tcp_path.clone(),
                source,
            })?;
        let mut connections = parse_proc_table(&content, &tcp_path)?;

        // tcp6 est absent lorsque IPv6 est désactivé
        let tcp6_path = self.tcp6_path.display().to_string();
        match tokio::fs::read_to_string(&self.tcp6_path).await {
            Ok(content) => connections.extend(parse_proc_table(&content, &tcp6_path)?),
            Err(e) => debug!("{} ignoré: {}", tcp6_path, e),
        }

        Ok(connections)
    }
}

/// Analyse le contenu d'un fichier au format /proc/net/tcp ou /proc/net/tcp6
pub fn parse_proc_table(content: &str, path: &str) -> Result<Vec<ConnectionEntry>, SampleError> {
    let mut connections = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        if line_num == 0 {
            continue; // En-tête
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }

        let parse_error = |details: String| SampleError::Parse {
            path: path.to_string(),
            line: line_num + 1,
            details,
        };

        let local = parse_proc_address(fields[1]).map_err(parse_error)?;
        let remote = parse_proc_address(fields[2]).map_err(parse_error)?;
        let state = u8::from_str_radix(fields[3], 16)
            .map_err(|e| parse_error(format!("état invalide {}: {}", fields[3], e)))?;

        let remote = if remote.ip().is_unspecified() && remote.port() == 0 {
            None
        } else {
            Some(remote)
        };

        connections.push(ConnectionEntry::new(local, remote, TcpState::from_code(state)));
    }

    Ok(connections)
}

/// Convertit "0100007F:1F90" en 127.0.0.1:8080
fn parse_proc_address(addr: &str) -> Result<SocketAddr, String> {
    let (ip_hex, port_hex) = addr
        .split_once(':')
        .ok_or_else(|| format!("adresse sans port: {}", addr))?;
    let ip = parse_hex_ip(ip_hex)?;
    let port = u16::from_str_radix(port_hex, 16)
        .map_err(|e| format!("port invalide {}: {}", port_hex, e))?;
    Ok(SocketAddr::new(ip, port))
}

/// Le noyau écrit l'adresse comme une suite de mots de 32 bits dans l'ordre
/// des octets de la machine.
fn parse_hex_ip(hex: &str) -> Result<IpAddr, String> {
    let word = |chunk: &str| {
        u32::from_str_radix(chunk, 16)
            .map(u32::to_ne_bytes)
            .map_err(|e| format!("adresse hexadécimale invalide {}: {}", hex, e))
    };

    match hex.len() {
        8 => Ok(IpAddr::V4(Ipv4Addr::from(word(hex)?))),
        32 => {
            let mut octets = [0u8; 16];
            for (i, chunk) in octets.chunks_mut(4).enumerate() {
                let part = hex
                    .get(i * 8..(i + 1) * 8)
                    .ok_or_else(|| format!("adresse hexadécimale invalide {}", hex))?;
                chunk.copy_from_slice(&word(part)?);
            }
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        n => Err(format!("longueur d'adresse inattendue ({}): {}", n, hex)),
    }
}
