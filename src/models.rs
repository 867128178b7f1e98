use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// État TCP tel que codé par le noyau Linux dans /proc/net/tcp
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TcpState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Close,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    NewSynRecv,
    Unknown(u8),
}

impl TcpState {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => TcpState::Established,
            0x02 => TcpState::SynSent,
            0x03 => TcpState::SynRecv,
            0x04 => TcpState::FinWait1,
            0x05 => TcpState::FinWait2,
            0x06 => TcpState::TimeWait,
            0x07 => TcpState::Close,
            0x08 => TcpState::CloseWait,
            0x09 => TcpState::LastAck,
            0x0A => TcpState::Listen,
            0x0B => TcpState::Closing,
            0x0C => TcpState::NewSynRecv,
            other => TcpState::Unknown(other),
        }
    }
}

/// Une connexion de la table du système
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionEntry {
    pub local: SocketAddr,
    /// Absente pour les sockets en écoute (0.0.0.0:0)
    pub remote: Option<SocketAddr>,
    pub state: TcpState,
}

impl ConnectionEntry {
    pub fn new(local: SocketAddr, remote: Option<SocketAddr>, state: TcpState) -> Self {
        Self { local, remote, state }
    }

    pub fn is_established(&self) -> bool {
        self.state == TcpState::Established && self.remote.is_some()
    }
}

/// Ramène une adresse IPv6 de la forme `::ffff:a.b.c.d` à son IPv4
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

/// Nombre de connexions établies par IP distante pour un cycle.
///
/// L'ordre d'itération est l'ordre de première apparition de chaque IP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSample {
    counts: Vec<(IpAddr, u32)>,
    index: HashMap<IpAddr, usize>,
}

impl ConnectionSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compte une connexion supplémentaire pour `ip`
    pub fn record(&mut self, ip: IpAddr) {
        self.add(ip, 1);
    }

    pub fn add(&mut self, ip: IpAddr, count: u32) {
        let ip = normalize_ip(ip);
        match self.index.get(&ip) {
            Some(&position) => self.counts[position].1 += count,
            None => {
                self.index.insert(ip, self.counts.len());
                self.counts.push((ip, count));
            }
        }
    }

    pub fn count(&self, ip: &IpAddr) -> u32 {
        self.index
            .get(&normalize_ip(*ip))
            .map(|&position| self.counts[position].1)
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (IpAddr, u32)> + '_ {
        self.counts.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total_connections(&self) -> u64 {
        self.counts.iter().map(|(_, count)| *count as u64).sum()
    }

    /// Retire de l'échantillon les IPs déjà bloquées
    pub fn without(&self, blocked: &BlockedSet) -> ConnectionSample {
        self.iter()
            .filter(|(ip, _)| !blocked.contains(ip))
            .collect()
    }

    /// Les `n` IPs les plus actives, par nombre de connexions décroissant
    pub fn top(&self, n: usize) -> Vec<(IpAddr, u32)> {
        let mut sorted = self.counts.clone();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted.truncate(n);
        sorted
    }
}

impl FromIterator<(IpAddr, u32)> for ConnectionSample {
    fn from_iter<I: IntoIterator<Item = (IpAddr, u32)>>(iter: I) -> Self {
        let mut sample = ConnectionSample::new();
        for (ip, count) in iter {
            sample.add(ip, count);
        }
        sample
    }
}

/// IP ayant atteint le seuil pendant un cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Suspect {
    pub ip: IpAddr,
    pub count: u32,
}

impl fmt::Display for Suspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} connexions)", self.ip, self.count)
    }
}

/// Résultat d'une tentative de mitigation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MitigationOutcome {
    /// Règle installée, IP ajoutée aux bloquées
    Blocked,
    /// IP déjà bloquée par ce processus, rien n'a été fait
    AlreadyBlocked,
    /// IP en liste blanche, jamais bloquée
    Exempt,
    /// Le pare-feu a refusé, l'IP sera retentée au prochain cycle
    Failed,
}

/// Ensemble des IPs déjà bloquées par ce processus.
///
/// Ne fait que grandir : aucune opération ne retire une IP.
#[derive(Debug, Clone, Default)]
pub struct BlockedSet {
    ips: HashSet<IpAddr>,
}

impl BlockedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.ips.contains(&normalize_ip(*ip))
    }

    /// Retourne `false` si l'IP était déjà présente
    pub fn insert(&mut self, ip: IpAddr) -> bool {
        self.ips.insert(normalize_ip(ip))
    }

    pub fn len(&self) -> usize {
        self.ips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty()
    }
}

/// État de la boucle de surveillance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Sampling,
    Evaluating,
    Mitigating,
    Stopped,
}

/// Bilan d'un cycle de surveillance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleReport {
    pub remote_ips: usize,
    pub total_connections: u64,
    pub suspects: Vec<Suspect>,
    pub outcomes: Vec<(IpAddr, MitigationOutcome)>,
}

impl CycleReport {
    pub fn outcome_for(&self, ip: &IpAddr) -> Option<MitigationOutcome> {
        self.outcomes
            .iter()
            .find(|(candidate, _)| candidate == ip)
            .map(|(_, outcome)| *outcome)
    }
}
