use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use zwatch::errors::{FirewallError, SampleError};
use zwatch::{
    AuditLogger, AuditSink, ConnectionEntry, ConnectionSource, Firewall, MitigationOutcome, Mitigator, Monitor,
    MonitorSettings, MonitorState, TcpState,
};

type Frame = Result<Vec<ConnectionEntry>, SampleError>;

/// Source rejouant une suite de tables de connexions, la dernière étant répétée
struct ScriptedSource {
    frames: Mutex<VecDeque<Frame>>,
    calls: AtomicUsize,
    stop_after: Option<(usize, watch::Sender<bool>)>,
}

impl ScriptedSource {
    fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: Mutex::new(frames.into()),
            calls: AtomicUsize::new(0),
            stop_after: None,
        }
    }

    fn stopping_after(mut self, calls: usize, stop: watch::Sender<bool>) -> Self {
        self.stop_after = Some((calls, stop));
        self
    }
}

#[async_trait]
impl ConnectionSource for ScriptedSource {
    async fn list_connections(&self) -> Result<Vec<ConnectionEntry>, SampleError> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, stop)) = &self.stop_after {
            if calls >= *limit {
                let _ = stop.send(true);
            }
        }

        let mut frames = self.frames.lock().unwrap();
        let frame = if frames.len() > 1 {
            frames.pop_front()
        } else {
            None
        };
        match frame {
            Some(frame) => frame,
            None => match frames.front() {
                Some(Ok(entries)) => Ok(entries.clone()),
                _ => Ok(Vec::new()),
            },
        }
    }
}

#[derive(Default)]
struct RecordingFirewall {
    blocks: Mutex<Vec<IpAddr>>,
}

#[async_trait]
impl Firewall for RecordingFirewall {
    async fn block(&self, ip: IpAddr) -> Result<(), FirewallError> {
        self.blocks.lock().unwrap().push(ip);
        Ok(())
    }

    async fn terminate_existing_connections(&self, _ip: IpAddr) -> Result<(), FirewallError> {
        Ok(())
    }
}

#[derive(Default)]
struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl AuditSink for MemorySink {
    fn append(&self, line: &str) -> io::Result<()> {
        self.lines.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

/// Pare-feu qui demande l'arrêt pendant qu'il installe la règle
struct StoppingFirewall {
    blocks: Mutex<Vec<IpAddr>>,
    stop: watch::Sender<bool>,
}

#[async_trait]
impl Firewall for StoppingFirewall {
    async fn block(&self, ip: IpAddr) -> Result<(), FirewallError> {
        self.blocks.lock().unwrap().push(ip);
        let _ = self.stop.send(true);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(())
    }

    async fn terminate_existing_connections(&self, _ip: IpAddr) -> Result<(), FirewallError> {
        Ok(())
    }
}

fn connections(remote: &str, count: usize) -> Vec<ConnectionEntry> {
    let local: SocketAddr = "192.0.2.1:443".parse().unwrap();
    let remote_ip: IpAddr = remote.parse().unwrap();
    (0..count)
        .map(|i| {
            ConnectionEntry::new(
                local,
                Some(SocketAddr::new(remote_ip, 30000 + i as u16)),
                TcpState::Established,
            )
        })
        .collect()
}

fn settings(block_enabled: bool) -> MonitorSettings {
    MonitorSettings {
        threshold: 100,
        interval: Duration::from_millis(5),
        block_enabled,
        exclude_blocked: false,
        clear_console: false,
    }
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_flood_is_blocked_once_across_cycles() {
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(connections("10.0.0.5", 150)),
        Ok(connections("10.0.0.5", 200)),
    ]));
    let firewall = Arc::new(RecordingFirewall::default());
    let audit = Arc::new(MemorySink::default());
    let mitigator = Mitigator::new(firewall.clone(), audit.clone());
    let mut monitor = Monitor::new(settings(true), source, mitigator);

    let first = monitor.run_cycle().await.unwrap();
    assert_eq!(first.suspects.len(), 1);
    assert_eq!(first.suspects[0].count, 150);
    assert_eq!(first.outcome_for(&ip("10.0.0.5")), Some(MitigationOutcome::Blocked));
    assert_eq!(monitor.blocked().len(), 1);
    assert_eq!(audit.lines.lock().unwrap().len(), 1);

    // L'IP reste détectée mais n'est pas rebloquée
    let second = monitor.run_cycle().await.unwrap();
    assert_eq!(second.suspects.len(), 1);
    assert_eq!(second.suspects[0].count, 200);
    assert_eq!(second.outcome_for(&ip("10.0.0.5")), Some(MitigationOutcome::AlreadyBlocked));

    assert_eq!(firewall.blocks.lock().unwrap().as_slice(), &[ip("10.0.0.5")]);
    assert_eq!(audit.lines.lock().unwrap().len(), 1);
    assert_eq!(monitor.state(), MonitorState::Idle);
}

#[tokio::test]
async fn test_report_only_mode_never_blocks() {
    let source = Arc::new(ScriptedSource::new(vec![Ok(connections("10.0.0.5", 150))]));
    let firewall = Arc::new(RecordingFirewall::default());
    let audit = Arc::new(MemorySink::default());
    let mitigator = Mitigator::new(firewall.clone(), audit.clone());
    let mut monitor = Monitor::new(settings(false), source, mitigator);

    let report = monitor.run_cycle().await.unwrap();
    assert_eq!(report.suspects.len(), 1);
    assert!(report.outcomes.is_empty());

    // Toujours suspecte au cycle suivant, mais signalée une seule fois
    let second = monitor.run_cycle().await.unwrap();
    assert_eq!(second.suspects.len(), 1);

    assert!(firewall.blocks.lock().unwrap().is_empty());
    assert!(monitor.blocked().is_empty());
    let lines = audit.lines.lock().unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("ALERTE: 10.0.0.5 avec 150 connexions suspectes."));
}

#[tokio::test]
async fn test_boundary_and_mapped_addresses() {
    let mut entries = connections("::ffff:203.0.113.7", 60);
    entries.extend(connections("203.0.113.7", 40));
    entries.extend(connections("198.51.100.9", 99));
    let source = Arc::new(ScriptedSource::new(vec![Ok(entries)]));
    let firewall = Arc::new(RecordingFirewall::default());
    let mitigator = Mitigator::new(firewall.clone(), Arc::new(MemorySink::default()));
    let mut monitor = Monitor::new(settings(true), source, mitigator);

    let report = monitor.run_cycle().await.unwrap();
    assert_eq!(report.remote_ips, 2);
    assert_eq!(report.suspects.len(), 1);
    assert_eq!(report.suspects[0].ip, ip("203.0.113.7"));
    assert_eq!(report.suspects[0].count, 100);
    assert_eq!(firewall.blocks.lock().unwrap().as_slice(), &[ip("203.0.113.7")]);
}

#[tokio::test]
async fn test_non_established_connections_are_ignored() {
    let local: SocketAddr = "192.0.2.1:443".parse().unwrap();
    let remote: SocketAddr = "10.0.0.5:40000".parse().unwrap();
    let mut entries = vec![ConnectionEntry::new(local, Some(remote), TcpState::TimeWait); 150];
    entries.push(ConnectionEntry::new(local, None, TcpState::Listen));
    let source = Arc::new(ScriptedSource::new(vec![Ok(entries)]));
    let mitigator = Mitigator::new(Arc::new(RecordingFirewall::default()), Arc::new(MemorySink::default()));
    let mut monitor = Monitor::new(settings(true), source, mitigator);

    let report = monitor.run_cycle().await.unwrap();
    assert_eq!(report.remote_ips, 0);
    assert!(report.suspects.is_empty());
}

#[tokio::test]
async fn test_exclude_blocked_hides_blocked_ips() {
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(connections("10.0.0.5", 150)),
        Ok(connections("10.0.0.5", 200)),
    ]));
    let mitigator = Mitigator::new(Arc::new(RecordingFirewall::default()), Arc::new(MemorySink::default()));
    let mut monitor = Monitor::new(
        MonitorSettings {
            exclude_blocked: true,
            ..settings(true)
        },
        source,
        mitigator,
    );

    monitor.run_cycle().await.unwrap();
    let second = monitor.run_cycle().await.unwrap();
    assert_eq!(second.remote_ips, 0);
    assert!(second.suspects.is_empty());
    assert_eq!(monitor.blocked().len(), 1);
}

#[tokio::test]
async fn test_sampling_failure_skips_cycle() {
    let source = Arc::new(ScriptedSource::new(vec![
        Err(SampleError::Unavailable("permission refusée".to_string())),
        Ok(connections("10.0.0.5", 150)),
    ]));
    let mitigator = Mitigator::new(Arc::new(RecordingFirewall::default()), Arc::new(MemorySink::default()));
    let mut monitor = Monitor::new(settings(true), source, mitigator);

    assert!(monitor.run_cycle().await.is_err());
    assert_eq!(monitor.state(), MonitorState::Idle);
    assert_eq!(monitor.completed_cycles(), 0);

    let report = monitor.run_cycle().await.unwrap();
    assert_eq!(report.outcome_for(&ip("10.0.0.5")), Some(MitigationOutcome::Blocked));
    assert_eq!(monitor.completed_cycles(), 1);
}

#[tokio::test]
async fn test_loop_survives_sampling_failure() {
    let (stop_tx, stop_rx) = watch::channel(false);
    let source = Arc::new(
        ScriptedSource::new(vec![
            Err(SampleError::Unavailable("permission refusée".to_string())),
            Ok(connections("10.0.0.5", 150)),
            Ok(connections("10.0.0.5", 150)),
        ])
        .stopping_after(3, stop_tx),
    );
    let firewall = Arc::new(RecordingFirewall::default());
    let mitigator = Mitigator::new(firewall.clone(), Arc::new(MemorySink::default()));
    let mut monitor = Monitor::new(settings(true), source.clone(), mitigator);

    tokio::time::timeout(Duration::from_secs(5), monitor.run(stop_rx))
        .await
        .expect("la boucle aurait dû s'arrêter");

    assert!(source.calls.load(Ordering::SeqCst) >= 3);
    assert!(monitor.completed_cycles() >= 1);
    assert_eq!(firewall.blocks.lock().unwrap().as_slice(), &[ip("10.0.0.5")]);
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[tokio::test]
async fn test_stop_interrupts_sleep() {
    let (stop_tx, stop_rx) = watch::channel(false);
    let source = Arc::new(ScriptedSource::new(vec![Ok(Vec::new())]));
    let mitigator = Mitigator::new(Arc::new(RecordingFirewall::default()), Arc::new(MemorySink::default()));
    let mut monitor = Monitor::new(
        MonitorSettings {
            interval: Duration::from_secs(3600),
            ..settings(true)
        },
        source.clone(),
        mitigator,
    );

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = stop_tx.send(true);
        stop_tx
    });

    tokio::time::timeout(Duration::from_secs(5), monitor.run(stop_rx))
        .await
        .expect("l'arrêt aurait dû interrompre l'attente");
    let _ = stopper.await;

    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert_eq!(monitor.state(), MonitorState::Stopped);
}

#[tokio::test]
async fn test_audit_file_receives_one_line_per_block() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dos_alertes.log");
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(connections("10.0.0.5", 150)),
        Ok(connections("10.0.0.5", 180)),
    ]));
    let mitigator = Mitigator::new(Arc::new(RecordingFirewall::default()), Arc::new(AuditLogger::new(&path)));
    let mut monitor = Monitor::new(settings(true), source, mitigator);

    monitor.run_cycle().await.unwrap();
    monitor.run_cycle().await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains(" - ALERTE: 10.0.0.5 avec 150 connexions suspectes."));
}

#[tokio::test]
async fn test_stop_during_block_still_audits_it() {
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut entries = connections("10.0.0.5", 150);
    entries.extend(connections("10.0.0.6", 150));
    let source = Arc::new(ScriptedSource::new(vec![Ok(entries)]));
    let firewall = Arc::new(StoppingFirewall {
        blocks: Mutex::new(Vec::new()),
        stop: stop_tx,
    });
    let audit = Arc::new(MemorySink::default());
    let mitigator = Mitigator::new(firewall.clone(), audit.clone());
    let mut monitor = Monitor::new(settings(true), source, mitigator);

    tokio::time::timeout(Duration::from_secs(5), monitor.run(stop_rx))
        .await
        .expect("la boucle aurait dû s'arrêter");

    // Le blocage en cours va au bout, la suspecte suivante n'est pas traitée
    assert_eq!(firewall.blocks.lock().unwrap().as_slice(), &[ip("10.0.0.5")]);
    assert_eq!(monitor.blocked().len(), 1);
    assert!(monitor.blocked().contains(&ip("10.0.0.5")));
    let lines = audit.lines.lock().unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("ALERTE: 10.0.0.5 avec 150 connexions suspectes."));
    assert_eq!(monitor.state(), MonitorState::Stopped);
}
