//! Affichage terminal du moniteur

use crate::models::Suspect;
use chrono::{DateTime, Local};
use std::io::{self, Write};
use std::net::IpAddr;

const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const RED: &str = "\x1b[91m";
const BLUE: &str = "\x1b[94m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

pub fn clear_console() {
    print!("\x1b[2J\x1b[1;1H");
    let _ = io::stdout().flush();
}

pub fn banner() {
    println!("{}{}🔍 Surveillance des connexions...{}", BLUE, BOLD, RESET);
}

pub fn status(now: DateTime<Local>) {
    println!(
        "{}📡 {} - Vérification des connexions...{}",
        YELLOW,
        now.format("%Y-%m-%d %H:%M:%S"),
        RESET
    );
}

pub fn alert(suspect: &Suspect) {
    println!(
        "{}{}⚠️  ACTIVITÉ ÉLEVÉE: {} avec {} connexions simultanées suspectes.{}",
        RED, BOLD, suspect.ip, suspect.count, RESET
    );
}

pub fn blocking(ip: IpAddr) {
    println!("{}🚫 BLOCAGE DE L'IP: {} via iptables...{}", YELLOW, ip, RESET);
}

pub fn blocked(ip: IpAddr) {
    println!("{}✔️  IP {} bloquée avec succès.{}", GREEN, ip, RESET);
}

pub fn shutdown() {
    println!("\n{}{}🚦 Surveillance arrêtée.{}", YELLOW, BOLD, RESET);
}
