use crate::models::{ConnectionSample, Suspect};

/// Retourne les IPs dont le nombre de connexions atteint `threshold`,
/// dans l'ordre de l'échantillon
pub fn detect(sample: &ConnectionSample, threshold: u32) -> Vec<Suspect> {
    sample
        .iter()
        .filter(|(_, count)| *count >= threshold)
        .map(|(ip, count)| Suspect { ip, count })
        .collect()
}
