//! Erreurs des collaborateurs du moniteur
//!
//! Chaque famille d'erreur correspond à une catégorie traitée différemment
//! par la boucle : un échec d'échantillonnage saute le cycle, un échec du
//! pare-feu laisse l'IP éligible au cycle suivant, une configuration invalide
//! arrête le processus au démarrage.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Échec de l'énumération de la table des connexions
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Impossible de lire {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Ligne {line} invalide dans {path}: {details}")]
    Parse {
        path: String,
        line: usize,
        details: String,
    },

    #[error("Source de connexions indisponible: {0}")]
    Unavailable(String),
}

/// Échec d'une commande du pare-feu
#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("Impossible d'exécuter {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} a échoué ({status}): {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} n'a pas répondu après {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Erreur de chargement ou de validation de la configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Impossible d'accéder à {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Configuration JSON invalide: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration invalide: {0}")]
    Invalid(String),
}
