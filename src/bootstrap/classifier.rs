//! Heuristic failure classification.
//!
//! An ordered substring scan over installer output. First matching rule wins;
//! no match means no suggestion.

use serde::{Deserialize, Serialize};

/// Operating system family, used to pick OS-specific guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostOs {
    Windows,
    MacOs,
    Linux,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            HostOs::Windows
        } else if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else {
            HostOs::Linux
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, HostOs::Windows)
    }
}

/// What kind of problem the output points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Certificate,
    Permission,
}

const RULES: &[(FailureKind, &[&str])] = &[
    (
        FailureKind::Network,
        &[
            "enotfound",
            "econnrefused",
            "econnreset",
            "etimedout",
            "eai_again",
            "getaddrinfo",
            "could not resolve",
            "unable to connect",
            "timed out",
            "timeout",
            "network",
        ],
    ),
    (
        FailureKind::Certificate,
        &[
            "unable to get local issuer",
            "self signed",
            "self-signed",
            "certificate",
            "cert_",
            "ssl",
            "tls",
        ],
    ),
    (
        FailureKind::Permission,
        &[
            "eacces",
            "eperm",
            "permission denied",
            "access is denied",
            "operation not permitted",
        ],
    ),
];

/// Classify captured output into a failure kind.
pub fn classify(stderr: &str, stdout: &str) -> Option<FailureKind> {
    let haystack = format!("{}\n{}", stderr, stdout).to_lowercase();

    RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|needle| haystack.contains(needle)))
        .map(|(kind, _)| *kind)
}

/// Translation key of the suggestion for captured output, if any.
pub fn suggestion_key(stderr: &str, stdout: &str, os: HostOs) -> Option<&'static str> {
    classify(stderr, stdout).map(|kind| match kind {
        FailureKind::Network => "suggestion.network",
        FailureKind::Certificate => "suggestion.certificate",
        FailureKind::Permission if os.is_windows() => "suggestion.permission.windows",
        FailureKind::Permission => "suggestion.permission.unix",
    })
}

/// Translation key of the suggestion shown when an installer cannot start.
pub fn spawn_suggestion_key(os: HostOs) -> &'static str {
    if os.is_windows() {
        "suggestion.spawn.windows"
    } else {
        "suggestion.spawn.unix"
    }
}
