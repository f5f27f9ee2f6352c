//! Executable discovery as an ordered fallback chain.
//!
//! Two probe variants: a search of the executable PATH and an enumeration of
//! well-known installation paths. Chains are walked in order; the first hit
//! wins and a full miss is a plain `None` for the caller to turn into a
//! remediation.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum Locator {
    /// Probe the executable search path for any of these names.
    PathProbe { names: Vec<String> },
    /// Check these absolute candidate paths for an existing file.
    KnownPaths { candidates: Vec<PathBuf> },
}

impl Locator {
    pub fn locate(&self) -> Option<PathBuf> {
        match self {
            Self::PathProbe { names } => {
                names.iter().find_map(|name| which::which(name).ok())
            }
            Self::KnownPaths { candidates } => {
                candidates.iter().find(|path| path.exists()).cloned()
            }
        }
    }
}

/// Walks the chain in order and returns the first located executable.
pub fn locate_first(chain: &[Locator]) -> Option<PathBuf> {
    chain.iter().find_map(Locator::locate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_paths_returns_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.exe");
        let present = dir.path().join("present.exe");
        std::fs::write(&present, b"").unwrap();

        let locator = Locator::KnownPaths {
            candidates: vec![missing, present.clone()],
        };
        assert_eq!(locator.locate(), Some(present));
    }

    #[test]
    fn known_paths_misses_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let locator = Locator::KnownPaths {
            candidates: vec![dir.path().join("missing.exe")],
        };
        assert!(locator.locate().is_none());
    }

    #[test]
    fn path_probe_misses_for_unlikely_name() {
        let locator = Locator::PathProbe {
            names: vec!["qvp-no-such-binary-5f2a".to_string()],
        };
        assert!(locator.locate().is_none());
    }

    #[test]
    fn chain_returns_first_hit_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        std::fs::write(&first, b"").unwrap();
        std::fs::write(&second, b"").unwrap();

        let chain = vec![
            Locator::KnownPaths {
                candidates: vec![dir.path().join("missing")],
            },
            Locator::KnownPaths {
                candidates: vec![first.clone()],
            },
            Locator::KnownPaths {
                candidates: vec![second],
            },
        ];
        assert_eq!(locate_first(&chain), Some(first));
    }

    #[test]
    fn empty_chain_is_a_miss() {
        assert!(locate_first(&[]).is_none());
    }
}
