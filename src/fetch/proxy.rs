use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use rand::Rng;
use serde::Deserialize;
use tokio::sync::oneshot;

use crate::error::{ScrapeError, ScrapeResult};
use crate::fetch::browser::{LaunchSettings, SessionLauncher};

/// How the next candidate proxy is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxySelection {
    /// Round-robin with wraparound
    #[default]
    Sequential,
    /// Uniform over the whole list
    Random,
}

/// Egress endpoints a browser session may be launched through
#[derive(Debug, Clone)]
pub struct ProxyPool {
    proxies: Vec<String>,
    next: usize,
    selection: ProxySelection,
}

impl ProxyPool {
    pub fn new(proxies: Vec<String>, selection: ProxySelection) -> ScrapeResult<Self> {
        let proxies: Vec<String> = proxies
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if proxies.is_empty() {
            return Err(ScrapeError::InvalidConfig(
                "proxy list is empty".to_string(),
            ));
        }
        Ok(Self {
            proxies,
            next: 0,
            selection,
        })
    }

    /// One proxy per line, blank lines ignored
    pub fn from_file(path: &Path, selection: ProxySelection) -> ScrapeResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ScrapeError::ProxyFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(raw.lines().map(str::to_string).collect(), selection)
    }

    /// Build a pool from either an explicit list or a file, never both
    pub fn resolve(
        list: Option<Vec<String>>,
        list_path: Option<&Path>,
        selection: ProxySelection,
    ) -> ScrapeResult<Option<Self>> {
        match (list, list_path) {
            (Some(_), Some(_)) => Err(ScrapeError::InvalidConfig(
                "both a proxy list and a proxy list path were supplied".to_string(),
            )),
            (Some(list), None) => Self::new(list, selection).map(Some),
            (None, Some(path)) => Self::from_file(path, selection).map(Some),
            (None, None) => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn next_candidate(&mut self) -> String {
        let idx = match self.selection {
            ProxySelection::Sequential => {
                let idx = self.next;
                self.next = (self.next + 1) % self.proxies.len();
                idx
            }
            ProxySelection::Random => rand::thread_rng().gen_range(0..self.proxies.len()),
        };
        self.proxies[idx].clone()
    }
}

#[derive(Debug)]
pub enum ProbeOutcome {
    Verified,
    Failed(anyhow::Error),
    TimedOut,
}

/// A throwaway session launch on the blocking pool, used to vet one proxy.
///
/// The result comes back over a oneshot channel. If the caller gives up
/// waiting, the cancellation flag makes the worker skip launching (when it has
/// not started yet) and discard whatever it eventually produced.
pub struct ProbeTask {
    result: oneshot::Receiver<anyhow::Result<()>>,
    cancelled: Arc<AtomicBool>,
}

impl ProbeTask {
    pub fn spawn<L: SessionLauncher>(launcher: Arc<L>, settings: LaunchSettings) -> Self {
        let (tx, rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        tokio::task::spawn_blocking(move || {
            if flag.load(Ordering::SeqCst) {
                return;
            }
            // The probe session is dropped right away; only the launch matters.
            let outcome = launcher.launch(&settings).map(|_session| ());
            if flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(outcome);
        });

        Self {
            result: rx,
            cancelled,
        }
    }

    pub async fn join(self, timeout: Duration) -> ProbeOutcome {
        let ProbeTask { result, cancelled } = self;
        match tokio::time::timeout(timeout, result).await {
            Ok(Ok(Ok(()))) => ProbeOutcome::Verified,
            Ok(Ok(Err(err))) => ProbeOutcome::Failed(err),
            Ok(Err(_)) => ProbeOutcome::Failed(anyhow!("probe worker exited without a result")),
            Err(_) => {
                cancelled.store(true, Ordering::SeqCst);
                ProbeOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn sequential_selection_wraps_around() {
        let mut pool = ProxyPool::new(
            vec!["a:1".into(), "b:2".into(), "c:3".into()],
            ProxySelection::Sequential,
        )
        .unwrap();

        let picked: Vec<String> = (0..5).map(|_| pool.next_candidate()).collect();

        assert_eq!(picked, vec!["a:1", "b:2", "c:3", "a:1", "b:2"]);
    }

    #[test]
    fn random_selection_can_reach_last_entry() {
        let mut pool =
            ProxyPool::new(vec!["a:1".into(), "b:2".into()], ProxySelection::Random).unwrap();

        let picked: Vec<String> = (0..200).map(|_| pool.next_candidate()).collect();

        assert!(picked.iter().any(|p| p == "b:2"));
        assert!(picked.iter().any(|p| p == "a:1"));
    }

    #[test]
    fn list_and_path_together_is_invalid() {
        let err = ProxyPool::resolve(
            Some(vec!["a:1".into()]),
            Some(Path::new("proxies.txt")),
            ProxySelection::Sequential,
        )
        .unwrap_err();

        assert!(matches!(err, ScrapeError::InvalidConfig(_)));
    }

    #[test]
    fn empty_list_is_invalid_and_none_means_direct() {
        assert!(matches!(
            ProxyPool::new(vec!["  ".into()], ProxySelection::Sequential),
            Err(ScrapeError::InvalidConfig(_))
        ));
        assert!(ProxyPool::resolve(None, None, ProxySelection::Sequential)
            .unwrap()
            .is_none());
    }

    #[test]
    fn file_pool_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "10.0.0.1:8080\n\n10.0.0.2:8080\n").unwrap();

        let pool = ProxyPool::resolve(None, Some(file.path()), ProxySelection::Sequential)
            .unwrap()
            .unwrap();

        assert_eq!(pool.len(), 2);
    }
}
