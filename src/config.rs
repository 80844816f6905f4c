use crate::consts::{DEFAULT_DEADLINE, DEFAULT_UDP_CHUNK_SIZE};
use crate::tracker::Tracker;
use std::time::Duration;

/// Everything a `Scraper` needs to know about how to query trackers
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ScrapeConfig {
    /// The trackers to query
    pub(crate) trackers: Vec<Tracker>,

    /// Time allowed for each individual network operation.  A UDP exchange
    /// gets a fresh window for each of its connect and scrape phases.
    pub(crate) deadline: Duration,

    /// Maximum number of info hashes to put in one UDP scrape request
    pub(crate) udp_chunk_size: usize,
}

impl ScrapeConfig {
    pub(crate) fn new(trackers: Vec<Tracker>) -> ScrapeConfig {
        ScrapeConfig {
            trackers,
            deadline: DEFAULT_DEADLINE,
            udp_chunk_size: DEFAULT_UDP_CHUNK_SIZE,
        }
    }

    pub(crate) fn with_deadline(mut self, deadline: Duration) -> ScrapeConfig {
        self.deadline = deadline;
        self
    }

    pub(crate) fn with_udp_chunk_size(mut self, size: usize) -> ScrapeConfig {
        self.udp_chunk_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_overrides() {
        let tr = "udp://tracker.example.com:6969/announce"
            .parse::<Tracker>()
            .unwrap();
        let cfg = ScrapeConfig::new(vec![tr.clone()]);
        assert_eq!(cfg.deadline, Duration::from_secs(1));
        assert_eq!(cfg.udp_chunk_size, 74);
        let cfg = cfg
            .with_deadline(Duration::from_millis(250))
            .with_udp_chunk_size(10);
        assert_eq!(
            cfg,
            ScrapeConfig {
                trackers: vec![tr],
                deadline: Duration::from_millis(250),
                udp_chunk_size: 10,
            }
        );
    }
}
