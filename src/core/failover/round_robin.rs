use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use super::{FailoverResult, FailoverStrategy, ServerHandle, index_of, require_servers};

/// How long a failed server stays out of rotation before it gets a probe.
pub const DEFAULT_PROBE_TIME: Duration = Duration::from_secs(5 * 60);

/// Rotates through the servers that are up, giving failed servers one probe
/// attempt each time their retry deadline passes.
#[derive(Debug)]
pub struct RoundRobinFailoverStrategy<S> {
    servers: Vec<S>,
    up: VecDeque<usize>,
    /// `None` when the deadline lies beyond what `Instant` can represent
    down: VecDeque<(usize, Option<Instant>)>,
    probe_time: Duration,
}

impl<S: ServerHandle> RoundRobinFailoverStrategy<S> {
    pub const NAME: &'static str = "robin";
    pub const DESCRIPTION: &'static str = "Round Robin";

    /// Create a round-robin strategy with the default five minute probe time.
    pub fn new(servers: Vec<S>) -> FailoverResult<Self> {
        Self::with_probe_time(servers, DEFAULT_PROBE_TIME)
    }

    /// Create a round-robin strategy with a custom probe time.
    pub fn with_probe_time(servers: Vec<S>, probe_time: Duration) -> FailoverResult<Self> {
        let servers = require_servers(servers)?;
        let up = (0..servers.len()).collect();
        Ok(Self {
            servers,
            up,
            down: VecDeque::new(),
            probe_time,
        })
    }

    pub fn probe_time(&self) -> Duration {
        self.probe_time
    }

    /// Servers currently in rotation.
    pub fn up_servers(&self) -> Vec<S> {
        self.up.iter().map(|&i| self.servers[i].clone()).collect()
    }

    /// Servers waiting for their probe deadline.
    pub fn down_servers(&self) -> Vec<S> {
        self.down
            .iter()
            .map(|&(i, _)| self.servers[i].clone())
            .collect()
    }
}

impl<S: ServerHandle> FailoverStrategy<S> for RoundRobinFailoverStrategy<S> {
    fn select_service(&mut self) -> S {
        let now = Instant::now();

        if let Some(pos) = self
            .down
            .iter()
            .position(|&(_, retry_at)| retry_at.is_some_and(|at| at <= now))
        {
            if let Some((index, _)) = self.down.remove(pos) {
                self.down.push_back((index, now.checked_add(self.probe_time)));
                return self.servers[index].clone();
            }
        }

        if let Some(index) = self.up.pop_front() {
            self.up.push_back(index);
            return self.servers[index].clone();
        }

        // Everything is down: plain round robin without waiting for deadlines.
        match self.down.pop_front() {
            Some(entry) => {
                self.down.push_back(entry);
                self.servers[entry.0].clone()
            }
            None => self.servers[0].clone(),
        }
    }

    fn report_failure(&mut self, server: &S) -> FailoverResult<()> {
        let Some(index) = index_of(&self.servers, server) else {
            return Ok(());
        };
        if let Some(pos) = self.up.iter().position(|&i| i == index) {
            self.up.remove(pos);
            self.down
                .push_back((index, Instant::now().checked_add(self.probe_time)));
        }
        Ok(())
    }

    fn report_success(&mut self, server: &S) -> FailoverResult<()> {
        let Some(index) = index_of(&self.servers, server) else {
            return Ok(());
        };
        if let Some(pos) = self.down.iter().position(|&(i, _)| i == index) {
            self.down.remove(pos);
            self.up.push_back(index);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn servers() -> Vec<&'static str> {
        vec!["server1", "server2", "server3"]
    }

    #[test]
    fn test_round_robin_visits_each_server_once_per_cycle() {
        let mut strategy = RoundRobinFailoverStrategy::new(servers()).unwrap();

        for _ in 0..3 {
            let cycle: Vec<_> = (0..3).map(|_| strategy.select_service()).collect();
            assert_eq!(cycle, servers());
        }
    }

    #[test]
    fn test_failed_server_skipped_until_probe() {
        let mut strategy = RoundRobinFailoverStrategy::new(servers()).unwrap();
        strategy.report_failure(&"server2").unwrap();

        let picks: HashSet<_> = (0..10).map(|_| strategy.select_service()).collect();
        assert!(!picks.contains("server2"));
        assert_eq!(strategy.down_servers(), vec!["server2"]);
    }

    #[test]
    fn test_expired_deadline_gives_one_probe() {
        let mut strategy =
            RoundRobinFailoverStrategy::with_probe_time(servers(), Duration::ZERO).unwrap();
        strategy.report_failure(&"server1").unwrap();

        // Deadline already elapsed, so the down server is tried before `up`.
        assert_eq!(strategy.select_service(), "server1");
        assert_eq!(strategy.down_servers(), vec!["server1"]);
    }

    #[test]
    fn test_pending_deadline_not_probed() {
        let mut strategy =
            RoundRobinFailoverStrategy::with_probe_time(servers(), Duration::from_secs(3600))
                .unwrap();
        strategy.report_failure(&"server1").unwrap();

        assert_eq!(strategy.select_service(), "server2");
        assert_eq!(strategy.select_service(), "server3");
        assert_eq!(strategy.select_service(), "server2");
    }

    #[test]
    fn test_unbounded_retry_time_keeps_server_down() {
        let mut strategy =
            RoundRobinFailoverStrategy::with_probe_time(servers(), Duration::MAX).unwrap();
        strategy.report_failure(&"server1").unwrap();

        let picks: Vec<_> = (0..4).map(|_| strategy.select_service()).collect();
        assert_eq!(picks, vec!["server2", "server3", "server2", "server3"]);

        // With everything down the rotation still works.
        strategy.report_failure(&"server2").unwrap();
        strategy.report_failure(&"server3").unwrap();
        let cycle: Vec<_> = (0..3).map(|_| strategy.select_service()).collect();
        assert_eq!(cycle, servers());
    }

    #[test]
    fn test_all_down_round_robins_through_down() {
        let mut strategy =
            RoundRobinFailoverStrategy::with_probe_time(servers(), Duration::from_secs(3600))
                .unwrap();
        for s in servers() {
            strategy.report_failure(&s).unwrap();
        }

        let cycle: Vec<_> = (0..3).map(|_| strategy.select_service()).collect();
        assert_eq!(cycle, servers());
    }

    #[test]
    fn test_success_returns_server_to_rotation() {
        let mut strategy = RoundRobinFailoverStrategy::new(servers()).unwrap();
        strategy.report_failure(&"server1").unwrap();
        strategy.report_success(&"server1").unwrap();

        assert!(strategy.down_servers().is_empty());
        assert_eq!(strategy.up_servers(), vec!["server2", "server3", "server1"]);
    }

    #[test]
    fn test_unknown_server_ignored() {
        let mut strategy = RoundRobinFailoverStrategy::new(servers()).unwrap();
        assert!(strategy.report_failure(&"bogus").is_ok());
        assert_eq!(strategy.up_servers().len(), 3);
    }
}
