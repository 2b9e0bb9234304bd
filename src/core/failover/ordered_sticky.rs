use std::time::{Duration, Instant};

use super::{
    FailoverError, FailoverResult, FailoverStrategy, ServerHandle, index_of, require_servers,
};

/// How often a more preferred server is probed after failing over away from it.
pub const DEFAULT_PROBE_TIME: Duration = Duration::from_secs(15 * 60);

/// Uses servers strictly in the order given, staying on the most preferred
/// server known to work.
///
/// After failing over, the strategy periodically interleaves single probe
/// attempts against the more preferred servers (one probe every
/// `servers.len()` selections). A probe only moves the preferred position when
/// the caller reports success for the probed server.
///
/// Reports for servers outside the pool are rejected with
/// [`FailoverError::UnknownServer`].
#[derive(Debug)]
pub struct OrderedStickyFailoverStrategy<S> {
    servers: Vec<S>,
    current: usize,
    probe_time: Duration,
    last_probe: Instant,
    probing: Option<usize>,
    probe_delay: usize,
}

impl<S: ServerHandle> OrderedStickyFailoverStrategy<S> {
    pub const NAME: &'static str = "ordered";
    pub const DESCRIPTION: &'static str = "Ordered Sticky with Failover";

    pub fn new(servers: Vec<S>) -> FailoverResult<Self> {
        Self::with_probe_time(servers, DEFAULT_PROBE_TIME)
    }

    pub fn with_probe_time(servers: Vec<S>, probe_time: Duration) -> FailoverResult<Self> {
        let servers = require_servers(servers)?;
        Ok(Self {
            servers,
            current: 0,
            probe_time,
            last_probe: Instant::now(),
            probing: None,
            probe_delay: 0,
        })
    }

    /// Index of the most preferred server currently believed to be up.
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn probe_time(&self) -> Duration {
        self.probe_time
    }

    fn require_index(&self, server: &S) -> FailoverResult<usize> {
        index_of(&self.servers, server).ok_or(FailoverError::UnknownServer)
    }
}

impl<S: ServerHandle> FailoverStrategy<S> for OrderedStickyFailoverStrategy<S> {
    fn select_service(&mut self) -> S {
        if self.current == 0 {
            return self.servers[0].clone();
        }

        if self.probing.is_none() && self.last_probe.elapsed() >= self.probe_time {
            self.last_probe = Instant::now();
            self.probing = Some(0);
            self.probe_delay = 0;
        }

        if let Some(probe) = self.probing {
            if self.probe_delay == 0 {
                // Next retry of a preferred server is `servers.len()` selections away.
                self.probe_delay = self.servers.len() - 1;
                let next = probe + 1;
                self.probing = (next < self.current).then_some(next);
                tracing::debug!(probe, current = self.current, "Probing preferred server");
                return self.servers[probe].clone();
            }
            self.probe_delay -= 1;
        }

        self.servers[self.current].clone()
    }

    fn report_failure(&mut self, server: &S) -> FailoverResult<()> {
        let index = self.require_index(server)?;
        if index == self.current {
            self.current += 1;
            if self.current >= self.servers.len() {
                self.current = 0;
            }
            self.last_probe = Instant::now();
            self.probing = None;
        }
        Ok(())
    }

    fn report_success(&mut self, server: &S) -> FailoverResult<()> {
        let index = self.require_index(server)?;
        if index < self.current {
            self.current = index;
            if self.probing.is_some_and(|probe| probe >= index) {
                self.probing = None;
            }
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
    use std::thread::sleep;

    use super::*;

    fn servers() -> Vec<char> {
        vec!['A', 'B', 'C']
    }

    #[test]
    fn test_prefers_first_server() {
        let mut strategy = OrderedStickyFailoverStrategy::new(servers()).unwrap();
        assert_eq!(strategy.select_service(), 'A');
        assert_eq!(strategy.select_service(), 'A');
    }

    #[test]
    fn test_failover_and_recovery() {
        let mut strategy = OrderedStickyFailoverStrategy::new(servers()).unwrap();
        strategy.report_failure(&'A').unwrap();
        assert_eq!(strategy.select_service(), 'B');

        strategy.report_success(&'A').unwrap();
        assert_eq!(strategy.select_service(), 'A');
    }

    #[test]
    fn test_failure_of_non_current_server_ignored() {
        let mut strategy = OrderedStickyFailoverStrategy::new(servers()).unwrap();
        strategy.report_failure(&'C').unwrap();
        assert_eq!(strategy.current_index(), 0);
    }

    #[test]
    fn test_success_of_less_preferred_server_ignored() {
        let mut strategy = OrderedStickyFailoverStrategy::new(servers()).unwrap();
        strategy.report_failure(&'A').unwrap();
        strategy.report_success(&'C').unwrap();
        assert_eq!(strategy.current_index(), 1);
    }

    #[test]
    fn test_wraps_to_first_after_last_fails() {
        let mut strategy = OrderedStickyFailoverStrategy::new(servers()).unwrap();
        strategy.report_failure(&'A').unwrap();
        strategy.report_failure(&'B').unwrap();
        strategy.report_failure(&'C').unwrap();
        assert_eq!(strategy.current_index(), 0);
        assert_eq!(strategy.select_service(), 'A');
    }

    #[test]
    fn test_unknown_server_rejected() {
        let mut strategy = OrderedStickyFailoverStrategy::new(servers()).unwrap();
        assert_eq!(
            strategy.report_failure(&'Z').unwrap_err(),
            FailoverError::UnknownServer
        );
        assert_eq!(
            strategy.report_success(&'Z').unwrap_err(),
            FailoverError::UnknownServer
        );
    }

    #[test]
    fn test_no_probe_before_probe_time() {
        let mut strategy =
            OrderedStickyFailoverStrategy::with_probe_time(servers(), Duration::from_secs(3600))
                .unwrap();
        strategy.report_failure(&'A').unwrap();
        for _ in 0..10 {
            assert_eq!(strategy.select_service(), 'B');
        }
    }

    #[test]
    fn test_probes_preferred_servers_in_order() {
        let mut strategy =
            OrderedStickyFailoverStrategy::with_probe_time(servers(), Duration::from_millis(200))
                .unwrap();
        strategy.report_failure(&'A').unwrap();
        strategy.report_failure(&'B').unwrap();
        assert_eq!(strategy.select_service(), 'C');

        sleep(Duration::from_millis(250));

        let picks: Vec<_> = (0..7).map(|_| strategy.select_service()).collect();
        assert_eq!(picks, vec!['A', 'C', 'C', 'B', 'C', 'C', 'C']);
        // Probing alone never moves the preferred server.
        assert_eq!(strategy.current_index(), 2);
    }

    #[test]
    fn test_preferred_retry_every_pool_size_selections() {
        let pool: Vec<u8> = (0..5).collect();
        let mut strategy =
            OrderedStickyFailoverStrategy::with_probe_time(pool.clone(), Duration::ZERO).unwrap();
        for server in &pool {
            if *server == 4 {
                break;
            }
            strategy.report_failure(server).unwrap();
        }
        assert_eq!(strategy.current_index(), 4);

        let picks: Vec<_> = (0..16).map(|_| strategy.select_service()).collect();
        let retry_positions: Vec<_> = picks
            .iter()
            .enumerate()
            .filter(|(_, server)| **server != 4)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(retry_positions, vec![0, 5, 10, 15]);
        assert_eq!(&picks[..6], &[0, 4, 4, 4, 4, 1]);
    }

    #[test]
    fn test_unbounded_interval_stays_on_current() {
        let mut strategy =
            OrderedStickyFailoverStrategy::with_probe_time(servers(), Duration::MAX).unwrap();
        strategy.report_failure(&'A').unwrap();
        for _ in 0..10 {
            assert_eq!(strategy.select_service(), 'B');
        }
    }

    #[test]
    fn test_successful_probe_snaps_back() {
        let mut strategy =
            OrderedStickyFailoverStrategy::with_probe_time(servers(), Duration::from_millis(50))
                .unwrap();
        strategy.report_failure(&'A').unwrap();
        sleep(Duration::from_millis(80));

        let probed = strategy.select_service();
        assert_eq!(probed, 'A');
        strategy.report_success(&probed).unwrap();
        assert_eq!(strategy.current_index(), 0);
        assert_eq!(strategy.select_service(), 'A');
    }
}
