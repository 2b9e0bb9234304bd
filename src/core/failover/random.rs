use rand::Rng;

use super::{FailoverResult, FailoverStrategy, ServerHandle, require_servers};

/// Uniform random selection over the whole pool. Reports are ignored.
#[derive(Debug)]
pub struct RandomFailoverStrategy<S> {
    servers: Vec<S>,
}

impl<S: ServerHandle> RandomFailoverStrategy<S> {
    pub const NAME: &'static str = "random";
    pub const DESCRIPTION: &'static str = "Random";

    pub fn new(servers: Vec<S>) -> FailoverResult<Self> {
        Ok(Self {
            servers: require_servers(servers)?,
        })
    }
}

impl<S: ServerHandle> FailoverStrategy<S> for RandomFailoverStrategy<S> {
    fn select_service(&mut self) -> S {
        let index = rand::rng().random_range(0..self.servers.len());
        self.servers[index].clone()
    }

    fn report_failure(&mut self, _server: &S) -> FailoverResult<()> {
        Ok(())
    }

    fn report_success(&mut self, _server: &S) -> FailoverResult<()> {
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

    #[test]
    fn test_random_selects_from_pool() {
        let servers = vec![1u16, 2, 3];
        let mut strategy = RandomFailoverStrategy::new(servers.clone()).unwrap();
        for _ in 0..50 {
            assert!(servers.contains(&strategy.select_service()));
        }
    }

    #[test]
    fn test_reports_do_not_narrow_selection() {
        let mut strategy = RandomFailoverStrategy::new(vec![1u16, 2]).unwrap();
        strategy.report_failure(&1).unwrap();
        strategy.report_failure(&2).unwrap();
        strategy.report_success(&7).unwrap();

        let seen: HashSet<_> = (0..500).map(|_| strategy.select_service()).collect();
        assert_eq!(seen, HashSet::from([1, 2]));
    }
}
