use std::collections::VecDeque;

use rand::seq::SliceRandom;

use super::{FailoverResult, FailoverStrategy, ServerHandle, index_of, require_servers};

/// Sticks to one server until it fails, then moves on to the next one that is
/// still up.
///
/// The pool is shuffled once at construction so that independent instances
/// spread their preferred server across the pool. Recovery only happens
/// through [`report_success`](FailoverStrategy::report_success); there is no
/// timed retry.
#[derive(Debug)]
pub struct StickyFailoverStrategy<S> {
    servers: Vec<S>,
    up: VecDeque<usize>,
    down: VecDeque<usize>,
}

impl<S: ServerHandle> StickyFailoverStrategy<S> {
    pub const NAME: &'static str = "sticky";
    pub const DESCRIPTION: &'static str = "Sticky";

    /// Create a sticky strategy over `servers`.
    pub fn new(servers: Vec<S>) -> FailoverResult<Self> {
        let servers = require_servers(servers)?;
        let mut order: Vec<usize> = (0..servers.len()).collect();
        order.shuffle(&mut rand::rng());

        Ok(Self {
            servers,
            up: order.into(),
            down: VecDeque::new(),
        })
    }

    /// Servers currently considered up, in selection order.
    pub fn up_servers(&self) -> Vec<S> {
        self.up.iter().map(|&i| self.servers[i].clone()).collect()
    }

    /// Servers currently considered down, oldest failure first.
    pub fn down_servers(&self) -> Vec<S> {
        self.down.iter().map(|&i| self.servers[i].clone()).collect()
    }
}

impl<S: ServerHandle> FailoverStrategy<S> for StickyFailoverStrategy<S> {
    fn select_service(&mut self) -> S {
        let index = self
            .up
            .front()
            .or_else(|| self.down.front())
            .copied()
            .unwrap_or(0);
        self.servers[index].clone()
    }

    fn report_failure(&mut self, server: &S) -> FailoverResult<()> {
        let Some(index) = index_of(&self.servers, server) else {
            return Ok(());
        };
        if let Some(pos) = self.up.iter().position(|&i| i == index) {
            self.up.remove(pos);
            self.down.push_back(index);
        }
        Ok(())
    }

    fn report_success(&mut self, server: &S) -> FailoverResult<()> {
        let Some(index) = index_of(&self.servers, server) else {
            return Ok(());
        };
        if let Some(pos) = self.down.iter().position(|&i| i == index) {
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
