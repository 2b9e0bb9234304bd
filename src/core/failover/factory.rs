use std::{fmt, str::FromStr, time::Duration};

use super::{
    FailoverError, FailoverResult, FailoverStrategy, OrderedStickyFailoverStrategy,
    RandomFailoverStrategy, RoundRobinFailoverStrategy, ServerHandle, StickyFailoverStrategy,
};

/// The closed set of available failover strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailoverStrategyKind {
    Sticky,
    RoundRobin,
    Random,
    OrderedSticky,
}

impl FailoverStrategyKind {
    /// Every strategy in presentation order.
    pub const ALL: [FailoverStrategyKind; 4] = [
        FailoverStrategyKind::OrderedSticky,
        FailoverStrategyKind::Sticky,
        FailoverStrategyKind::RoundRobin,
        FailoverStrategyKind::Random,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FailoverStrategyKind::Sticky => StickyFailoverStrategy::<String>::NAME,
            FailoverStrategyKind::RoundRobin => RoundRobinFailoverStrategy::<String>::NAME,
            FailoverStrategyKind::Random => RandomFailoverStrategy::<String>::NAME,
            FailoverStrategyKind::OrderedSticky => OrderedStickyFailoverStrategy::<String>::NAME,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FailoverStrategyKind::Sticky => StickyFailoverStrategy::<String>::DESCRIPTION,
            FailoverStrategyKind::RoundRobin => RoundRobinFailoverStrategy::<String>::DESCRIPTION,
            FailoverStrategyKind::Random => RandomFailoverStrategy::<String>::DESCRIPTION,
            FailoverStrategyKind::OrderedSticky => {
                OrderedStickyFailoverStrategy::<String>::DESCRIPTION
            }
        }
    }

    /// Case-insensitive lookup by strategy name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Build a strategy of this kind. `probe_time` overrides the default probe
    /// interval for the strategies that have one and is ignored otherwise.
    pub fn build<S: ServerHandle>(
        self,
        servers: Vec<S>,
        probe_time: Option<Duration>,
    ) -> FailoverResult<Box<dyn FailoverStrategy<S>>> {
        let strategy: Box<dyn FailoverStrategy<S>> = match self {
            FailoverStrategyKind::Sticky => Box::new(StickyFailoverStrategy::new(servers)?),
            FailoverStrategyKind::RoundRobin => match probe_time {
                Some(t) => Box::new(RoundRobinFailoverStrategy::with_probe_time(servers, t)?),
                None => Box::new(RoundRobinFailoverStrategy::new(servers)?),
            },
            FailoverStrategyKind::Random => Box::new(RandomFailoverStrategy::new(servers)?),
            FailoverStrategyKind::OrderedSticky => match probe_time {
                Some(t) => Box::new(OrderedStickyFailoverStrategy::with_probe_time(servers, t)?),
                None => Box::new(OrderedStickyFailoverStrategy::new(servers)?),
            },
        };
        Ok(strategy)
    }
}

impl FromStr for FailoverStrategyKind {
    type Err = FailoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| FailoverError::UnknownStrategy(s.to_string()))
    }
}

impl fmt::Display for FailoverStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Factory for creating failover strategies by name or kind
pub struct FailoverStrategyFactory;

impl FailoverStrategyFactory {
    /// Create a strategy from its configured name (case-insensitive).
    pub fn create_failover_strategy<S: ServerHandle>(
        name: &str,
        servers: Vec<S>,
    ) -> FailoverResult<Box<dyn FailoverStrategy<S>>> {
        let kind: FailoverStrategyKind = name.parse()?;
        kind.build(servers, None)
    }

    /// Create a strategy from a typed kind with an optional probe interval.
    pub fn create<S: ServerHandle>(
        kind: FailoverStrategyKind,
        servers: Vec<S>,
        probe_time: Option<Duration>,
    ) -> FailoverResult<Box<dyn FailoverStrategy<S>>> {
        kind.build(servers, probe_time)
    }

    /// `(name, description)` pairs for every available strategy.
    pub fn strategies() -> Vec<(&'static str, &'static str)> {
        FailoverStrategyKind::ALL
            .into_iter()
            .map(|kind| (kind.name(), kind.description()))
            .collect()
    }
}
