//! Server selection policies for a fixed pool of backends.
//!
//! A [`FailoverStrategy`] is seeded once with an ordered list of opaque server
//! handles. Callers ask it for a server, perform their operation, and report the
//! outcome back so later selections can steer around failed servers.
//!
//! Strategies are plain state machines and are **not** internally synchronized:
//! every mutating operation takes `&mut self`. Wrap an instance with
//! [`make_synchronized`] to share it between threads.
use thiserror::Error;

pub mod factory;
pub mod ordered_sticky;
pub mod random;
pub mod round_robin;
pub mod routing;
pub mod sticky;
pub mod synchronized;

pub use factory::{FailoverStrategyFactory, FailoverStrategyKind};
pub use ordered_sticky::OrderedStickyFailoverStrategy;
pub use random::RandomFailoverStrategy;
pub use round_robin::RoundRobinFailoverStrategy;
pub use routing::{RoutingError, route_with_failover, route_with_failover_async};
pub use sticky::StickyFailoverStrategy;
pub use synchronized::{SynchronizedFailoverStrategy, make_synchronized};

/// Errors raised by failover strategies and their factory
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FailoverError {
    /// A strategy was constructed with an empty server list
    #[error("A failover strategy requires at least one server")]
    NoServers,

    /// No strategy is registered under the requested name
    #[error("Unknown failover strategy: {0}")]
    UnknownStrategy(String),

    /// A report referred to a server the strategy was not constructed with
    #[error("Server is not part of this failover pool")]
    UnknownServer,
}

/// Result type for failover operations
pub type FailoverResult<T> = Result<T, FailoverError>;

/// Bound shared by every server handle a strategy can select.
pub trait ServerHandle: Clone + PartialEq + Send + 'static {}

impl<T> ServerHandle for T where T: Clone + PartialEq + Send + 'static {}

/// A policy that selects one server from a fixed pool and adapts to reported
/// success or failure.
pub trait FailoverStrategy<S: ServerHandle>: Send {
    /// Pick the server to use for the next attempt.
    fn select_service(&mut self) -> S;

    /// Record that an attempt against `server` failed.
    fn report_failure(&mut self, server: &S) -> FailoverResult<()>;

    /// Record that an attempt against `server` succeeded.
    fn report_success(&mut self, server: &S) -> FailoverResult<()>;

    /// Short identifier used for configuration lookup.
    fn name(&self) -> &'static str;

    /// Human readable label.
    fn description(&self) -> &'static str;
}

impl<S: ServerHandle> FailoverStrategy<S> for Box<dyn FailoverStrategy<S>> {
    fn select_service(&mut self) -> S {
        (**self).select_service()
    }

    fn report_failure(&mut self, server: &S) -> FailoverResult<()> {
        (**self).report_failure(server)
    }

    fn report_success(&mut self, server: &S) -> FailoverResult<()> {
        (**self).report_success(server)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn description(&self) -> &'static str {
        (**self).description()
    }
}

/// Reject empty pools at construction time.
pub(crate) fn require_servers<S>(servers: Vec<S>) -> FailoverResult<Vec<S>> {
    if servers.is_empty() {
        return Err(FailoverError::NoServers);
    }
    Ok(servers)
}

/// Position of `server` within the fixed pool, if it belongs to it.
pub(crate) fn index_of<S: PartialEq>(servers: &[S], server: &S) -> Option<usize> {
    servers.iter().position(|candidate| candidate == server)
}
