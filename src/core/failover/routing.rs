//! Drive an operation across a failover pool.
//!
//! Each attempt asks the strategy for a server, runs the operation against it
//! and reports the outcome. The strategy lock is released before the operation
//! runs, so slow backends never serialize unrelated callers.
use std::{fmt, future::Future};

use thiserror::Error;
use tracing::{Instrument, Span};

use super::{ServerHandle, SynchronizedFailoverStrategy};
use crate::tracing_setup::failover_span;

/// Routing failure after the strategy has been consulted.
#[derive(Error, Debug)]
pub enum RoutingError<S, E>
where
    S: fmt::Debug,
    E: std::error::Error + 'static,
{
    #[error("Failover routing was invoked with zero attempts")]
    NoAttempts,

    #[error("All {attempts} routing attempts failed, last server {last_server:?}")]
    AttemptsExhausted {
        attempts: usize,
        last_server: S,
        #[source]
        source: E,
    },
}

/// Run `op` against servers chosen by `strategy`, failing over up to
/// `max_attempts` times.
pub fn route_with_failover<S, T, E, F>(
    strategy: &SynchronizedFailoverStrategy<S>,
    max_attempts: usize,
    mut op: F,
) -> Result<T, RoutingError<S, E>>
where
    S: ServerHandle + fmt::Debug,
    E: std::error::Error + 'static,
    F: FnMut(&S) -> Result<T, E>,
{
    let span = failover_span(strategy.name());
    let _entered = span.enter();
    let mut failed: Option<(S, E)> = None;

    for attempt in 0..max_attempts {
        let server = strategy.select_service();
        record_attempt(&span, &server, attempt);
        log_failover(failed.as_ref().map(|(s, _)| s), &server, attempt);

        match op(&server) {
            Ok(value) => {
                record_success(strategy, &server);
                return Ok(value);
            }
            Err(err) => {
                tracing::debug!(server = ?server, error = %err, "Routing attempt failed");
                record_failure(strategy, &server);
                failed = Some((server, err));
            }
        }
    }

    Err(exhausted(failed, max_attempts))
}

/// Async variant of [`route_with_failover`]. The strategy lock is never held
/// across an `.await`.
pub async fn route_with_failover_async<S, T, E, F, Fut>(
    strategy: &SynchronizedFailoverStrategy<S>,
    max_attempts: usize,
    mut op: F,
) -> Result<T, RoutingError<S, E>>
where
    S: ServerHandle + fmt::Debug,
    E: std::error::Error + 'static,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let span = failover_span(strategy.name());
    let attempts_span = span.clone();

    async move {
        let mut failed: Option<(S, E)> = None;

        for attempt in 0..max_attempts {
            let server = strategy.select_service();
            record_attempt(&attempts_span, &server, attempt);
            log_failover(failed.as_ref().map(|(s, _)| s), &server, attempt);

            match op(server.clone()).await {
                Ok(value) => {
                    record_success(strategy, &server);
                    return Ok(value);
                }
                Err(err) => {
                    tracing::debug!(server = ?server, error = %err, "Routing attempt failed");
                    record_failure(strategy, &server);
                    failed = Some((server, err));
                }
            }
        }

        Err(exhausted(failed, max_attempts))
    }
    .instrument(span)
    .await
}

fn record_attempt<S: fmt::Debug>(span: &Span, server: &S, attempt: usize) {
    span.record("server", tracing::field::debug(server));
    span.record("attempts", attempt + 1);
}

fn log_failover<S: fmt::Debug>(previous: Option<&S>, next: &S, attempt: usize) {
    if let Some(previous) = previous {
        tracing::warn!(from = ?previous, to = ?next, attempt, "Failing over to next server");
    }
}

fn record_success<S: ServerHandle + fmt::Debug>(
    strategy: &SynchronizedFailoverStrategy<S>,
    server: &S,
) {
    if let Err(e) = strategy.report_success(server) {
        tracing::warn!(server = ?server, "Failed to record routing success: {}", e);
    }
}

fn record_failure<S: ServerHandle + fmt::Debug>(
    strategy: &SynchronizedFailoverStrategy<S>,
    server: &S,
) {
    if let Err(e) = strategy.report_failure(server) {
        tracing::warn!(server = ?server, "Failed to record routing failure: {}", e);
    }
}

fn exhausted<S, E>(failed: Option<(S, E)>, attempts: usize) -> RoutingError<S, E>
where
    S: fmt::Debug,
    E: std::error::Error + 'static,
{
    match failed {
        Some((last_server, source)) => RoutingError::AttemptsExhausted {
            attempts,
            last_server,
            source,
        },
        None => RoutingError::NoAttempts,
    }
}
