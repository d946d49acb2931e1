//! Concurrent component calls bounded by a timeout.

use crate::component::{ComponentError, ComponentProxy, ComponentState};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a fanned-out call produced no answer.
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error("no answer within {0:?}")]
    Timeout(Duration),

    #[error("call aborted: {0}")]
    Aborted(String),
}

pub type CallOutcome<T> = (Arc<ComponentProxy>, Result<T, CallError>);

/// Runs `op` against every component at once on the blocking pool.
///
/// Calls that outlive `limit` are reported as [`CallError::Timeout`]; the
/// blocking call itself is left to finish on its own.
pub async fn call_all<T, F>(
    components: &[Arc<ComponentProxy>],
    limit: Duration,
    op: F,
) -> Vec<CallOutcome<T>>
where
    T: Send + 'static,
    F: Fn(&ComponentProxy) -> Result<T, ComponentError> + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let calls = components.iter().map(|comp| {
        let comp = Arc::clone(comp);
        let op = Arc::clone(&op);
        async move {
            let target = Arc::clone(&comp);
            let blocking = tokio::task::spawn_blocking(move || op(&target));
            let result = match tokio::time::timeout(limit, blocking).await {
                Ok(Ok(answer)) => answer.map_err(CallError::from),
                Ok(Err(e)) => Err(CallError::Aborted(e.to_string())),
                Err(_) => Err(CallError::Timeout(limit)),
            };
            (comp, result)
        }
    });
    join_all(calls).await
}

/// Every component whose call failed, with a `"<component>: <error>"` line.
pub fn failed_calls<T>(outcomes: &[CallOutcome<T>]) -> Vec<(Arc<ComponentProxy>, String)> {
    outcomes
        .iter()
        .filter_map(|(comp, result)| {
            result
                .as_ref()
                .err()
                .map(|e| (Arc::clone(comp), format!("{}: {}", comp.full_name(), e)))
        })
        .collect()
}

/// `"<component>: <error>"` for every failed call.
pub fn failures<T>(outcomes: &[CallOutcome<T>]) -> Vec<String> {
    failed_calls(outcomes)
        .into_iter()
        .map(|(_, problem)| problem)
        .collect()
}

/// Polls every component's state; unanswered polls read as hanging.
pub async fn poll_states(
    components: &[Arc<ComponentProxy>],
    limit: Duration,
) -> Vec<(Arc<ComponentProxy>, ComponentState)> {
    call_all(components, limit, |c| Ok(c.state()))
        .await
        .into_iter()
        .map(|(comp, result)| (comp, result.unwrap_or(ComponentState::Hanging)))
        .collect()
}

/// Waits until every component reports one of `wanted`.
///
/// Returns the components (and their last state) that had not arrived when
/// `timeout` ran out; empty on success.
pub async fn wait_for_states(
    components: &[Arc<ComponentProxy>],
    wanted: &[ComponentState],
    timeout: Duration,
    poll_interval: Duration,
    rpc_timeout: Duration,
) -> Vec<(Arc<ComponentProxy>, ComponentState)> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut pending: Vec<Arc<ComponentProxy>> = components.to_vec();
    loop {
        let stragglers: Vec<_> = poll_states(&pending, rpc_timeout)
            .await
            .into_iter()
            .filter(|(_, state)| !wanted.contains(state))
            .collect();
        if stragglers.is_empty() || tokio::time::Instant::now() >= deadline {
            return stragglers;
        }
        pending = stragglers.into_iter().map(|(comp, _)| comp).collect();
        tokio::time::sleep(poll_interval).await;
    }
}
