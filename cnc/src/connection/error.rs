//! Connector graph errors.

use crate::component::ComponentName;
use thiserror::Error;

/// Problems found while wiring a set of components together.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("No outputs found for {component} input \"{conn_type}\"")]
    DanglingInput {
        component: ComponentName,
        conn_type: String,
    },

    #[error("No inputs found for {component} output \"{conn_type}\"")]
    DanglingOutput {
        component: ComponentName,
        conn_type: String,
    },

    #[error("Connection cycle detected involving {}", join_names(.0))]
    Cycle(Vec<ComponentName>),

    #[error("Duplicate component {0}")]
    DuplicateComponent(ComponentName),
}

fn join_names(names: &[ComponentName]) -> String {
    names
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
