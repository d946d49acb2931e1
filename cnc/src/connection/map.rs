//! Directed connection graph and tiered start/stop ordering.

use super::error::ConnectionError;
use crate::component::{ComponentName, ComponentProxy, Connection};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// One data link: `from` sends `conn_type` data to `to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    pub from: ComponentName,
    pub to: ComponentName,
    pub conn_type: String,
}

/// Wiring and command ordering for one runset.
///
/// Components are grouped into tiers. Tier 0 holds components with no
/// downstream consumers; each further tier feeds the previous ones. Sources
/// (hubs and pure producers) always form the final tier so they are started
/// only after everything downstream is ready. Stopping walks the exact
/// reverse.
#[derive(Debug, Clone)]
pub struct ConnectionMap {
    tiers: Vec<Vec<Arc<ComponentProxy>>>,
    edges: Vec<Edge>,
    outbound: HashMap<ComponentName, Vec<Connection>>,
}

impl ConnectionMap {
    /// Resolves connectors into edges and computes the tiers.
    pub fn build(components: &[Arc<ComponentProxy>]) -> Result<Self, ConnectionError> {
        let mut by_name: BTreeMap<ComponentName, Arc<ComponentProxy>> = BTreeMap::new();
        for comp in components {
            if by_name
                .insert(comp.name().clone(), Arc::clone(comp))
                .is_some()
            {
                return Err(ConnectionError::DuplicateComponent(comp.name().clone()));
            }
        }

        let (edges, outbound) = resolve_edges(&by_name)?;

        let sources: BTreeSet<ComponentName> = by_name
            .values()
            .filter(|c| c.is_source())
            .map(|c| c.name().clone())
            .collect();

        // Consumers of each component, ignoring links back into sources.
        let mut consumers: BTreeMap<&ComponentName, BTreeSet<&ComponentName>> = BTreeMap::new();
        for edge in &edges {
            if sources.contains(&edge.to) || edge.from == edge.to {
                continue;
            }
            consumers.entry(&edge.from).or_default().insert(&edge.to);
        }

        let mut levels: BTreeMap<&ComponentName, usize> = BTreeMap::new();
        for name in by_name.keys().filter(|n| !sources.contains(*n)) {
            let mut path = Vec::new();
            level_of(name, &consumers, &mut levels, &mut path)?;
        }

        let depth = levels.values().max().map_or(0, |m| m + 1);
        let mut tiers: Vec<Vec<Arc<ComponentProxy>>> = vec![Vec::new(); depth];
        for (name, level) in &levels {
            tiers[*level].push(Arc::clone(&by_name[*name]));
        }
        let source_tier: Vec<Arc<ComponentProxy>> =
            sources.iter().map(|n| Arc::clone(&by_name[n])).collect();
        if !source_tier.is_empty() {
            tiers.push(source_tier);
        }
        tiers.retain(|t| !t.is_empty());

        Ok(Self {
            tiers,
            edges,
            outbound,
        })
    }

    /// Tiers in start order.
    pub fn start_tiers(&self) -> &[Vec<Arc<ComponentProxy>>] {
        &self.tiers
    }

    /// Tiers in stop order: reversed tiers, each reversed.
    pub fn stop_tiers(&self) -> Vec<Vec<Arc<ComponentProxy>>> {
        self.tiers
            .iter()
            .rev()
            .map(|tier| tier.iter().rev().cloned().collect())
            .collect()
    }

    pub fn start_order(&self) -> Vec<ComponentName> {
        self.tiers
            .iter()
            .flatten()
            .map(|c| c.name().clone())
            .collect()
    }

    pub fn stop_order(&self) -> Vec<ComponentName> {
        let mut order = self.start_order();
        order.reverse();
        order
    }

    /// Stamps each proxy with its position in the start order.
    pub fn assign_order(&self) {
        for (idx, comp) in self.tiers.iter().flatten().enumerate() {
            comp.set_order(idx);
        }
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Outbound links `name` must be told about in its `connect` call.
    pub fn connections_for(&self, name: &ComponentName) -> &[Connection] {
        self.outbound.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

type Resolved = (Vec<Edge>, HashMap<ComponentName, Vec<Connection>>);

fn resolve_edges(
    by_name: &BTreeMap<ComponentName, Arc<ComponentProxy>>,
) -> Result<Resolved, ConnectionError> {
    let mut inputs: BTreeMap<&str, Vec<&Arc<ComponentProxy>>> = BTreeMap::new();
    let mut outputs: BTreeMap<&str, Vec<&Arc<ComponentProxy>>> = BTreeMap::new();
    for comp in by_name.values() {
        for conn in comp.connectors() {
            let table = if conn.is_input() {
                &mut inputs
            } else {
                &mut outputs
            };
            table.entry(conn.name()).or_default().push(comp);
        }
    }

    for comp in by_name.values() {
        for conn in comp.connectors().iter().filter(|c| !c.is_optional()) {
            let peers = if conn.is_input() { &outputs } else { &inputs };
            let matched = peers
                .get(conn.name())
                .is_some_and(|p| p.iter().any(|other| other.name() != comp.name()));
            if matched {
                continue;
            }
            let component = comp.name().clone();
            let conn_type = conn.name().to_string();
            return Err(if conn.is_input() {
                ConnectionError::DanglingInput {
                    component,
                    conn_type,
                }
            } else {
                ConnectionError::DanglingOutput {
                    component,
                    conn_type,
                }
            });
        }
    }

    let mut edges = Vec::new();
    let mut outbound: HashMap<ComponentName, Vec<Connection>> = HashMap::new();
    for (conn_type, senders) in &outputs {
        let Some(receivers) = inputs.get(conn_type) else {
            continue;
        };
        for from in senders {
            for to in receivers.iter().filter(|r| r.name() != from.name()) {
                edges.push(Edge {
                    from: from.name().clone(),
                    to: to.name().clone(),
                    conn_type: conn_type.to_string(),
                });
                outbound
                    .entry(from.name().clone())
                    .or_default()
                    .push(Connection::new(conn_type, to.name(), to.host(), to.port()));
            }
        }
    }
    edges.sort();
    Ok((edges, outbound))
}

fn level_of<'a>(
    name: &'a ComponentName,
    consumers: &BTreeMap<&'a ComponentName, BTreeSet<&'a ComponentName>>,
    levels: &mut BTreeMap<&'a ComponentName, usize>,
    path: &mut Vec<&'a ComponentName>,
) -> Result<usize, ConnectionError> {
    if let Some(level) = levels.get(name) {
        return Ok(*level);
    }
    if let Some(pos) = path.iter().position(|n| *n == name) {
        return Err(ConnectionError::Cycle(
            path[pos..].iter().map(|n| (*n).clone()).collect(),
        ));
    }

    path.push(name);
    let mut level = 0;
    if let Some(downstream) = consumers.get(name) {
        for next in downstream {
            level = level.max(level_of(next, consumers, levels, path)? + 1);
        }
    }
    path.pop();

    levels.insert(name, level);
    Ok(level)
}
