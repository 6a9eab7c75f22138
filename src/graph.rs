use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{Dfs, NodeIndexable};

use crate::coordinate::Coordinate;
use crate::error::{DeployerError, Result};
use crate::model::Config;

/// The dependency graph of one weakly connected component.
///
/// Doubles as the scheduler's mutable working copy: processed roots (and the
/// descendants of failed ones) are removed until the graph is drained.
#[derive(Debug, Clone)]
pub struct ComponentGraph {
    graph: StableDiGraph<Coordinate, ()>,
    indices: HashMap<Coordinate, NodeIndex>,
}

impl ComponentGraph {
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.indices.contains_key(coordinate)
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.graph.node_weights().cloned().collect()
    }

    /// Nodes with no unprocessed dependency left.
    pub fn roots(&self) -> Vec<Coordinate> {
        let mut roots: Vec<Coordinate> = self
            .graph
            .externals(Direction::Incoming)
            .filter_map(|index| self.graph.node_weight(index).cloned())
            .collect();
        roots.sort();
        roots
    }

    /// All transitive dependents of a node, excluding the node itself.
    pub fn descendants(&self, of: &Coordinate) -> Vec<Coordinate> {
        let Some(&start) = self.indices.get(of) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(index) = dfs.next(&self.graph) {
            if index != start
                && let Some(coordinate) = self.graph.node_weight(index)
            {
                found.push(coordinate.clone());
            }
        }
        found.sort();
        found
    }

    /// Direct dependencies of a node that are still in the working copy.
    pub fn parents(&self, of: &Coordinate) -> Vec<Coordinate> {
        let Some(&index) = self.indices.get(of) else {
            return Vec::new();
        };
        let mut parents: Vec<Coordinate> = self
            .graph
            .neighbors_directed(index, Direction::Incoming)
            .filter_map(|parent| self.graph.node_weight(parent).cloned())
            .collect();
        parents.sort();
        parents
    }

    pub fn remove(&mut self, coordinate: &Coordinate) {
        if let Some(index) = self.indices.remove(coordinate) {
            self.graph.remove_node(index);
        }
    }
}

/// Build and validate the per-environment dependency graph, partitioned into
/// weakly connected components.
///
/// Validation rejects duplicate coordinates, references to configs that are
/// not part of the environment, and cycles.
pub fn build_component_graphs(configs: &[Config]) -> Result<Vec<ComponentGraph>> {
    let mut graph: StableDiGraph<Coordinate, ()> = StableDiGraph::new();
    let mut indices: HashMap<Coordinate, NodeIndex> = HashMap::new();

    for config in configs {
        if indices.contains_key(&config.coordinate) {
            return Err(DeployerError::DuplicateCoordinate(config.coordinate.clone()));
        }
        let index = graph.add_node(config.coordinate.clone());
        indices.insert(config.coordinate.clone(), index);
    }

    for config in configs {
        let to = indices[&config.coordinate];
        for referenced in config.references() {
            let Some(&from) = indices.get(&referenced) else {
                return Err(DeployerError::UnknownReference {
                    coordinate: config.coordinate.clone(),
                    referenced,
                });
            };
            if from == to {
                return Err(DeployerError::CircularDependency {
                    members: vec![config.coordinate.clone()],
                });
            }
            if !graph.contains_edge(from, to) {
                graph.add_edge(from, to, ());
            }
        }
    }

    for scc in tarjan_scc(&graph) {
        if scc.len() > 1 {
            let mut members: Vec<Coordinate> = scc
                .iter()
                .filter_map(|&index| graph.node_weight(index).cloned())
                .collect();
            members.sort();
            return Err(DeployerError::CircularDependency { members });
        }
    }

    Ok(partition(&graph))
}

/// Split the validated graph into weakly connected components; each is
/// scheduled independently of the others.
fn partition(graph: &StableDiGraph<Coordinate, ()>) -> Vec<ComponentGraph> {
    let mut union = UnionFind::new(graph.node_bound());
    for edge in graph.edge_indices() {
        if let Some((a, b)) = graph.edge_endpoints(edge) {
            union.union(graph.to_index(a), graph.to_index(b));
        }
    }

    let mut buckets: HashMap<usize, Vec<NodeIndex>> = HashMap::new();
    for index in graph.node_indices() {
        let root = union.find(graph.to_index(index));
        buckets.entry(root).or_default().push(index);
    }

    let mut components: Vec<ComponentGraph> = Vec::new();
    for members in buckets.into_values() {
        let mut component = StableDiGraph::new();
        let mut indices = HashMap::new();
        for &index in &members {
            if let Some(coordinate) = graph.node_weight(index) {
                let new_index = component.add_node(coordinate.clone());
                indices.insert(coordinate.clone(), new_index);
            }
        }
        for &index in &members {
            let from_coord = graph.node_weight(index).cloned();
            for neighbor in graph.neighbors_directed(index, Direction::Outgoing) {
                let to_coord = graph.node_weight(neighbor).cloned();
                if let (Some(from_coord), Some(to_coord)) = (from_coord.clone(), to_coord) {
                    component.add_edge(indices[&from_coord], indices[&to_coord], ());
                }
            }
        }
        components.push(ComponentGraph {
            graph: component,
            indices,
        });
    }

    // Deterministic component order keeps reports stable across runs.
    components.sort_by_key(|component| component.roots());
    components
}
