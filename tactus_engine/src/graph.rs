use crate::error::{EngineError, Result};
use log::debug;
use petgraph::algo::toposort;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use std::fmt::Display;

/// Handle of a registered processor. Stays valid until unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessorKey(NodeIndex);

/// Handle of a registered edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeKey(EdgeIndex);

/// Processors and their ordering constraints. An edge `source -> target`
/// means the source runs first. The execution order is cached and only
/// re-sorted after a structural change.
pub struct ProcessorGraph<T> {
    graph: StableDiGraph<T, ()>,
    order: Vec<ProcessorKey>,
    valid: bool,
}

impl<T: Display> Default for ProcessorGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Display> ProcessorGraph<T> {
    pub fn new() -> Self {
        Self { graph: StableDiGraph::new(), order: Vec::new(), valid: true }
    }

    pub fn register_processor(&mut self, processor: T) -> ProcessorKey {
        self.valid = false;
        ProcessorKey(self.graph.add_node(processor))
    }

    /// Removes a processor together with every edge touching it.
    pub fn unregister_processor(&mut self, key: ProcessorKey) -> Option<T> {
        self.valid = false;
        self.graph.remove_node(key.0)
    }

    pub fn register_edge(&mut self, source: ProcessorKey, target: ProcessorKey) -> Result<EdgeKey> {
        let (Some(from), Some(to)) = (self.graph.node_weight(source.0), self.graph.node_weight(target.0)) else {
            return Err(EngineError::UnknownProcessor);
        };
        if self.graph.find_edge(source.0, target.0).is_some() {
            return Err(EngineError::DuplicateEdge { source_name: from.to_string(), target: to.to_string() });
        }
        self.valid = false;
        Ok(EdgeKey(self.graph.add_edge(source.0, target.0, ())))
    }

    pub fn unregister_edge(&mut self, key: EdgeKey) -> bool {
        self.valid = false;
        self.graph.remove_edge(key.0).is_some()
    }

    pub fn get(&self, key: ProcessorKey) -> Option<&T> {
        self.graph.node_weight(key.0)
    }

    pub fn get_mut(&mut self, key: ProcessorKey) -> Option<&mut T> {
        self.graph.node_weight_mut(key.0)
    }

    pub fn contains(&self, key: ProcessorKey) -> bool {
        self.graph.contains_node(key.0)
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn processors(&self) -> impl Iterator<Item = (ProcessorKey, &T)> {
        self.graph.node_indices().map(move |index| (ProcessorKey(index), &self.graph[index]))
    }

    pub fn processors_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.graph.node_weights_mut()
    }

    /// Re-sorts if needed. A cycle leaves the graph invalid.
    pub fn sort(&mut self) -> Result<()> {
        if self.valid {
            return Ok(());
        }
        match toposort(&self.graph, None) {
            Ok(nodes) => {
                self.order.clear();
                self.order.extend(nodes.into_iter().map(ProcessorKey));
                self.valid = true;
                debug!("sorted {} processors, {} edges", self.order.len(), self.graph.edge_count());
                Ok(())
            }
            Err(cycle) => {
                let processor = self.graph.node_weight(cycle.node_id()).map(ToString::to_string).unwrap_or_default();
                Err(EngineError::Cycle { processor })
            }
        }
    }

    /// Execution order as of the last successful sort.
    pub fn order(&self) -> &[ProcessorKey] {
        &self.order
    }
}
