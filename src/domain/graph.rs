//! Dependency graph with deterministic topological ordering.
//!
//! Nodes are visited in insertion order and dependencies in declaration
//! order, so the resulting order is stable across runs. A cycle is reported
//! with the full path that closes it.

use std::collections::HashMap;

use super::error::{ConfigError, Namespace};

#[derive(Debug, Clone)]
struct Node {
    name: String,
    dependencies: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    kind: Namespace,
    group: String,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new(kind: Namespace, group: impl Into<String>) -> Self {
        Self {
            kind,
            group: group.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(ConfigError::DuplicateName {
                kind: self.kind,
                name,
                group: self.group.clone(),
            });
        }
        self.index.insert(name.clone(), self.nodes.len());
        self.nodes.push(Node { name, dependencies });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node names ordered so every node comes after all of its dependencies.
    pub fn topological_order(&self) -> Result<Vec<String>, ConfigError> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut stack = Vec::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        for i in 0..self.nodes.len() {
            self.visit(i, &mut marks, &mut stack, &mut order)?;
        }
        Ok(order
            .into_iter()
            .map(|i| self.nodes[i].name.clone())
            .collect())
    }

    fn visit(
        &self,
        i: usize,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), ConfigError> {
        match marks[i] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let start = stack.iter().position(|&j| j == i).unwrap_or(0);
                let mut path: Vec<String> = stack[start..]
                    .iter()
                    .map(|&j| self.nodes[j].name.clone())
                    .collect();
                path.push(self.nodes[i].name.clone());
                return Err(ConfigError::Cycle {
                    kind: self.kind,
                    path,
                });
            }
            Mark::Unvisited => {}
        }

        marks[i] = Mark::InProgress;
        stack.push(i);
        for dependency in &self.nodes[i].dependencies {
            let j = *self.index.get(dependency).ok_or_else(|| {
                ConfigError::UnresolvedDependency {
                    kind: self.kind,
                    name: self.nodes[i].name.clone(),
                    dependency_kind: self.kind,
                    dependency: dependency.clone(),
                    group: self.group.clone(),
                }
            })?;
            self.visit(j, marks, stack, order)?;
        }
        stack.pop();
        marks[i] = Mark::Done;
        order.push(i);
        Ok(())
    }
}
