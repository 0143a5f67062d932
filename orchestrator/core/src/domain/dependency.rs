// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Service dependency graph
//!
//! Builds a DAG from `depends_on` edges, rejects cycles, self-edges and
//! edges to unknown services, and computes the startup order the runtime
//! has to honour.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Startup-ordering invariant (no service before its dependencies)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DependencyError {
    #[error("Dependency cycle detected: {}", cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error("Service '{service}' depends on unknown service '{missing}'")]
    UnknownService { service: String, missing: String },

    #[error("Service '{0}' depends on itself")]
    SelfDependency(String),
}

/// When a dependency counts as satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyCondition {
    /// Container has been started
    Started,
    /// Container health check reports healthy
    Healthy,
}

/// One `depends_on` edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependsOn {
    pub service: String,
    #[serde(default = "default_condition")]
    pub condition: DependencyCondition,
}

impl DependsOn {
    pub fn started(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            condition: DependencyCondition::Started,
        }
    }

    pub fn healthy(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            condition: DependencyCondition::Healthy,
        }
    }
}

fn default_condition() -> DependencyCondition {
    DependencyCondition::Started
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Validated dependency DAG
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// service -> services it depends on
    adjacency: BTreeMap<String, Vec<DependsOn>>,
    startup_order: Vec<String>,
}

impl DependencyGraph {
    /// Build and validate a graph
    ///
    /// # Errors
    /// - `DependencyError::SelfDependency` if a service lists itself
    /// - `DependencyError::UnknownService` if an edge targets an undeclared service
    /// - `DependencyError::Cycle` if the edges do not form a DAG
    pub fn build<'a, I>(services: I) -> Result<Self, DependencyError>
    where
        I: IntoIterator<Item = (&'a str, &'a [DependsOn])>,
    {
        let adjacency: BTreeMap<String, Vec<DependsOn>> = services
            .into_iter()
            .map(|(name, deps)| (name.to_string(), merge_edges(deps)))
            .collect();

        for (name, deps) in &adjacency {
            for dep in deps {
                if &dep.service == name {
                    return Err(DependencyError::SelfDependency(name.clone()));
                }
                if !adjacency.contains_key(&dep.service) {
                    return Err(DependencyError::UnknownService {
                        service: name.clone(),
                        missing: dep.service.clone(),
                    });
                }
            }
        }

        let mut graph = Self {
            adjacency,
            startup_order: Vec::new(),
        };

        if let Some(cycle) = graph.detect_cycle() {
            return Err(DependencyError::Cycle { cycle });
        }

        graph.startup_order = graph.topological_sort();
        if graph.startup_order.len() != graph.adjacency.len() {
            let cycle = graph
                .adjacency
                .keys()
                .filter(|name| !graph.startup_order.contains(name))
                .cloned()
                .collect();
            return Err(DependencyError::Cycle { cycle });
        }
        Ok(graph)
    }

    /// Three-colour DFS; returns the cycle path (first node repeated at the end)
    fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut marks: BTreeMap<&str, Mark> =
            self.adjacency.keys().map(|k| (k.as_str(), Mark::White)).collect();
        let mut path: Vec<&str> = Vec::new();

        for start in self.adjacency.keys() {
            if marks[start.as_str()] == Mark::White {
                if let Some(cycle) = self.visit(start, &mut marks, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        marks: &mut BTreeMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        marks.insert(node, Mark::Gray);
        path.push(node);

        for dep in self.adjacency.get(node).into_iter().flatten() {
            match marks.get(dep.service.as_str()) {
                Some(Mark::White) => {
                    if let Some(cycle) = self.visit(&dep.service, marks, path) {
                        return Some(cycle);
                    }
                }
                Some(Mark::Gray) => {
                    let start = path.iter().position(|n| *n == dep.service).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(dep.service.clone());
                    return Some(cycle);
                }
                _ => {}
            }
        }

        path.pop();
        marks.insert(node, Mark::Black);
        None
    }

    /// Kahn's algorithm; ties broken by name
    fn topological_sort(&self) -> Vec<String> {
        let mut remaining: BTreeMap<&str, usize> = self
            .adjacency
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();
        let mut queue: VecDeque<&str> = remaining
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.adjacency.len());

        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            for (dependent, deps) in &self.adjacency {
                if deps.iter().any(|d| d.service == node) {
                    if let Some(degree) = remaining.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        order
    }

    /// Services in the order they may be started
    pub fn startup_order(&self) -> &[String] {
        &self.startup_order
    }

    /// Edges of one service, one per dependency
    pub fn dependencies(&self, service: &str) -> &[DependsOn] {
        self.adjacency.get(service).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Collapse edges to the same service into one, keeping the stronger
/// condition (`Healthy` over `Started`). First-seen order is kept.
fn merge_edges(edges: &[DependsOn]) -> Vec<DependsOn> {
    let mut merged: Vec<DependsOn> = Vec::with_capacity(edges.len());
    for edge in edges {
        match merged.iter_mut().find(|m| m.service == edge.service) {
            Some(existing) => existing.condition = existing.condition.max(edge.condition),
            None => merged.push(edge.clone()),
        }
    }
    merged
}
