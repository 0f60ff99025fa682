//! Dependency graph logic for ordering object uploads
//!
//! This module provides functions to:
//! - Build a dependency graph from the catalog's reference declarations
//! - Perform a deterministic topological sort for upload/delete ordering

use std::collections::{BTreeSet, HashMap, HashSet};

use super::catalog::ObjectSpec;

/// Dependency graph for a selected set of objects
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Objects in selection order; the position breaks ordering ties
    pub objects: Vec<String>,
    /// Adjacency list: object -> objects it references
    pub dependencies: HashMap<String, HashSet<String>>,
    /// Reverse adjacency: object -> objects that reference it
    pub dependents: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    /// Build the graph for a selection of catalog objects
    ///
    /// Polymorphic references add an edge to every candidate. References to
    /// objects outside the selection are ignored.
    pub fn build(specs: &[&ObjectSpec]) -> Self {
        Self::from_edges(
            specs
                .iter()
                .map(|spec| (spec.name.to_string(), spec.parents().map(String::from).collect()))
                .collect(),
        )
    }

    /// Build from (object, referenced objects) pairs
    ///
    /// A repeated object keeps its first entry.
    pub fn from_edges(nodes: Vec<(String, Vec<String>)>) -> Self {
        let mut seen = HashSet::new();
        let nodes: Vec<(String, Vec<String>)> = nodes
            .into_iter()
            .filter(|(name, _)| seen.insert(name.clone()))
            .collect();
        let selected: HashSet<String> = nodes.iter().map(|(name, _)| name.clone()).collect();
        let mut graph = DependencyGraph::default();

        for (name, _) in &nodes {
            graph.objects.push(name.clone());
            graph.dependents.entry(name.clone()).or_default();
        }

        for (name, parents) in nodes {
            let deps: HashSet<String> = parents
                .into_iter()
                .filter(|p| selected.contains(p) && *p != name)
                .collect();

            for dep in &deps {
                graph
                    .dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(name.clone());
            }
            graph.dependencies.insert(name, deps);
        }

        graph
    }

    /// Kahn's algorithm; among ready objects the earliest selected goes first
    pub fn topological_sort(&self) -> Result<Vec<String>, CycleError> {
        let index: HashMap<&str, usize> = self
            .objects
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut remaining: HashMap<&str, usize> = self
            .dependencies
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();

        let mut ready: BTreeSet<(usize, &str)> = remaining
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&name, _)| (index[name], name))
            .collect();

        let mut result = Vec::with_capacity(self.objects.len());

        while let Some((_, object)) = ready.pop_first() {
            result.push(object.to_string());

            if let Some(dependents) = self.dependents.get(object) {
                for dependent in dependents {
                    if let Some(count) = remaining.get_mut(dependent.as_str()) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert((index[dependent.as_str()], dependent.as_str()));
                        }
                    }
                }
            }
        }

        if result.len() != self.objects.len() {
            let objects: Vec<String> = self
                .objects
                .iter()
                .filter(|o| !result.contains(o))
                .cloned()
                .collect();
            return Err(CycleError { objects });
        }

        Ok(result)
    }

    /// Upload order (referenced objects before referencing ones)
    pub fn insert_order(&self) -> Result<Vec<String>, CycleError> {
        self.topological_sort()
    }

    /// Delete order (reverse of insert)
    pub fn delete_order(&self) -> Result<Vec<String>, CycleError> {
        let mut order = self.topological_sort()?;
        order.reverse();
        Ok(order)
    }
}

/// Error when a cycle is detected in the dependency graph
#[derive(Debug, Clone)]
pub struct CycleError {
    pub objects: Vec<String>,
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Circular dependency detected involving: {}", self.objects.join(", "))
    }
}

impl std::error::Error for CycleError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::catalog::{self, CATALOG};

    fn node(name: &str, parents: &[&str]) -> (String, Vec<String>) {
        (
            name.to_string(),
            parents.iter().map(|p| p.to_string()).collect(),
        )
    }

    fn pos(order: &[String], name: &str) -> usize {
        order.iter().position(|o| o == name).unwrap()
    }

    #[test]
    fn test_full_catalog_reproduces_catalog_order() {
        let specs: Vec<_> = CATALOG.iter().collect();
        let order = DependencyGraph::build(&specs).insert_order().unwrap();

        let expected: Vec<_> = CATALOG.iter().map(|s| s.name.to_string()).collect();
        assert_eq!(order, expected);
        assert_eq!(pos(&order, "LiveChatVisitor") + 1, pos(&order, "LiveChatTranscript"));
    }

    #[test]
    fn test_order_respects_edges_for_subsets() {
        let subsets: &[&[&str]] = &[
            &["Task", "Lead", "Contact", "Account", "Opportunity"],
            &["OrderItem", "Order", "PricebookEntry", "Product2", "Account", "Pricebook2"],
            &["LiveChatTranscript", "Case", "LiveChatVisitor"],
            &["QuoteLineItem", "Quote"],
        ];

        for subset in subsets {
            let names: Vec<String> = subset.iter().map(|s| s.to_string()).collect();
            let specs = catalog::select(&names).unwrap();
            let graph = DependencyGraph::build(&specs);
            let order = graph.insert_order().unwrap();

            assert_eq!(order.len(), subset.len());
            for (object, deps) in &graph.dependencies {
                for dep in deps {
                    assert!(pos(&order, dep) < pos(&order, object), "{} before {}", dep, object);
                }
            }
        }
    }

    #[test]
    fn test_polymorphic_reference_depends_on_every_candidate() {
        let specs = catalog::select(&["Event".into(), "Lead".into(), "Contract".into()]).unwrap();
        let graph = DependencyGraph::build(&specs);

        let deps = &graph.dependencies["Event"];
        assert!(deps.contains("Lead"));
        assert!(deps.contains("Contract"));
        assert_eq!(graph.insert_order().unwrap().last().unwrap(), "Event");
    }

    #[test]
    fn test_ties_follow_selection_order() {
        let graph = DependencyGraph::from_edges(vec![
            node("b", &[]),
            node("a", &[]),
            node("c", &["a"]),
        ]);

        assert_eq!(graph.insert_order().unwrap(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let graph = DependencyGraph::from_edges(vec![
            node("root", &[]),
            node("x", &["y"]),
            node("y", &["x"]),
        ]);

        let err = graph.insert_order().unwrap_err();
        assert_eq!(err.objects, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(err.to_string(), "Circular dependency detected involving: x, y");
    }

    #[test]
    fn test_delete_order_reverses_insert() {
        let specs = catalog::select(&["Contact".into(), "Account".into()]).unwrap();
        let graph = DependencyGraph::build(&specs);

        assert_eq!(graph.delete_order().unwrap(), vec!["Contact", "Account"]);
    }

    #[test]
    fn test_external_and_self_references_ignored() {
        let graph = DependencyGraph::from_edges(vec![node("Account", &["Account", "User"])]);

        assert!(graph.dependencies["Account"].is_empty());
        assert_eq!(graph.insert_order().unwrap(), vec!["Account"]);
    }

    #[test]
    fn test_repeated_objects_are_deduplicated() {
        let graph = DependencyGraph::from_edges(vec![
            node("Contact", &["Account"]),
            node("Account", &[]),
            node("Contact", &["Account"]),
        ]);

        assert_eq!(graph.objects, vec!["Contact", "Account"]);
        assert_eq!(graph.insert_order().unwrap(), vec!["Account", "Contact"]);

        let account = catalog::find("Account").unwrap();
        let order = crate::upload::uploader::plan(&[account, account]).unwrap();
        assert_eq!(order.len(), 1);
    }
}
