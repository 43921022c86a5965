//! Dependency graph over declared resources
//!
//! Edges point from a resource to the resources it depends on, either
//! explicitly (`depends_on`) or through a deferred input value. Building the
//! graph rejects duplicate names and cycles; references to resources that are
//! not declared are recorded and left to the planner to reject.

use crate::error::{Error, Result};
use crate::resource::ResourceSpec;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// How a dependency on a missing resource was introduced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DanglingVia {
    /// Listed in `depends_on`
    Explicit,
    /// Referenced by the named input property
    Input(String),
}

/// A dependency on a resource absent from the declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingRef {
    /// Resource declaring the dependency
    pub from: String,
    /// Missing resource
    pub to: String,
    pub via: DanglingVia,
}

impl DanglingRef {
    /// Convert into the planner error reported for it
    pub fn to_error(&self) -> Error {
        let message = match &self.via {
            DanglingVia::Explicit => format!("depends on unknown resource `{}`", self.to),
            DanglingVia::Input(key) => {
                format!("input `{key}` references unknown resource `{}`", self.to)
            }
        };
        Error::Plan {
            resource: self.from.clone(),
            message,
        }
    }
}

/// Validated dependency graph
#[derive(Debug, Clone, Default)]
pub struct Graph {
    specs: BTreeMap<String, ResourceSpec>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
    dangling: Vec<DanglingRef>,
}

impl Graph {
    /// Build the graph, failing on duplicate names or dependency cycles
    pub fn build(specs: impl IntoIterator<Item = ResourceSpec>) -> Result<Self> {
        let mut graph = Self::default();

        for spec in specs {
            if graph.specs.contains_key(&spec.name) {
                return Err(Error::DuplicateResource { name: spec.name });
            }
            graph.dependencies.insert(spec.name.clone(), BTreeSet::new());
            graph.dependents.insert(spec.name.clone(), BTreeSet::new());
            graph.specs.insert(spec.name.clone(), spec);
        }

        let mut edges = Vec::new();
        for spec in graph.specs.values() {
            for target in &spec.depends_on {
                edges.push((spec.name.clone(), target.clone(), DanglingVia::Explicit));
            }
            for (key, reference) in spec.references() {
                edges.push((
                    spec.name.clone(),
                    reference.resource.clone(),
                    DanglingVia::Input(key.to_string()),
                ));
            }
        }

        for (from, to, via) in edges {
            if graph.specs.contains_key(&to) {
                graph.add_edge(&from, &to);
            } else if !graph.dangling.iter().any(|d| d.from == from && d.to == to) {
                graph.dangling.push(DanglingRef { from, to, via });
            }
        }

        if let Some(cycle) = graph.find_cycle() {
            return Err(Error::Cycle { cycle });
        }

        log::debug!(
            "Built dependency graph with {} resources and {} edges",
            graph.len(),
            graph.dependencies.values().map(BTreeSet::len).sum::<usize>()
        );
        Ok(graph)
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        if let Some(deps) = self.dependencies.get_mut(from) {
            deps.insert(to.to_string());
        }
        if let Some(dependents) = self.dependents.get_mut(to) {
            dependents.insert(from.to_string());
        }
    }

    /// Number of resources
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Check if the graph has no resources
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Check if a resource is declared
    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    /// Look up a declared resource
    pub fn spec(&self, name: &str) -> Option<&ResourceSpec> {
        self.specs.get(name)
    }

    /// All declared resources, ordered by name
    pub fn specs(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.specs.values()
    }

    /// All logical names, ordered
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// Resources `name` depends on directly
    pub fn dependencies_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.dependencies
            .get(name)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// Resources depending directly on `name`
    pub fn dependents_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(name)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// Every resource that depends on `name`, directly or not
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut queue: VecDeque<&str> = self.dependents_of(name).collect();
        while let Some(next) = queue.pop_front() {
            if found.insert(next.to_string()) {
                queue.extend(self.dependents_of(next));
            }
        }
        found
    }

    /// Dependencies on resources that are not declared
    pub fn dangling(&self) -> &[DanglingRef] {
        &self.dangling
    }

    /// Find the shortest dependency cycle, if any
    ///
    /// Ties between cycles of equal length go to the one whose smallest
    /// member sorts first; the returned cycle starts at that member.
    pub(crate) fn find_cycle(&self) -> Option<Vec<String>> {
        // Peel off everything that can be ordered; what remains sits on or behind a cycle.
        let mut remaining: BTreeMap<&str, usize> = self
            .dependencies
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();
        let mut ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();

        while let Some(name) = ready.pop() {
            remaining.remove(name);
            for dependent in self.dependents_of(name) {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(dependent);
                    }
                }
            }
        }

        if remaining.is_empty() {
            return None;
        }

        let within: BTreeSet<&str> = remaining.keys().copied().collect();
        let mut best: Option<Vec<String>> = None;
        for start in &within {
            if let Some(cycle) = self.shortest_cycle_through(start, &within)
                && best.as_ref().is_none_or(|b| cycle.len() < b.len())
            {
                best = Some(cycle);
            }
        }
        best
    }

    fn shortest_cycle_through(&self, start: &str, within: &BTreeSet<&str>) -> Option<Vec<String>> {
        let mut parent: HashMap<&str, &str> = HashMap::new();
        let mut seen: HashSet<&str> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            for dep in self.dependencies_of(node).filter(|d| within.contains(d)) {
                if dep == start {
                    let mut path = vec![node.to_string()];
                    let mut current = node;
                    while current != start {
                        current = parent[current];
                        path.push(current.to_string());
                    }
                    path.reverse();
                    return Some(path);
                }
                if seen.insert(dep) {
                    parent.insert(dep, node);
                    queue.push_back(dep);
                }
            }
        }
        None
    }
}
