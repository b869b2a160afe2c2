//! Dependency graph over a project's panels.
//!
//! A panel declares a dependency by referencing another panel's id in
//! its content as `{{panel:ID}}`. References are collected into an
//! explicit graph before anything is scheduled — cycle detection is a
//! Kahn topological pass over that graph, and the same reference spans
//! are later used to substitute the referenced panel's rows into the
//! content at dispatch time.

use panelkit_types::{PanelId, Project};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Range;

const REF_OPEN: &str = "{{panel:";
const REF_CLOSE: &str = "}}";

/// One `{{panel:ID}}` reference: the byte span of the whole token and
/// the referenced id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelRef {
    /// Span of the full token within the content, including delimiters.
    pub span: Range<usize>,
    /// The referenced panel id, trimmed.
    pub id: PanelId,
}

/// Collect every panel reference in a piece of content, in order.
pub fn parse_refs(content: &str) -> Vec<PanelRef> {
    let mut refs = vec![];
    let mut cursor = 0;
    while let Some(open) = content[cursor..].find(REF_OPEN) {
        let start = cursor + open;
        let id_start = start + REF_OPEN.len();
        let Some(close) = content[id_start..].find(REF_CLOSE) else {
            break;
        };
        let end = id_start + close + REF_CLOSE.len();
        let id = content[id_start..id_start + close].trim();
        if !id.is_empty() {
            refs.push(PanelRef {
                span: start..end,
                id: PanelId::new(id),
            });
        }
        cursor = end;
    }
    refs
}

/// Replace every reference whose id has a value, leaving others intact.
pub fn substitute(content: &str, values: &HashMap<PanelId, String>) -> String {
    let refs = parse_refs(content);
    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;
    for r in refs {
        if let Some(value) = values.get(&r.id) {
            out.push_str(&content[cursor..r.span.start]);
            out.push_str(value);
            cursor = r.span.end;
        }
    }
    out.push_str(&content[cursor..]);
    out
}

/// Dependency edges between a project's panels.
///
/// Only references to ids that exist in the project become edges;
/// references to unknown ids are resolved (or not) against the result
/// store at dispatch time.
pub struct DepGraph {
    /// panel -> panels it depends on (deduplicated, project members only).
    pub deps: HashMap<PanelId, Vec<PanelId>>,
    /// panel -> panels that depend on it.
    pub dependents: HashMap<PanelId, Vec<PanelId>>,
}

impl DepGraph {
    /// Build the graph for a project by scanning every panel's content.
    pub fn build(project: &Project) -> Self {
        let ids: HashSet<&str> = project.panels.iter().map(|p| p.id.as_str()).collect();
        let mut deps: HashMap<PanelId, Vec<PanelId>> = HashMap::new();
        let mut dependents: HashMap<PanelId, Vec<PanelId>> = HashMap::new();

        for panel in &project.panels {
            let mut seen = HashSet::new();
            let mut panel_deps = vec![];
            for r in parse_refs(&panel.content) {
                if ids.contains(r.id.as_str()) && seen.insert(r.id.clone()) {
                    dependents
                        .entry(r.id.clone())
                        .or_default()
                        .push(panel.id.clone());
                    panel_deps.push(r.id);
                }
            }
            deps.insert(panel.id.clone(), panel_deps);
        }

        Self { deps, dependents }
    }

    /// Panels on or downstream of a dependency cycle (including
    /// self-references), found by Kahn's algorithm: whatever a
    /// topological pass cannot pop can never be dispatched.
    pub fn cycle_members(&self) -> HashSet<PanelId> {
        let mut indegree: HashMap<&PanelId, usize> = self
            .deps
            .iter()
            .map(|(id, deps)| (id, deps.len()))
            .collect();
        let mut queue: VecDeque<&PanelId> = indegree
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut popped = 0;
        while let Some(id) = queue.pop_front() {
            popped += 1;
            if let Some(dependents) = self.dependents.get(id) {
                for dependent in dependents {
                    if let Some(n) = indegree.get_mut(dependent) {
                        *n -= 1;
                        if *n == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        if popped == indegree.len() {
            return HashSet::new();
        }
        indegree
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .map(|(id, _)| id.clone())
            .collect()
    }
}
