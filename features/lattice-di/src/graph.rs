use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

/// Import graph of the entire application
///
/// Used to reject import cycles that are not broken by a forward reference
#[derive(Default)]
pub struct ModuleGraph {
    map: BTreeMap<String, ModuleGraphEntry>,
}

struct ModuleGraphEntry {
    name: String,
    imports: Vec<ModuleEdge>,
}

struct ModuleEdge {
    token: String,
    /// Declared through a forward reference
    lazy: bool,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module, a module added twice keeps its first name and collects all imports
    pub fn add_module(&mut self, token: &str, name: &str) {
        self.map
            .entry(token.to_string())
            .or_insert_with(|| ModuleGraphEntry {
                name: name.to_string(),
                imports: Vec::new(),
            });
    }

    pub fn add_import(&mut self, from: &str, to: &str, lazy: bool) {
        let Some(entry) = self.map.get_mut(from) else {
            return;
        };
        if entry.imports.iter().any(|edge| edge.token == to && edge.lazy == lazy) {
            return;
        }
        entry.imports.push(ModuleEdge {
            token: to.to_string(),
            lazy,
        });
    }

    /// Validate the graph
    ///
    /// Returns a list of all issues
    pub fn check(&self) -> Result<(), ModuleGraphErrors> {
        let mut checked = HashSet::new();
        let mut errors = Vec::new();
        for (token, entry) in &self.map {
            let mut chain = Vec::new();
            check_recurse(self, &mut checked, &mut errors, &mut chain, token, entry);
        }

        if !errors.is_empty() {
            return Err(ModuleGraphErrors { errors });
        }

        return Ok(());

        fn check_recurse<'a>(
            graph: &'a ModuleGraph,
            checked: &mut HashSet<&'a str>,
            errors: &mut Vec<ModuleGraphError>,
            chain: &mut Vec<&'a str>,
            token: &'a str,
            entry: &'a ModuleGraphEntry,
        ) {
            // Circular import check
            if let Some(start) = chain.iter().position(|visited| *visited == token) {
                let mut names: Vec<String> = chain[start..]
                    .iter()
                    .map(|visited| graph.name_of(visited))
                    .collect();
                names.push(entry.name.clone()); // Add current so chain is complete

                errors.push(ModuleGraphError::CircularImport {
                    from: graph.name_of(chain[chain.len() - 1]),
                    to: entry.name.clone(),
                    chain: names,
                });
                return;
            }

            // Skip other checks if already checked
            if !checked.insert(token) {
                return;
            }

            chain.push(token);
            for edge in &entry.imports {
                if edge.lazy {
                    // Don't recurse, the target is checked by itself
                    continue;
                }
                let Some((next_token, next_entry)) = graph.map.get_key_value(&edge.token) else {
                    continue;
                };
                check_recurse(graph, checked, errors, chain, next_token, next_entry);
            }
            chain.pop();
        }
    }

    fn name_of(&self, token: &str) -> String {
        self.map
            .get(token)
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| token.to_string())
    }
}

#[derive(Error, Debug, Clone)]
pub enum ModuleGraphError {
    #[error("A circular import exists between '{from}' and '{to}' through {chain:?} - Consider importing one side through a forward reference")]
    CircularImport {
        from: String,
        to: String,
        chain: Vec<String>,
    },
}

impl std::fmt::Display for ModuleGraphErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("The module graph had one or more errors:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}

#[derive(Error, Debug, Clone)]
pub struct ModuleGraphErrors {
    pub errors: Vec<ModuleGraphError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_cycle_is_reported_with_chain() {
        let mut graph = ModuleGraph::new();
        graph.add_module("a", "CatsModule");
        graph.add_module("b", "DogsModule");
        graph.add_import("a", "b", false);
        graph.add_import("b", "a", false);

        let errors = graph.check().unwrap_err().errors;
        assert_eq!(errors.len(), 1);
        let ModuleGraphError::CircularImport { chain, .. } = &errors[0];
        assert_eq!(chain, &["CatsModule", "DogsModule", "CatsModule"]);
    }

    #[test]
    fn forward_edges_break_cycles() {
        let mut graph = ModuleGraph::new();
        graph.add_module("a", "CatsModule");
        graph.add_module("b", "DogsModule");
        graph.add_import("a", "b", false);
        graph.add_import("b", "a", true);

        assert!(graph.check().is_ok());
    }

    #[test]
    fn diamonds_are_fine() {
        let mut graph = ModuleGraph::new();
        for token in ["app", "left", "right", "shared"] {
            graph.add_module(token, token);
        }
        graph.add_import("app", "left", false);
        graph.add_import("app", "right", false);
        graph.add_import("left", "shared", false);
        graph.add_import("right", "shared", false);

        assert!(graph.check().is_ok());
    }
}
