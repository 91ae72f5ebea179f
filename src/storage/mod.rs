//! Local storage for monomer sets and rule tables
//!
//! Everything is JSON on disk. A monomer set is the input of a run: the
//! trees of known monomers plus the shared group graph. Rule tables are the
//! output of rule extraction, keyed by depth.

use crate::diffusion::{DiffusionConfig, DiffusionError, DiffusionGraph, GraphSpec, GroupGraph};
use crate::search::{EdgeProb, Rule};
use crate::tree::{Tree, TreeError, TreeSpec};
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Read any serde value from a JSON file
pub fn load_json<T: DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<T, Box<dyn std::error::Error>> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Write any serde value as pretty JSON
pub fn save_json<T: Serialize + ?Sized>(
    value: &T,
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Known monomers and the group graph they live on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonomerSet {
    pub trees: Vec<TreeSpec>,
    pub graph: GraphSpec,
}

impl MonomerSet {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let set: Self = load_json(&path)?;
        info!("Loaded {} from {}", set.summary(), path.as_ref().display());
        Ok(set)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        save_json(self, path)
    }

    pub fn push(&mut self, tree: &Tree) {
        self.trees.push(tree.to_spec());
    }

    pub fn build_trees(&self) -> Result<Vec<Tree>, TreeError> {
        self.trees.iter().map(Tree::from_spec).collect()
    }

    pub fn group_graph(&self) -> GroupGraph {
        GroupGraph::from_spec(&self.graph)
    }

    /// Trees plus graph, expanded and indexed
    pub fn diffusion_graph(
        &self,
        config: &DiffusionConfig,
    ) -> Result<DiffusionGraph, DiffusionError> {
        DiffusionGraph::new(self.build_trees()?, self.group_graph(), config)
    }

    pub fn summary(&self) -> String {
        format!(
            "MonomerSet | {} trees | {} groups | {} edges",
            self.trees.len(),
            self.graph.nodes.len(),
            self.graph.edges.len()
        )
    }
}

/// One rule with its trajectories rendered to group labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub source: Vec<String>,
    pub extended: Vec<String>,
    pub probability: f64,
    pub edges: Vec<EdgeProb>,
}

impl RuleEntry {
    /// `source=>extended` with space-joined tokens
    pub fn to_line(&self) -> String {
        format!("{}=>{}", self.source.join(" "), self.extended.join(" "))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMetadata {
    pub created_at: String,
    pub num_rules: usize,
    pub max_depth: usize,
}

/// Extracted rules keyed by depth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTable {
    pub rules: BTreeMap<usize, Vec<RuleEntry>>,
    pub metadata: TableMetadata,
}

impl RuleTable {
    pub fn from_rules(rules: &BTreeMap<usize, Vec<Rule>>, labels: &[String]) -> Self {
        let rules: BTreeMap<usize, Vec<RuleEntry>> = rules
            .iter()
            .map(|(&depth, list)| {
                let entries = list
                    .iter()
                    .map(|r| RuleEntry {
                        source: r.source.to_names(labels),
                        extended: r.extended.to_names(labels),
                        probability: r.probability,
                        edges: r.edges.clone(),
                    })
                    .collect();
                (depth, entries)
            })
            .collect();
        Self {
            metadata: TableMetadata {
                created_at: chrono::Utc::now().to_rfc3339(),
                num_rules: rules.values().map(Vec::len).sum(),
                max_depth: rules.keys().copied().max().unwrap_or(0),
            },
            rules,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        load_json(path)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        save_json(self, path)
    }

    /// One `source=>extended` line per rule, shallow depths first
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for entry in self.rules.values().flatten() {
            out.push_str(&entry.to_line());
            out.push('\n');
        }
        out
    }

    pub fn save_text(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.metadata.num_rules
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> String {
        let per_depth: Vec<String> = self
            .rules
            .iter()
            .map(|(d, list)| format!("d{}={}", d, list.len()))
            .collect();
        format!(
            "RuleTable | {} rules | {} | created {}",
            self.len(),
            per_depth.join(" "),
            self.metadata.created_at
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{extract_rules, ConnectivityVerifier, LaplacianModel, RuleConfig, WalkSpace};
    use crate::tree::EdgeData;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("polywalk-{}-{}", std::process::id(), name))
    }

    fn monomers() -> MonomerSet {
        let mut graph = GroupGraph::new();
        graph.add_bond("L3", "S20", EdgeData::new());
        graph.add_bond("S20", "P14", EdgeData::new());
        graph.add_bond("P14", "L3", EdgeData::new());
        graph.add_bond("S20", "S18", EdgeData::new());

        let mut tree = Tree::new("L3").with_dag_id(1);
        let s20 = tree.add_child(tree.root(), 1, "S20", EdgeData::new(), false).unwrap();
        tree.add_child(s20, 2, "S18", EdgeData::new(), true).unwrap();
        let p14 = tree.add_child(s20, 3, "P14", EdgeData::new(), false).unwrap();
        tree.close_to_root(p14, EdgeData::new());

        let mut set = MonomerSet { trees: Vec::new(), graph: graph.to_spec() };
        set.push(&tree);
        set
    }

    #[test]
    fn test_monomer_set_roundtrip() {
        let set = monomers();
        let path = temp_path("monomers.json");
        set.save(&path).unwrap();
        let loaded = MonomerSet::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, set);

        let dg = loaded.diffusion_graph(&DiffusionConfig::default()).unwrap();
        assert_eq!(dg.len(), 4);
        let walk = dg.lookup_process(1).unwrap().walk_labels();
        assert_eq!(walk, vec!["L3", "S20", "S18", "S20", "P14"]);
    }

    #[test]
    fn test_monomer_set_parses_edge_list() {
        let json = r#"{
            "trees": [{
                "dag_id": 5,
                "nodes": [{"id": 0, "value": "L3"}, {"id": 1, "value": "S20"}],
                "edges": [{"parent": 0, "child": 1}, {"parent": 1, "child": 0}]
            }],
            "graph": {
                "nodes": ["L3", "S20"],
                "edges": [{"source": "L3", "target": "S20"}, {"source": "S20", "target": "L3"}]
            }
        }"#;
        let set: MonomerSet = serde_json::from_str(json).unwrap();
        let trees = set.build_trees().unwrap();
        assert_eq!(trees[0].dag_id, Some(5));
        assert_eq!(set.group_graph().edge_count(), 2);
        assert!(set.summary().contains("1 trees"));
    }

    #[test]
    fn test_rule_table_text_and_json() {
        let set = monomers();
        let graph = set.group_graph();
        let space = WalkSpace::new(&graph);
        let model = LaplacianModel::random_walk(space.adjacency()).unwrap();
        let verifier = ConnectivityVerifier::new(&space);
        let rules = extract_rules(&model, &space, &verifier, &RuleConfig::default());
        let table = RuleTable::from_rules(&rules, space.labels());

        // S18 hangs off S20 alone
        assert_eq!(table.rules[&2][0].to_line(), "S18=>S18 S20");
        assert_eq!(table.metadata.max_depth, 3);
        assert_eq!(table.to_text().lines().count(), table.len());

        let path = temp_path("rules.json");
        table.save_json(&path).unwrap();
        let loaded = RuleTable::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.rules, table.rules);
        assert_eq!(loaded.len(), table.len());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(MonomerSet::load(temp_path("does-not-exist.json")).is_err());
    }
}
