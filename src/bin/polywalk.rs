//! Polywalk CLI — canonical walks, diffusion and rule search over monomer sets
//!
//! Commands:
//!   polywalk order   — print canonical walks of every monomer
//!   polywalk diffuse — run the diffusion graph and print per-step state
//!   polywalk replay  — edge weights of one monomer's walk under the model
//!   polywalk sample  — sample novel monomers by random walks
//!   polywalk rules   — extract depth-bounded rules to JSON and text
//!   polywalk walks   — best-first search for closed walks
//!   polywalk demo    — run everything on a built-in monomer set

use polywalk_core::diffusion::{DiffusionConfig, DiffusionGraph, GroupGraph};
use polywalk_core::search::{
    extract_all_walks, extract_rules, replay_walk, sample_walks, ConnectivityVerifier,
    LaplacianModel, ReplayOptions, RuleConfig, SampleConfig, TransitionModel, WalkSpace,
};
use polywalk_core::storage::{load_json, save_json, MonomerSet, RuleTable};
use polywalk_core::tree::{CanonicalWalk, EdgeData, Tree};
use std::collections::HashSet;
use std::env;

const SAMPLES_FILE: &str = "polywalk-samples.json";
const RULES_PREFIX: &str = "polywalk-rules";

fn print_usage() {
    println!(
        r#"
╔══════════════════════════════════════════════════════════════╗
║        Polywalk v0.1 — walks over group-contribution graphs  ║
╚══════════════════════════════════════════════════════════════╝

Usage: polywalk <command> <monomers.json> [options]

Commands:
  order   <set> [seed]                       Canonical walk of every monomer
  diffuse <set> [steps]                      Step the diffusion graph
  replay  <set> <dag_id>                     Model edge weights along a walk
  sample  <set> [num] [rng_seed] [out.json]  Sample novel monomers
  rules   <set> [max_depth] [out-prefix]     Extract rules (.json + .txt)
  walks   <set> [limit]                      Best-first closed walks
  demo                                       Run on a built-in monomer set

Flags (any command taking a set):
  --model  <file>   LaplacianModel JSON (default: uniform random walk)
  --config <file>   SampleConfig / RuleConfig JSON for sample, rules, walks
  --branching       Diffuse into side chains, splitting mass at branches

Examples:
  polywalk order monomers.json 3
  polywalk sample monomers.json 20 42
  polywalk rules monomers.json 4 my-rules
  polywalk demo
"#
    );
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut args: Vec<String> = env::args().collect();
    let flags = Flags::take(&mut args);
    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "order" => cmd_order(&args[2..], &flags),
        "diffuse" => cmd_diffuse(&args[2..], &flags),
        "replay" => cmd_replay(&args[2..], &flags),
        "sample" => cmd_sample(&args[2..], &flags),
        "rules" => cmd_rules(&args[2..], &flags),
        "walks" => cmd_walks(&args[2..], &flags),
        "demo" => cmd_demo(),
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
        }
    }
}

/// Options pulled out of the argument list before dispatch
#[derive(Debug, Default)]
struct Flags {
    model: Option<String>,
    config: Option<String>,
    branching: bool,
}

impl Flags {
    fn take(args: &mut Vec<String>) -> Self {
        let mut flags = Self::default();
        let mut rest = Vec::with_capacity(args.len());
        let mut iter = args.drain(..);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--model" => flags.model = iter.next(),
                "--config" => flags.config = iter.next(),
                "--branching" => flags.branching = true,
                _ => rest.push(arg),
            }
        }
        drop(iter);
        *args = rest;
        flags
    }

    fn diffusion(&self) -> DiffusionConfig {
        if self.branching {
            DiffusionConfig::branching()
        } else {
            DiffusionConfig::default()
        }
    }

    fn model(&self, space: &WalkSpace) -> Option<LaplacianModel> {
        let model = match &self.model {
            Some(path) => match load_json::<LaplacianModel>(path) {
                Ok(m) => m,
                Err(e) => {
                    eprintln!("  Failed to load model {}: {}", path, e);
                    return None;
                }
            },
            None => match LaplacianModel::random_walk(space.adjacency()) {
                Ok(m) => m,
                Err(e) => {
                    eprintln!("  Failed to build random-walk model: {}", e);
                    return None;
                }
            },
        };
        if model.dim() != space.len() {
            eprintln!("  Model has {} groups, monomer set has {}", model.dim(), space.len());
            return None;
        }
        Some(model)
    }

    fn config<T: serde::de::DeserializeOwned + Default>(&self) -> Option<T> {
        match &self.config {
            Some(path) => match load_json(path) {
                Ok(c) => Some(c),
                Err(e) => {
                    eprintln!("  Failed to load config {}: {}", path, e);
                    None
                }
            },
            None => Some(T::default()),
        }
    }
}

fn load_set(args: &[String], usage: &str) -> Option<MonomerSet> {
    let Some(path) = args.first() else {
        eprintln!("Usage: {}", usage);
        return None;
    };
    match MonomerSet::load(path) {
        Ok(set) => Some(set),
        Err(e) => {
            eprintln!("  Failed to load {}: {}", path, e);
            None
        }
    }
}

fn load_graph(set: &MonomerSet, flags: &Flags) -> Option<DiffusionGraph> {
    match set.diffusion_graph(&flags.diffusion()) {
        Ok(dg) => Some(dg),
        Err(e) => {
            eprintln!("  Invalid monomer set: {}", e);
            None
        }
    }
}

fn cmd_order(args: &[String], _flags: &Flags) {
    let Some(set) = load_set(args, "polywalk order <set> [seed]") else { return };
    let seed: i64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
    let trees = match set.build_trees() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("  Invalid tree: {}", e);
            return;
        }
    };

    println!("\n  Canonical walks (seed {}):", seed);
    println!("  {}", "-".repeat(60));
    for mut tree in trees {
        let id = tree.dag_id.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
        let walk = match CanonicalWalk::new(&mut tree) {
            Ok(w) => w,
            Err(e) => {
                eprintln!("  [{}] {}", id, e);
                continue;
            }
        };
        match walk.walk(&tree, seed) {
            Ok(order) => {
                let labels: Vec<&str> =
                    order.iter().map(|&i| tree.node(i).value.as_str()).collect();
                println!("  [{}] {} orderings | {}", id, walk.total(), labels.join(" "));
            }
            Err(e) => eprintln!("  [{}] {}", id, e),
        }
    }
}

fn cmd_diffuse(args: &[String], flags: &Flags) {
    let Some(set) = load_set(args, "polywalk diffuse <set> [steps]") else { return };
    let steps: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(5);
    let Some(mut dg) = load_graph(&set, flags) else { return };
    let labels = dg.labels();

    for _ in 0..=steps {
        let state = dg.get_state(false);
        let mass: Vec<String> = labels
            .iter()
            .zip(state.iter())
            .filter(|&(_, &p)| p > 0.0)
            .map(|(l, p)| format!("{}={:.3}", l, p))
            .collect();
        println!("  t={:<3} {}", dg.t(), mass.join(" "));
        if let Err(e) = dg.step() {
            eprintln!("  Diffusion failed: {}", e);
            return;
        }
    }
}

fn cmd_replay(args: &[String], flags: &Flags) {
    let Some(set) = load_set(args, "polywalk replay <set> <dag_id>") else { return };
    let Some(dag_id) = args.get(1).and_then(|s| s.parse::<u64>().ok()) else {
        eprintln!("Usage: polywalk replay <set> <dag_id>");
        return;
    };
    let Some(dg) = load_graph(&set, flags) else { return };
    let space = WalkSpace::of(&dg);
    let Some(model) = flags.model(&space) else { return };
    let Some(process) = dg.lookup_process(dag_id) else {
        eprintln!("  No monomer with dag_id {}", dag_id);
        return;
    };

    let weights = match replay_walk(&model, &space, process, &ReplayOptions::default()) {
        Ok(w) => w.weights,
        Err(e) => {
            eprintln!("  Replay failed: {}", e);
            return;
        }
    };
    println!("\n  Walk: {}", process.walk_labels().join(" "));
    let n = space.len();
    for a in 0..n {
        for b in 0..n {
            let w = weights[(a, b)];
            if w > 0.0 {
                println!("  {:>8} -> {:<8} {:.4}", space.labels()[a], space.labels()[b], w);
            }
        }
    }
}

fn cmd_sample(args: &[String], flags: &Flags) {
    let usage = "polywalk sample <set> [num] [rng_seed] [out.json]";
    let Some(set) = load_set(args, usage) else { return };
    let Some(dg) = load_graph(&set, flags) else { return };
    let space = WalkSpace::of(&dg);
    let Some(model) = flags.model(&space) else { return };
    let Some(mut config) = flags.config::<SampleConfig>() else { return };
    if let Some(n) = args.get(1).and_then(|s| s.parse().ok()) {
        config.num_generate = n;
    }
    if let Some(seed) = args.get(2).and_then(|s| s.parse().ok()) {
        config.rng_seed = Some(seed);
    }
    let out = args.get(3).map(String::as_str).unwrap_or(SAMPLES_FILE);

    let verifier = ConnectivityVerifier::new(&space);
    let mut seen = known_fingerprints(&dg);
    let report = sample_walks(&model, &space, &verifier, &mut seen, &config);

    println!("\n  {}", report.metrics.summary());
    for w in &report.novel {
        println!("  [{}] {}", &w.fingerprint[..8], w.names.join(" "));
    }
    match save_json(&report, out) {
        Ok(()) => println!("  Saved to {}", out),
        Err(e) => eprintln!("  Failed to save: {}", e),
    }
}

/// Fingerprints of the input monomers, so sampling only reports new ones
fn known_fingerprints(dg: &DiffusionGraph) -> HashSet<String> {
    dg.processes()
        .iter()
        .filter_map(|p| polywalk_core::search::fingerprint(p.tree()).ok())
        .collect()
}

fn cmd_rules(args: &[String], flags: &Flags) {
    let Some(set) = load_set(args, "polywalk rules <set> [max_depth] [out-prefix]") else { return };
    let Some(dg) = load_graph(&set, flags) else { return };
    let space = WalkSpace::of(&dg);
    let Some(model) = flags.model(&space) else { return };
    let Some(mut config) = flags.config::<RuleConfig>() else { return };
    if let Some(d) = args.get(1).and_then(|s| s.parse().ok()) {
        config.max_rule_depth = d;
    }
    let prefix = args.get(2).map(String::as_str).unwrap_or(RULES_PREFIX);

    let verifier = ConnectivityVerifier::new(&space);
    let rules = extract_rules(&model, &space, &verifier, &config);
    let table = RuleTable::from_rules(&rules, space.labels());
    println!("\n  {}", table.summary());
    print!("{}", table.to_text());

    let json = format!("{}.json", prefix);
    let txt = format!("{}.txt", prefix);
    match table.save_json(&json).and_then(|()| table.save_text(&txt)) {
        Ok(()) => println!("  Saved to {} and {}", json, txt),
        Err(e) => eprintln!("  Failed to save: {}", e),
    }
}

fn cmd_walks(args: &[String], flags: &Flags) {
    let Some(set) = load_set(args, "polywalk walks <set> [limit]") else { return };
    let Some(dg) = load_graph(&set, flags) else { return };
    let space = WalkSpace::of(&dg);
    let Some(model) = flags.model(&space) else { return };
    let Some(mut config) = flags.config::<RuleConfig>() else { return };
    config.num_generate = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .or(config.num_generate)
        .or(Some(20));

    let verifier = ConnectivityVerifier::new(&space);
    let walks = extract_all_walks(&model, &space, &verifier, &config);
    println!("\n  Closed walks ({}):", walks.len());
    println!("  {}", "-".repeat(60));
    for w in &walks {
        println!("  {:>8.3}  {}", w.log_prob, w.trajectory.to_names(space.labels()).join(" "));
    }
}

/// Three small monomers over five groups
fn demo_set() -> Result<MonomerSet, Box<dyn std::error::Error>> {
    let mut graph = GroupGraph::new();
    for (a, b) in [
        ("L3", "S20"),
        ("S20", "P14"),
        ("P14", "L3"),
        ("S20", "S18"),
        ("L3", "S32"),
        ("S32", "S20"),
    ] {
        graph.add_bond(a, b, EdgeData::new());
    }
    let mut set = MonomerSet { trees: Vec::new(), graph: graph.to_spec() };

    // L3 -> S20 (+S18) -> P14 -> L3
    let mut a = Tree::new("L3").with_dag_id(1);
    let s20 = a.add_child(a.root(), 1, "S20", EdgeData::new(), false)?;
    a.add_child(s20, 2, "S18", EdgeData::new(), true)?;
    let p14 = a.add_child(s20, 3, "P14", EdgeData::new(), false)?;
    a.close_to_root(p14, EdgeData::new());
    set.push(&a);

    // L3 -> S32 -> S20 -> L3
    let mut b = Tree::new("L3").with_dag_id(2);
    let s32 = b.add_child(b.root(), 1, "S32", EdgeData::new(), false)?;
    let s20 = b.add_child(s32, 2, "S20", EdgeData::new(), false)?;
    b.close_to_root(s20, EdgeData::new());
    set.push(&b);

    // L3 -> S20 (+S18, +S18) -> L3
    let mut c = Tree::new("L3").with_dag_id(3);
    let s20 = c.add_child(c.root(), 1, "S20", EdgeData::new(), false)?;
    c.add_child(s20, 2, "S18", EdgeData::new(), true)?;
    c.add_child(s20, 3, "S18", EdgeData::new(), true)?;
    c.close_to_root(s20, EdgeData::new());
    set.push(&c);

    Ok(set)
}

fn cmd_demo() {
    println!(
        r#"
╔══════════════════════════════════════════════════════════════╗
║              Polywalk v0.1 — Full Demo                       ║
║       Canonical walks + Diffusion + Sampling + Rules         ║
╚══════════════════════════════════════════════════════════════╝
"#
    );

    let set = match demo_set() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("  Failed to build demo set: {}", e);
            return;
        }
    };
    println!("  {}", set.summary());
    let flags = Flags::default();
    let Some(dg) = load_graph(&set, &flags) else { return };
    println!("  Shared index space: {}", dg.labels().join(" "));

    // Step 1: canonical walks
    println!("\nStep 1: Canonical walks...");
    println!("{}", "-".repeat(60));
    for p in dg.processes() {
        println!(
            "  [{}] {} orderings | {}",
            p.tree().dag_id.unwrap_or(0),
            p.canonical_walk().total(),
            p.walk_labels().join(" ")
        );
    }

    let space = WalkSpace::of(&dg);
    let Some(model) = flags.model(&space) else { return };
    let verifier = ConnectivityVerifier::new(&space);

    // Step 2: sampling
    println!("\nStep 2: Sampling novel monomers...");
    println!("{}", "-".repeat(60));
    let config = SampleConfig {
        num_generate: 5,
        max_attempts: 2_000,
        rng_seed: Some(42),
        ..SampleConfig::default()
    };
    let mut seen = known_fingerprints(&dg);
    let report = sample_walks(&model, &space, &verifier, &mut seen, &config);
    println!("  {}", report.metrics.summary());
    for w in &report.novel {
        println!("  {}", w.names.join(" "));
    }

    // Step 3: rules
    println!("\nStep 3: Rule extraction (depth 2..=3)...");
    println!("{}", "-".repeat(60));
    let rules = extract_rules(&model, &space, &verifier, &RuleConfig::default());
    let table = RuleTable::from_rules(&rules, space.labels());
    println!("  {}", table.summary());
    print!("{}", table.to_text());

    // Step 4: best-first
    println!("\nStep 4: Best-first closed walks...");
    println!("{}", "-".repeat(60));
    let config = RuleConfig {
        num_generate: Some(5),
        ..RuleConfig::default()
    };
    for w in extract_all_walks(&model, &space, &verifier, &config) {
        println!("  {:>8.3}  {}", w.log_prob, w.trajectory.to_names(space.labels()).join(" "));
    }
}
