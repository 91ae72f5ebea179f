//! Search drivers — many walks, verified, deduplicated, counted
//!
//! Failures inside a driver never abort it: every rejected walk lands in one
//! of the [`SampleMetrics`] counters.

use super::{
    extract_rule, sample_walk, ClosedWalk, Rule, RuleConfig, SampleConfig, SearchMode,
    StructuralVerifier, TransitionModel, WalkSpace,
};
use crate::trajectory::Trajectory;
use crate::tree::{split_label, CanonicalWalk, Tree, TreeError, TreeSpec};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

/// Per-category sampling counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMetrics {
    /// Walks drawn
    pub num_sampled: usize,
    /// Successful walks handed to the verifier
    pub num_tried: usize,
    /// Walks the verifier accepted
    pub num_valid: usize,
    /// Rejected for connectivity or malformed structure
    pub walk_invalid: usize,
    /// Rejected by chemistry rules
    pub chemical_invalid: usize,
    /// Valid walks not seen before
    pub num_novel: usize,
}

impl SampleMetrics {
    pub fn validity(&self) -> f64 {
        if self.num_tried == 0 {
            0.0
        } else {
            self.num_valid as f64 / self.num_tried as f64
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} sampled | {} tried | {} valid ({:.1}%) | {} walk-invalid | {} chem-invalid \
             | {} novel",
            self.num_sampled,
            self.num_tried,
            self.num_valid,
            self.validity() * 100.0,
            self.walk_invalid,
            self.chemical_invalid,
            self.num_novel
        )
    }
}

/// A verified, novel generated monomer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedWalk {
    pub names: Vec<String>,
    pub trajectory: Trajectory,
    pub tree: TreeSpec,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleReport {
    pub novel: Vec<GeneratedWalk>,
    /// Every verified walk, space-joined labels
    pub valid: Vec<String>,
    pub metrics: SampleMetrics,
}

/// Structural fingerprint: SHA-256 over the base labels of the canonical
/// walk, so label suffixes and node ids do not matter
pub fn fingerprint(tree: &Tree) -> Result<String, TreeError> {
    let mut tree = tree.clone();
    let walk = CanonicalWalk::new(&mut tree)?;
    let mut hasher = Sha256::new();
    for idx in walk.walk(&tree, 0)? {
        hasher.update(split_label(&tree.node(idx).value).0.as_bytes());
        hasher.update(if tree.node(idx).side_chain { b"+" } else { b"\n" });
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Sample, verify and deduplicate until `num_generate` novel walks or
/// `max_attempts` samples. Start groups cycle over the base labels.
/// `seen` holds fingerprints of known monomers and is extended with every
/// novel one.
pub fn sample_walks<M, V>(
    model: &M,
    space: &WalkSpace,
    verifier: &V,
    seen: &mut HashSet<String>,
    config: &SampleConfig,
) -> SampleReport
where
    M: TransitionModel + ?Sized,
    V: StructuralVerifier + ?Sized,
{
    let mut report = SampleReport::default();
    let starts = space.base_indices();
    if starts.is_empty() {
        warn!("no base groups to start walks from");
        return report;
    }
    let mut rng = match config.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let metrics = &mut report.metrics;
    while metrics.num_novel < config.num_generate && metrics.num_sampled < config.max_attempts {
        let start = starts[metrics.num_sampled % starts.len()];
        metrics.num_sampled += 1;
        let walk = sample_walk(model, space, start, config, &mut rng);
        if !walk.good || walk.trajectory.len() < 2 {
            continue;
        }
        metrics.num_tried += 1;

        let names = walk.trajectory.to_names(space.labels());
        let verified = match verifier.verify(&names, config.loop_back) {
            Ok(v) => v,
            Err(e) => {
                debug!("walk {:?} rejected: {}", names, e);
                if e.is_walk_invalid() {
                    metrics.walk_invalid += 1;
                } else {
                    metrics.chemical_invalid += 1;
                }
                continue;
            }
        };
        metrics.num_valid += 1;
        report.valid.push(names.join(" "));

        let tree = verified.tree.disambiguate();
        let fp = match fingerprint(&tree) {
            Ok(fp) => fp,
            Err(e) => {
                warn!("verified walk {:?} has no canonical form: {}", names, e);
                continue;
            }
        };
        if seen.insert(fp.clone()) {
            metrics.num_novel += 1;
            info!("novel walk {} ({}/{})", names.join(" "), metrics.num_novel, config.num_generate);
            report.novel.push(GeneratedWalk {
                names,
                trajectory: walk.trajectory,
                tree: tree.to_spec(),
                fingerprint: fp,
            });
        }
    }
    info!("Sampling done: {}", report.metrics.summary());
    report
}

/// Depth-bounded rules for every base label and every depth
/// `2..=max_rule_depth`, parallel over start labels. Rules whose source or
/// extension fails verification are dropped.
pub fn extract_rules<M, V>(
    model: &M,
    space: &WalkSpace,
    verifier: &V,
    config: &RuleConfig,
) -> BTreeMap<usize, Vec<Rule>>
where
    M: TransitionModel + ?Sized,
    V: StructuralVerifier + ?Sized,
{
    let mut table = BTreeMap::new();
    for depth in 2..=config.max_rule_depth {
        let rules: Vec<Rule> = space
            .base_indices()
            .par_iter()
            .flat_map_iter(|&start| {
                let mode = SearchMode::DepthBounded(depth);
                extract_rule(model, space, verifier, &[start], mode, config).rules
            })
            .filter(|rule| {
                [&rule.source, &rule.extended].iter().all(|t| {
                    let names = t.to_names(space.labels());
                    match verifier.verify(&names, t.is_closed()) {
                        Ok(_) => true,
                        Err(e) => {
                            warn!("dropping depth-{} rule side {:?}: {}", depth, names, e);
                            false
                        }
                    }
                })
            })
            .collect();
        info!("depth {}: {} rules", depth, rules.len());
        table.insert(depth, rules);
    }
    table
}

/// One best-first search seeded with every base label
pub fn extract_all_walks<M, V>(
    model: &M,
    space: &WalkSpace,
    verifier: &V,
    config: &RuleConfig,
) -> Vec<ClosedWalk>
where
    M: TransitionModel + ?Sized,
    V: StructuralVerifier + ?Sized,
{
    let starts = space.base_indices();
    let walks = extract_rule(model, space, verifier, starts, SearchMode::BestFirst, config).walks;
    info!("best-first search: {} closed walks", walks.len());
    walks
}
