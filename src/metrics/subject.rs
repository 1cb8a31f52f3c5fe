use std::collections::BTreeSet;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::math::stats::dice;

/// One row of `test_results*.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectStats {
    #[serde(rename = "ID")]
    pub id: String,
    pub group: bool,
    pub detected: bool,
    #[serde(rename = "number clusters")]
    pub number_clusters: usize,
    pub tp: u64,
    pub fp: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
    pub tn: u64,
    #[serde(rename = "dice lesional")]
    pub dice_lesional: f64,
    #[serde(rename = "dice non-lesional")]
    pub dice_non_lesional: f64,
}

/// Scores a clustered prediction against the ground-truth labels. Both are
/// cortex-only and hemisphere-concatenated.
pub fn subject_stats(id: &str, clustered: &[u32], labels: &[bool]) -> Result<SubjectStats> {
    if clustered.len() != labels.len() {
        bail!(
            "subject {}: clustered prediction has {} vertices, labels have {}",
            id,
            clustered.len(),
            labels.len()
        );
    }
    let group = labels.iter().any(|&l| l);
    let predicted: Vec<bool> = clustered.iter().map(|&c| c > 0).collect();
    let detected = predicted.iter().zip(labels).any(|(&p, &l)| p && l);

    let mut all_ids = BTreeSet::new();
    let mut lesional_ids = BTreeSet::new();
    for (&c, &l) in clustered.iter().zip(labels) {
        if c == 0 {
            continue;
        }
        all_ids.insert(c);
        if l {
            lesional_ids.insert(c);
        }
    }
    let number_clusters = all_ids.difference(&lesional_ids).count();

    let (mut tp, mut fp, mut fn_, mut tn) = (0u64, 0u64, 0u64, 0u64);
    if group {
        for (&p, &l) in predicted.iter().zip(labels) {
            match (p, l) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, true) => fn_ += 1,
                (false, false) => tn += 1,
            }
        }
    }

    let not_predicted: Vec<bool> = predicted.iter().map(|&p| !p).collect();
    let not_labelled: Vec<bool> = labels.iter().map(|&l| !l).collect();

    Ok(SubjectStats {
        id: id.to_string(),
        group,
        detected,
        number_clusters,
        tp,
        fp,
        fn_,
        tn,
        dice_lesional: dice(&predicted, labels),
        dice_non_lesional: dice(&not_predicted, &not_labelled),
    })
}
