use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::ctx::{Ctx, SubjectRecord};
use crate::mesh::{Cohort, HemiPair, Hemisphere};
use crate::pipeline::Stage;
use crate::predict::FeatureMatrix;
use crate::store::{DISTANCE_MAP, FEATURES, LABELS, PredictionStore, VertexArray};

/// Loads labels, ground-truth distances and (optionally) features for every
/// subject of the run from the input store.
pub struct Stage2Inputs {
    with_features: bool,
}

impl Stage2Inputs {
    pub fn new(with_features: bool) -> Self {
        Self { with_features }
    }
}

impl Stage for Stage2Inputs {
    fn name(&self) -> &'static str {
        "stage2_inputs"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let store = ctx.inputs_store()?;
        if !store.exists() {
            bail!("input store {} not found", store.path().display());
        }
        let ids = if ctx.requested_subjects.is_empty() {
            store.subjects()?
        } else {
            ctx.requested_subjects.clone()
        };
        if ids.is_empty() {
            bail!("no subjects found in {}", store.path().display());
        }

        let cohort = ctx.cohort()?.clone();
        let max_distance = ctx.config.max_distance;
        let mut warnings = Vec::new();
        for id in &ids {
            let record = load_subject(
                &store,
                &cohort,
                id,
                self.with_features,
                max_distance,
                &mut warnings,
            )?;
            debug!(
                subject = %id,
                patient = record.is_patient(),
                features = record.features.is_some(),
                "subject inputs loaded"
            );
            ctx.subjects.insert(id.clone(), record);
        }
        for w in warnings {
            ctx.warn(w);
        }
        ctx.subject_ids = ids;

        let patients = ctx.subjects.values().filter(|r| r.is_patient()).count();
        info!(
            subjects = ctx.subject_ids.len(),
            patients,
            controls = ctx.subject_ids.len() - patients,
            "inputs_ready"
        );
        Ok(())
    }
}

pub fn load_subject(
    store: &PredictionStore,
    cohort: &Cohort,
    subject: &str,
    with_features: bool,
    max_distance: f32,
    warnings: &mut Vec<String>,
) -> Result<SubjectRecord> {
    let labels = match store.load(subject, LABELS)? {
        Some(pair) => masked_concat(cohort, &pair)?
            .into_iter()
            .map(|x| x > 0.5)
            .collect(),
        None => {
            warnings.push(format!(
                "subject {}: no labels in input store; treated as control",
                subject
            ));
            vec![false; 2 * cohort.n_cortex()]
        }
    };
    let patient = labels.iter().any(|&l| l);

    let boundary_distance = match store.load(subject, DISTANCE_MAP)? {
        Some(pair) => Some(masked_concat(cohort, &pair)?),
        None if patient => {
            warnings.push(format!(
                "subject {}: no distance map in input store; borderzone falls back to labels",
                subject
            ));
            None
        }
        None => Some(vec![max_distance; 2 * cohort.n_cortex()]),
    };

    let features = if with_features {
        let pair = store
            .load(subject, FEATURES)?
            .with_context(|| format!("subject {}: no features in input store", subject))?;
        Some(pair.try_map(|hemi, array| {
            let width = array.width;
            FeatureMatrix::new(cohort.n_vertices(), width, array.into_f32())
                .with_context(|| format!("subject {} {}: features", subject, hemi))
        })?)
    } else {
        None
    };

    Ok(SubjectRecord {
        labels,
        boundary_distance,
        features,
        ..SubjectRecord::default()
    })
}

/// Cortex-only, hemisphere-concatenated single-column values.
pub fn masked_concat(cohort: &Cohort, pair: &HemiPair<VertexArray>) -> Result<Vec<f32>> {
    let mut out = Vec::with_capacity(2 * cohort.n_cortex());
    for hemi in Hemisphere::ALL {
        let array = pair.get(hemi);
        if array.width != 1 {
            bail!(
                "{} dataset has {} columns, expected 1",
                hemi,
                array.width
            );
        }
        out.extend(cohort.cortex.restrict(&array.to_f32())?);
    }
    Ok(out)
}
