use anyhow::{Context, Result};
use tracing::info;

use crate::ctx::Ctx;
use crate::math::pool;
use crate::mesh::Cohort;
use crate::pipeline::Stage;
use crate::predict::{McDropout, predict_subject};
use crate::store::{DISTANCE_MAP, PREDICTION, PredictionStore, VertexArray};

/// Fills `prediction` and `distance_map` for every subject, reusing the
/// results store unless `force` is set.
pub struct Stage3Predict {
    force: bool,
}

impl Stage3Predict {
    pub fn new(force: bool) -> Self {
        Self { force }
    }
}

impl Stage for Stage3Predict {
    fn name(&self) -> &'static str {
        "stage3_predict"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let store = ctx.results_store()?;
        let cohort = ctx.cohort()?.clone();
        let dropout = McDropout::from_config(&ctx.config.mc_dropout)?;
        let reuse = !self.force && ctx.config.reuse_predictions;
        let threads = ctx.threads;

        let mut computed = 0usize;
        let mut reused = 0usize;
        for id in ctx.subject_ids.clone() {
            let record = ctx
                .subjects
                .get_mut(&id)
                .with_context(|| format!("subject {} not loaded", id))?;

            if reuse {
                if let Some((prediction, distance_map)) = load_prediction(&store, &cohort, &id)? {
                    record.prediction = Some(prediction);
                    record.distance_map = Some(distance_map);
                    reused += 1;
                    info!(subject = %id, source = "store", "prediction_ready");
                    continue;
                }
            }

            let model = ctx.model.as_deref().with_context(|| {
                format!(
                    "subject {}: no stored prediction in {} and no model given",
                    id,
                    store.path().display()
                )
            })?;
            let features = record
                .features
                .as_ref()
                .with_context(|| format!("subject {}: features not loaded", id))?;
            let predicted = pool::install(threads, || {
                predict_subject(model, &cohort, features, &dropout, &id)
            })??;

            save_prediction(&store, &cohort, &id, &predicted.prediction, &predicted.distance_map)?;
            record.prediction = Some(predicted.prediction);
            record.distance_map = Some(predicted.distance_map);
            // downstream results are stale once the prediction changes
            record.clustered = None;
            record.stats = None;
            computed += 1;
            info!(subject = %id, source = "model", "prediction_ready");
        }
        info!(computed, reused, "predictions_ready");
        Ok(())
    }
}

pub fn load_prediction(
    store: &PredictionStore,
    cohort: &Cohort,
    subject: &str,
) -> Result<Option<(Vec<f32>, Vec<f32>)>> {
    let Some(prediction) = store.load(subject, PREDICTION)? else {
        return Ok(None);
    };
    let prediction = cohort.restrict_hemispheres(&prediction.map(|_, a| a.into_f32()))?;
    let distance_map = match store.load(subject, DISTANCE_MAP)? {
        Some(pair) => cohort.restrict_hemispheres(&pair.map(|_, a| a.into_f32()))?,
        None => vec![f32::NAN; prediction.len()],
    };
    Ok(Some((prediction, distance_map)))
}

pub fn save_prediction(
    store: &PredictionStore,
    cohort: &Cohort,
    subject: &str,
    prediction: &[f32],
    distance_map: &[f32],
) -> Result<()> {
    let prediction = cohort
        .expand_hemispheres(prediction, 0.0)?
        .map(|_, v| VertexArray::f32(v));
    store.save(subject, &prediction, PREDICTION)?;
    let distance = cohort
        .expand_hemispheres(distance_map, f32::NAN)?
        .map(|_, v| VertexArray::f32(v));
    store.save(subject, &distance, DISTANCE_MAP)?;
    Ok(())
}
