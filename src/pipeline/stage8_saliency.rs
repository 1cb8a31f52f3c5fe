use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::cluster::{subject_threshold, threshold_and_cluster};
use crate::ctx::Ctx;
use crate::io::saliency_csv::write_saliency;
use crate::math::pool;
use crate::pipeline::Stage;
use crate::pipeline::stage4_cluster::resolve_threshold;
use crate::predict::{McDropout, predict_subject};
use crate::saliency::{SaliencyOutcome, attribute_subject, resolve_clusters};

pub struct Stage8Saliency;

impl Stage8Saliency {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Stage8Saliency {
    fn name(&self) -> &'static str {
        "stage8_saliency"
    }

    fn run(&self, ctx: &mut Ctx) -> Result<()> {
        let supported = ctx
            .model
            .as_deref()
            .context("saliency needs a model")?
            .supports_attribution();
        if !supported {
            ctx.saliency_supported = Some(false);
            ctx.warn("model does not support attribution; saliency skipped".to_string());
            return Ok(());
        }

        // Only needed when clusters have to be recomputed.
        let threshold = resolve_threshold(ctx).map_err(|e| format!("{:#}", e));
        let store = ctx.results_store()?;
        let cohort = ctx.cohort()?.clone();
        let dropout = McDropout::from_config(&ctx.config.mc_dropout)?;
        let saliency_config = ctx.config.saliency;
        let min_area = ctx.config.min_area_threshold;
        let threads = ctx.threads;
        let model = ctx.model.as_deref().context("saliency needs a model")?;

        let mut rows = Vec::new();
        let mut unsupported = false;
        for id in &ctx.subject_ids {
            let record = ctx
                .subjects
                .get(id)
                .with_context(|| format!("subject {} not loaded", id))?;
            let features = record
                .features
                .as_ref()
                .with_context(|| format!("subject {}: features not loaded", id))?;

            let (clustered, source) =
                resolve_clusters(id, record.clustered.as_deref(), &store, &cohort, || {
                    let params = threshold.clone().map_err(|e| anyhow!(e))?;
                    let predicted = pool::install(threads, || {
                        predict_subject(model, &cohort, features, &dropout, id)
                    })??;
                    let t = subject_threshold(&params, Some(&predicted.distance_map), id)?;
                    threshold_and_cluster(&cohort, &predicted.prediction, t, min_area)
                })?;

            let outcome = pool::install(threads, || {
                attribute_subject(model, &cohort, id, features, &clustered, &saliency_config)
            })??;
            match outcome {
                SaliencyOutcome::Computed(found) => {
                    info!(subject = %id, source = ?source, clusters = found.len(), "subject_attributed");
                    rows.extend(found);
                }
                SaliencyOutcome::Unsupported => {
                    unsupported = true;
                    break;
                }
            }
        }

        if unsupported {
            ctx.saliency_supported = Some(false);
            ctx.warn("model stopped providing gradients; saliency skipped".to_string());
            return Ok(());
        }
        write_saliency(&ctx.output.saliency, &rows, &ctx.config.feature_names)?;
        info!(path = %ctx.output.saliency.display(), clusters = rows.len(), "saliency_ready");
        ctx.saliency = rows;
        ctx.saliency_supported = Some(true);
        Ok(())
    }
}
