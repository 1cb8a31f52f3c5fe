use anyhow::Result;

use crate::ctx::Ctx;
use crate::schema::v1::{Detection, EvalSummaryV1, RocSummary, SigmoidSummary, SubjectCounts};

pub fn build_summary(ctx: &Ctx) -> Result<EvalSummaryV1> {
    let mut summary = EvalSummaryV1::empty(env!("CARGO_PKG_VERSION"), &ctx.command);
    summary.suffix = ctx.config.suffix.clone();
    summary.fold = ctx.config.fold;
    summary.threshold = ctx.threshold.map(|t| t.describe());
    summary.min_area_threshold = ctx.config.min_area_threshold as u64;

    let mut counts = SubjectCounts {
        total: ctx.subjects.len() as u64,
        patients: 0,
        controls: 0,
        detected: 0,
    };
    let mut dice_lesional = Vec::new();
    let mut dice_non_lesional = Vec::new();
    let mut false_positive_clusters = 0u64;
    for record in ctx.subjects.values() {
        if record.is_patient() {
            counts.patients += 1;
        } else {
            counts.controls += 1;
        }
        if let Some(stats) = &record.stats {
            if stats.group {
                dice_lesional.push(stats.dice_lesional);
                if stats.detected {
                    counts.detected += 1;
                }
            }
            dice_non_lesional.push(stats.dice_non_lesional);
            false_positive_clusters += stats.number_clusters as u64;
        }
    }
    let scored = !dice_non_lesional.is_empty();
    summary.detection = Detection {
        detection_rate: (scored && counts.patients > 0)
            .then(|| counts.detected as f64 / counts.patients as f64),
        mean_dice_lesional: mean_f64(&dice_lesional),
        mean_dice_non_lesional: mean_f64(&dice_non_lesional),
        false_positive_clusters,
    };
    summary.subjects = counts;

    summary.roc = ctx.roc.as_ref().map(|roc| RocSummary {
        auc: roc.auc,
        auc_plus: roc.auc_plus,
        points: roc.thresholds.len() as u64,
    });
    summary.sigmoid_search = ctx.sigmoid_search.map(|s| SigmoidSummary {
        ymin: s.ymin,
        ymax: s.ymax,
        k: s.k,
        m: s.m,
        score: s.score,
    });
    summary.saliency_clusters = ctx.saliency_supported.map(|_| ctx.saliency.len() as u64);

    let name = |p: &std::path::Path| p.display().to_string();
    summary.outputs.predictions = name(&ctx.output.predictions);
    if scored {
        summary.outputs.test_results = Some(name(&ctx.output.test_results));
    }
    if ctx.roc.is_some() {
        summary.outputs.roc_curves = Some(name(&ctx.output.roc));
    }
    if ctx.sigmoid_search.is_some() {
        summary.outputs.sigmoid_parameters = Some(name(&ctx.output.sigmoid_params));
    }
    if ctx.saliency_supported == Some(true) {
        summary.outputs.saliency = Some(name(&ctx.output.saliency));
    }
    summary.warnings = ctx.warnings.clone();
    Ok(summary)
}

/// One line for the terminal.
pub fn format_summary(summary: &EvalSummaryV1) -> String {
    let mut out = format!(
        "{} v{} {}: {} subjects ({} patients, {} controls)",
        summary.tool,
        summary.tool_version,
        summary.command,
        summary.subjects.total,
        summary.subjects.patients,
        summary.subjects.controls
    );
    if let Some(rate) = summary.detection.detection_rate {
        out.push_str(&format!(
            ", detected {}/{} ({:.1}%)",
            summary.subjects.detected,
            summary.subjects.patients,
            rate * 100.0
        ));
    }
    if let Some(d) = summary.detection.mean_dice_lesional {
        out.push_str(&format!(", dice {:.3}", d));
    }
    if let Some(roc) = &summary.roc {
        out.push_str(&format!(", auc {:.3}", roc.auc));
    }
    if let Some(s) = &summary.sigmoid_search {
        out.push_str(&format!(
            ", sigmoid ymin={} ymax={} k={} m={}",
            s.ymin, s.ymax, s.k, s.m
        ));
    }
    if let Some(n) = summary.saliency_clusters {
        out.push_str(&format!(", {} clusters attributed", n));
    }
    out.push('\n');
    out
}

fn mean_f64(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
