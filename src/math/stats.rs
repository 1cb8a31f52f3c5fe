//! Small numeric helpers shared by the metrics and saliency code.

pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    (sum / values.len() as f64) as f32
}

/// Population standard deviation (ddof = 0).
pub fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values) as f64;
    let var: f64 = values
        .iter()
        .map(|&v| {
            let d = v as f64 - m;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    var.sqrt() as f32
}

/// Minimum ignoring NaN; `None` when nothing finite-or-infinite remains.
pub fn nan_min(values: &[f32]) -> Option<f32> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f32| a.min(v))))
}

/// Dice overlap of two boolean masks. Two empty masks agree perfectly.
pub fn dice(pred: &[bool], truth: &[bool]) -> f64 {
    let mut intersection = 0usize;
    let mut pred_count = 0usize;
    let mut truth_count = 0usize;
    for (&p, &t) in pred.iter().zip(truth) {
        if p {
            pred_count += 1;
        }
        if t {
            truth_count += 1;
        }
        if p && t {
            intersection += 1;
        }
    }
    let denom = pred_count + truth_count;
    if denom == 0 {
        return 1.0;
    }
    2.0 * intersection as f64 / denom as f64
}

/// Trapezoid area under `y(x)`; points are sorted by `x` first.
pub fn trapezoid_auc(x: &[f64], y: &[f64]) -> f64 {
    let mut points: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    points
        .windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[1].1 + w[0].1) / 2.0)
        .sum()
}
