//! Distance-dependent decision threshold.
//!
//! Maps the geodesic distance to a (predicted) lesion boundary onto a
//! threshold in `[ymin, ymax]`: vertices close to a lesion get a threshold near
//! `ymax`, distances beyond `2m` fall to `ymin`, and `m` is the midpoint.

const EPS: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigmoidParams {
    pub ymin: f32,
    pub ymax: f32,
    pub k: f32,
    pub m: f32,
}

impl SigmoidParams {
    pub fn eval(&self, x: f32) -> f32 {
        sigmoid_scalar(x, self.k, self.m, self.ymin, self.ymax)
    }
}

pub fn sigmoid(x: &[f32], k: f32, m: f32, ymin: f32, ymax: f32) -> Vec<f32> {
    x.iter()
        .map(|&xi| sigmoid_scalar(xi, k, m, ymin, ymax))
        .collect()
}

pub fn sigmoid_scalar(x: f32, k: f32, m: f32, ymin: f32, ymax: f32) -> f32 {
    let xmax = 2.0 * m;
    if k == 0.0 || x.is_nan() || x > xmax {
        return ymin;
    }
    let u = (x.max(0.0) / xmax).min(1.0);
    let odds = (u + EPS) / (1.0 - u + EPS);
    let squashed = 1.0 / (1.0 + odds.powf(-k));
    let y = ymax - (ymax - ymin) * squashed;
    if y.is_nan() || y < ymin {
        return ymin;
    }
    if y > ymax {
        return ymax;
    }
    y
}
