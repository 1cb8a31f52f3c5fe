use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::math::sigmoid::SigmoidParams;

/// How the decision threshold is chosen, as configured by the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdSpec {
    Fixed(f32),
    Sigmoid,
}

impl ThresholdSpec {
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("sigmoid") {
            return Ok(Self::Sigmoid);
        }
        match trimmed.parse::<f32>() {
            Ok(t) if (0.0..=1.0).contains(&t) => Ok(Self::Fixed(t)),
            Ok(t) => bail!("threshold {} outside [0, 1]", t),
            Err(_) => bail!(
                "unrecognized threshold mode '{}'; expected a number in [0, 1] or 'sigmoid'",
                value
            ),
        }
    }
}

/// The resolved threshold, fixed for the rest of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdParameters {
    Fixed(f32),
    Sigmoid(SigmoidParams),
}

impl ThresholdParameters {
    pub fn describe(&self) -> String {
        match self {
            Self::Fixed(t) => format!("fixed({})", t),
            Self::Sigmoid(p) => format!(
                "sigmoid(ymin={}, ymax={}, k={}, m={})",
                p.ymin, p.ymax, p.k, p.m
            ),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SigmoidRow {
    ymin: f32,
    ymax: f32,
    k: f32,
    m: f32,
}

pub fn save_sigmoid_params(path: &Path, params: &SigmoidParams) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    w.serialize(SigmoidRow {
        ymin: params.ymin,
        ymax: params.ymax,
        k: params.k,
        m: params.m,
    })?;
    w.flush()?;
    Ok(())
}

pub fn load_sigmoid_params(path: &Path) -> Result<SigmoidParams> {
    if !path.exists() {
        bail!(
            "sigmoid parameter file {} not found; run optimize-threshold first",
            path.display()
        );
    }
    let mut r = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let row: SigmoidRow = r
        .deserialize()
        .next()
        .with_context(|| format!("{} has no parameter row", path.display()))?
        .with_context(|| format!("malformed parameter row in {}", path.display()))?;
    if row.ymin > row.ymax {
        bail!(
            "{}: ymin ({}) greater than ymax ({})",
            path.display(),
            row.ymin,
            row.ymax
        );
    }
    Ok(SigmoidParams {
        ymin: row.ymin,
        ymax: row.ymax,
        k: row.k,
        m: row.m,
    })
}

pub fn resolve(spec: ThresholdSpec, sigmoid_params_path: &Path) -> Result<ThresholdParameters> {
    match spec {
        ThresholdSpec::Fixed(t) => Ok(ThresholdParameters::Fixed(t)),
        ThresholdSpec::Sigmoid => Ok(ThresholdParameters::Sigmoid(load_sigmoid_params(
            sigmoid_params_path,
        )?)),
    }
}
