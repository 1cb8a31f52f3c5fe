use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::mesh::{Cohort, Hemisphere};
use crate::store::{PREDICTION_CLUSTERED, PredictionStore};

/// Where a subject's cluster assignment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSource {
    Memory,
    Store,
    Recomputed,
}

/// Finds the cortex-only cluster assignment of `subject`, trying the
/// in-memory result, then the results store, then `recompute`. Fails only
/// when all three are unavailable.
pub fn resolve_clusters(
    subject: &str,
    in_memory: Option<&[u32]>,
    store: &PredictionStore,
    cohort: &Cohort,
    recompute: impl FnOnce() -> Result<Vec<u32>>,
) -> Result<(Vec<u32>, ClusterSource)> {
    if let Some(clustered) = in_memory {
        return Ok((clustered.to_vec(), ClusterSource::Memory));
    }

    match load_stored(subject, store, cohort) {
        Ok(Some(clustered)) => {
            debug!(subject, "clusters loaded from results store");
            return Ok((clustered, ClusterSource::Store));
        }
        Ok(None) => debug!(subject, "no stored clusters; recomputing"),
        Err(err) => warn!(subject, error = %err, "stored clusters unreadable; recomputing"),
    }

    let clustered = recompute().map_err(|err| {
        anyhow!(
            "subject {}: no cluster assignment in memory or in {}, and recomputing failed: {:#}",
            subject,
            store.path().display(),
            err
        )
    })?;
    Ok((clustered, ClusterSource::Recomputed))
}

fn load_stored(subject: &str, store: &PredictionStore, cohort: &Cohort) -> Result<Option<Vec<u32>>> {
    let Some(pair) = store.load(subject, PREDICTION_CLUSTERED)? else {
        return Ok(None);
    };
    let mut out = Vec::with_capacity(2 * cohort.n_cortex());
    for hemi in Hemisphere::ALL {
        let full = pair
            .get(hemi)
            .clone()
            .into_u32()
            .with_context(|| format!("subject {} {}: stored clusters", subject, hemi))?;
        out.extend(cohort.cortex.restrict(&full)?);
    }
    Ok(Some(out))
}
