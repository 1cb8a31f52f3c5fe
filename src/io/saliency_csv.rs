use std::path::Path;

use anyhow::{Context, Result};

use crate::saliency::ClusterAttribution;

/// Writes one row per `(subject, cluster, aggregation)` with one column per
/// feature. Unnamed features are called `feature_<i>`.
pub fn write_saliency(
    path: &Path,
    rows: &[ClusterAttribution],
    feature_names: &[String],
) -> Result<()> {
    let n_features = rows.first().map(|r| r.mean.len()).unwrap_or(feature_names.len());
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let mut header = vec![
        "subject".to_string(),
        "cluster".to_string(),
        "aggregation".to_string(),
        "hemisphere".to_string(),
        "n_vertices".to_string(),
    ];
    for i in 0..n_features {
        header.push(
            feature_names
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("feature_{}", i)),
        );
    }
    writer.write_record(&header)?;

    for row in rows {
        for (aggregation, values) in [("mean", &row.mean), ("std", &row.std)] {
            let mut record = vec![
                row.subject.clone(),
                row.cluster.to_string(),
                aggregation.to_string(),
                row.hemi.code().to_string(),
                row.n_vertices.to_string(),
            ];
            record.extend(values.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
