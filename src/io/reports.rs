use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::io::write_json;
use crate::metrics::RocCurves;
use crate::schema::v1::EvalSummaryV1;

pub fn write_roc_curves(path: &Path, curves: &RocCurves) -> Result<()> {
    write_json(path, curves)?;
    info!(path = %path.display(), auc = curves.auc, auc_plus = curves.auc_plus, "roc curves written");
    Ok(())
}

pub fn write_summary(path: &Path, summary: &EvalSummaryV1) -> Result<()> {
    write_json(path, summary)?;
    info!(path = %path.display(), "summary written");
    Ok(())
}
