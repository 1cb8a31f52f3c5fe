use fcd_lesion_eval::io::summary::format_summary;
use fcd_lesion_eval::schema::v1::{EvalSummaryV1, RocSummary};

#[test]
fn schema_roundtrip_v1() {
    let report = EvalSummaryV1::empty("0.0.0-test", "evaluate");
    let json = serde_json::to_string(&report).unwrap();
    let decoded: EvalSummaryV1 = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded.tool, "fcd-lesion-eval");
    assert_eq!(decoded.schema_version, "v1");
    assert_eq!(decoded.command, "evaluate");
    assert!(decoded.roc.is_none());
}

#[test]
fn summary_line_mentions_auc_when_present() {
    let mut report = EvalSummaryV1::empty("0.1.0", "evaluate");
    report.subjects.total = 3;
    report.subjects.patients = 2;
    report.subjects.controls = 1;
    report.roc = Some(RocSummary {
        auc: 0.75,
        auc_plus: 0.8,
        points: 51,
    });
    let line = format_summary(&report);
    assert!(line.starts_with("fcd-lesion-eval v0.1.0 evaluate: 3 subjects (2 patients, 1 controls)"));
    assert!(line.contains("auc 0.750"));
    assert!(line.ends_with('\n'));
}
