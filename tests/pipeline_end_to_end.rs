use std::fs;
use std::path::{Path, PathBuf};

use fcd_lesion_eval::config::EvalConfig;
use fcd_lesion_eval::ctx::Ctx;
use fcd_lesion_eval::mesh::HemiPair;
use fcd_lesion_eval::metrics::results_csv::read_rows;
use fcd_lesion_eval::pipeline::stage0_scaffold::Stage0Scaffold;
use fcd_lesion_eval::pipeline::stage1_cohort::Stage1Cohort;
use fcd_lesion_eval::pipeline::stage2_inputs::Stage2Inputs;
use fcd_lesion_eval::pipeline::stage3_predict::Stage3Predict;
use fcd_lesion_eval::pipeline::stage4_cluster::Stage4Cluster;
use fcd_lesion_eval::pipeline::stage5_metrics::Stage5Metrics;
use fcd_lesion_eval::pipeline::stage6_roc::Stage6Roc;
use fcd_lesion_eval::pipeline::stage7_threshold_search::Stage7ThresholdSearch;
use fcd_lesion_eval::pipeline::stage8_saliency::Stage8Saliency;
use fcd_lesion_eval::pipeline::stage9_output::Stage9Output;
use fcd_lesion_eval::pipeline::{Pipeline, Stage};
use fcd_lesion_eval::predict::LinearLesionModel;
use fcd_lesion_eval::store::{
    DISTANCE_MAP, FEATURES, LABELS, PREDICTION, PredictionStore, RetryPolicy, VertexArray,
};
use fcd_lesion_eval::threshold::ThresholdParameters;
use serde_json::Value;
use tempfile::TempDir;

const N: usize = 40;

struct Fixture {
    _tmp: TempDir,
    mesh_dir: PathBuf,
    inputs: PathBuf,
    out_dir: PathBuf,
}

fn write_mesh(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    let edges: String = (0..N - 1).map(|i| format!("{}\t{}\n", i, i + 1)).collect();
    fs::write(dir.join("adjacency.tsv"), edges).unwrap();
    // last vertex is medial wall
    let label: String = (0..N - 1).map(|i| format!("{}\n", i)).collect();
    fs::write(dir.join("cortex.label"), label).unwrap();
    fs::write(dir.join("mesh.json"), format!("{{\"n_vertices\": {}}}", N)).unwrap();
}

fn indicator(range: std::ops::Range<usize>) -> Vec<f32> {
    (0..N).map(|v| if range.contains(&v) { 1.0 } else { 0.0 }).collect()
}

fn features(lesion: std::ops::Range<usize>) -> VertexArray {
    let mut data = Vec::with_capacity(N * 2);
    for v in 0..N {
        data.push(if lesion.contains(&v) { 1.0 } else { 0.0 });
        data.push(0.5);
    }
    VertexArray::f32_rows(data, 2)
}

fn distance_to(center: usize) -> Vec<f32> {
    (0..N).map(|v| (v as f32 - center as f32).abs()).collect()
}

fn write_inputs(path: &Path) {
    let store = PredictionStore::new(path, N, RetryPolicy::default());
    let f32s = |l: Vec<f32>, r: Vec<f32>| HemiPair::new(VertexArray::f32(l), VertexArray::f32(r));

    // detected patient: lesion on the left, visible in feature 0
    store
        .save("sub-01", &HemiPair::new(features(5..13), features(0..0)), FEATURES)
        .unwrap();
    store
        .save("sub-01", &f32s(indicator(5..13), indicator(0..0)), LABELS)
        .unwrap();
    store
        .save("sub-01", &f32s(distance_to(9), vec![100.0; N]), DISTANCE_MAP)
        .unwrap();

    // control without a distance map
    store
        .save("sub-02", &HemiPair::new(features(0..0), features(0..0)), FEATURES)
        .unwrap();
    store
        .save("sub-02", &f32s(indicator(0..0), indicator(0..0)), LABELS)
        .unwrap();

    // missed patient: lesion on the right, invisible in the features
    store
        .save("sub-03", &HemiPair::new(features(0..0), features(0..0)), FEATURES)
        .unwrap();
    store
        .save("sub-03", &f32s(indicator(0..0), indicator(20..26)), LABELS)
        .unwrap();
    store
        .save("sub-03", &f32s(vec![100.0; N], distance_to(23)), DISTANCE_MAP)
        .unwrap();
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let mesh_dir = tmp.path().join("mesh");
    let inputs = tmp.path().join("inputs.bin");
    let out_dir = tmp.path().join("experiment");
    write_mesh(&mesh_dir);
    write_inputs(&inputs);
    Fixture {
        _tmp: tmp,
        mesh_dir,
        inputs,
        out_dir,
    }
}

fn model() -> LinearLesionModel {
    LinearLesionModel {
        weights: vec![4.0, 0.0],
        bias: -2.0,
        distance_weights: Some(vec![-30.0, 0.0]),
        distance_bias: 30.0,
    }
}

fn config(fx: &Fixture) -> EvalConfig {
    EvalConfig {
        out_dir: fx.out_dir.clone(),
        min_area_threshold: 3,
        ..EvalConfig::default()
    }
}

fn new_ctx(fx: &Fixture, command: &str, config: EvalConfig, with_model: bool) -> Ctx {
    let mut ctx = Ctx::new(
        command,
        config,
        fx.mesh_dir.clone(),
        fx.inputs.clone(),
        Vec::new(),
    );
    if with_model {
        ctx.model = Some(Box::new(model()));
    }
    ctx
}

fn run(ctx: &mut Ctx, stages: Vec<Box<dyn Stage>>) {
    Pipeline::new(stages).run(ctx).unwrap();
}

fn full_run(ctx: &mut Ctx) {
    run(
        ctx,
        vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage1Cohort::new()),
            Box::new(Stage2Inputs::new(true)),
            Box::new(Stage3Predict::new(false)),
            Box::new(Stage4Cluster::new()),
            Box::new(Stage5Metrics::new()),
            Box::new(Stage6Roc::new()),
            Box::new(Stage9Output::new()),
        ],
    );
}

#[test]
fn full_run_scores_every_subject() {
    let fx = fixture();
    let mut ctx = new_ctx(&fx, "run", config(&fx), true);
    full_run(&mut ctx);

    assert_eq!(ctx.subject_ids, vec!["sub-01", "sub-02", "sub-03"]);
    assert!(ctx.warnings.is_empty(), "{:?}", ctx.warnings);

    let sub01 = ctx.subjects["sub-01"].stats.as_ref().unwrap();
    assert!(sub01.detected);
    assert_eq!(sub01.tp, 8);
    assert_eq!(sub01.number_clusters, 0);
    assert!((sub01.dice_lesional - 1.0).abs() < 1e-12);

    let clustered = ctx.subjects["sub-01"].clustered.as_ref().unwrap();
    assert_eq!(clustered.len(), 2 * (N - 1));
    assert!(clustered[5..13].iter().all(|&c| c == 1));
    assert_eq!(clustered.iter().filter(|&&c| c > 0).count(), 8);

    let sub03 = ctx.subjects["sub-03"].stats.as_ref().unwrap();
    assert!(sub03.group);
    assert!(!sub03.detected);
    let sub02 = ctx.subjects["sub-02"].stats.as_ref().unwrap();
    assert!(!sub02.group);
    assert_eq!(sub02.number_clusters, 0);

    let roc = ctx.roc.as_ref().unwrap();
    assert_eq!((roc.n_patients, roc.n_controls), (2, 1));
    assert_eq!(roc.thresholds.len(), 51);

    let rows = read_rows(&fx.out_dir.join("results").join("test_results.csv")).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].id, "sub-01");

    let summary: Value = serde_json::from_slice(
        &fs::read(fx.out_dir.join("results").join("summary.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(summary["tool"], "fcd-lesion-eval");
    assert_eq!(summary["command"], "run");
    assert_eq!(summary["subjects"]["patients"], 2);
    assert_eq!(summary["subjects"]["detected"], 1);
    assert_eq!(summary["detection"]["detection_rate"], 0.5);
    assert_eq!(summary["threshold"], "fixed(0.5)");
    assert!(fx.out_dir.join("results").join("roc_curves.json").exists());
}

#[test]
fn stored_predictions_are_full_length_and_reused() {
    let fx = fixture();
    let mut first = new_ctx(&fx, "predict", config(&fx), true);
    full_run(&mut first);

    let predictions = fx.out_dir.join("results").join("predictions.bin");
    let store = PredictionStore::new(&predictions, N, RetryPolicy::default());
    assert_eq!(store.subjects().unwrap(), vec!["sub-01", "sub-02", "sub-03"]);
    let stored = store.load("sub-01", PREDICTION).unwrap().unwrap();
    assert_eq!(stored.left.n_vertices(), N);
    // medial wall is written as zero
    assert_eq!(stored.left.to_f32()[N - 1], 0.0);

    // no model: the second run must reuse what the first one stored
    let mut second = new_ctx(&fx, "evaluate", config(&fx), false);
    run(
        &mut second,
        vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage1Cohort::new()),
            Box::new(Stage2Inputs::new(false)),
            Box::new(Stage3Predict::new(false)),
            Box::new(Stage4Cluster::new()),
        ],
    );
    assert_eq!(
        second.subjects["sub-01"].prediction,
        first.subjects["sub-01"].prediction
    );
    assert_eq!(
        second.subjects["sub-01"].clustered,
        first.subjects["sub-01"].clustered
    );
}

#[test]
fn missing_prediction_without_model_fails() {
    let fx = fixture();
    let mut ctx = new_ctx(&fx, "cluster", config(&fx), false);
    let err = Pipeline::new(vec![
        Box::new(Stage0Scaffold::new()),
        Box::new(Stage1Cohort::new()),
        Box::new(Stage2Inputs::new(false)),
        Box::new(Stage3Predict::new(false)),
    ])
    .run(&mut ctx)
    .unwrap_err();
    assert!(format!("{:#}", err).contains("no model given"));
}

#[test]
fn threshold_search_then_sigmoid_clustering() {
    let fx = fixture();
    let mut search = new_ctx(&fx, "optimize-threshold", config(&fx), true);
    run(
        &mut search,
        vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage1Cohort::new()),
            Box::new(Stage2Inputs::new(true)),
            Box::new(Stage3Predict::new(false)),
            Box::new(Stage7ThresholdSearch::new()),
            Box::new(Stage9Output::new()),
        ],
    );
    let result = search.sigmoid_search.unwrap();
    assert_eq!(result.n_patients, 2);
    assert!(result.ymin <= result.ymax);
    assert!(matches!(search.threshold, Some(ThresholdParameters::Sigmoid(_))));
    let params = fx.out_dir.join("results").join("sigmoid_parameters.csv");
    assert!(params.exists());

    let mut cluster_config = config(&fx);
    cluster_config.threshold = "sigmoid".to_string();
    let mut cluster = new_ctx(&fx, "cluster", cluster_config, false);
    run(
        &mut cluster,
        vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage1Cohort::new()),
            Box::new(Stage2Inputs::new(false)),
            Box::new(Stage3Predict::new(false)),
            Box::new(Stage4Cluster::new()),
        ],
    );
    assert_eq!(cluster.threshold, search.threshold);
    let clustered = cluster.subjects["sub-01"].clustered.as_ref().unwrap();
    assert!(clustered[5..13].iter().all(|&c| c > 0));
}

#[test]
fn sigmoid_threshold_without_parameters_fails() {
    let fx = fixture();
    let mut config = config(&fx);
    config.threshold = "sigmoid".to_string();
    let mut ctx = new_ctx(&fx, "cluster", config, true);
    let err = Pipeline::new(vec![
        Box::new(Stage0Scaffold::new()),
        Box::new(Stage1Cohort::new()),
        Box::new(Stage2Inputs::new(true)),
        Box::new(Stage3Predict::new(false)),
        Box::new(Stage4Cluster::new()),
    ])
    .run(&mut ctx)
    .unwrap_err();
    assert!(format!("{:#}", err).contains("sigmoid parameter file"));
}

#[test]
fn saliency_uses_clusters_from_store() {
    let fx = fixture();
    let mut first = new_ctx(&fx, "run", config(&fx), true);
    full_run(&mut first);

    let mut ctx = new_ctx(&fx, "saliency", config(&fx), true);
    run(
        &mut ctx,
        vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage1Cohort::new()),
            Box::new(Stage2Inputs::new(true)),
            Box::new(Stage8Saliency::new()),
            Box::new(Stage9Output::new()),
        ],
    );
    assert_eq!(ctx.saliency_supported, Some(true));
    assert_eq!(ctx.saliency.len(), 1);
    assert_eq!(ctx.saliency[0].subject, "sub-01");
    assert_eq!(ctx.saliency[0].n_vertices, 8);
    // feature 1 has zero weight
    assert_eq!(ctx.saliency[0].mean[1], 0.0);
    assert!(ctx.saliency[0].mean[0] > 0.0);

    let text = fs::read_to_string(fx.out_dir.join("results").join("saliency.csv")).unwrap();
    assert_eq!(text.lines().count(), 3);
}

#[test]
fn saliency_recomputes_clusters_when_none_are_stored() {
    let fx = fixture();
    let mut ctx = new_ctx(&fx, "saliency", config(&fx), true);
    run(
        &mut ctx,
        vec![
            Box::new(Stage0Scaffold::new()),
            Box::new(Stage1Cohort::new()),
            Box::new(Stage2Inputs::new(true)),
            Box::new(Stage8Saliency::new()),
        ],
    );
    assert_eq!(ctx.saliency.len(), 1);
    assert_eq!(ctx.saliency[0].cluster, 1);
}

#[test]
fn missing_labels_and_distance_produce_warnings() {
    let fx = fixture();
    let store = PredictionStore::new(&fx.inputs, N, RetryPolicy::default());
    store
        .save("sub-04", &HemiPair::new(features(0..0), features(0..0)), FEATURES)
        .unwrap();
    store
        .save(
            "sub-05",
            &HemiPair::new(features(10..20), features(0..0)),
            FEATURES,
        )
        .unwrap();
    store
        .save(
            "sub-05",
            &HemiPair::new(VertexArray::f32(indicator(10..20)), VertexArray::f32(indicator(0..0))),
            LABELS,
        )
        .unwrap();

    let mut ctx = new_ctx(&fx, "evaluate", config(&fx), true);
    full_run(&mut ctx);

    assert_eq!(ctx.subject_ids.len(), 5);
    assert!(!ctx.subjects["sub-04"].is_patient());
    assert!(ctx.warnings.iter().any(|w| w.contains("sub-04") && w.contains("no labels")));
    assert!(ctx.warnings.iter().any(|w| w.contains("sub-05") && w.contains("no distance map")));
    assert!(ctx.subjects["sub-05"].stats.as_ref().unwrap().detected);

    let summary: Value = serde_json::from_slice(
        &fs::read(fx.out_dir.join("results").join("summary.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(summary["warnings"].as_array().unwrap().len(), 2);
}

#[test]
fn fold_and_suffix_name_the_results_file() {
    let fx = fixture();
    let mut config = config(&fx);
    config.fold = Some(2);
    config.suffix = "_trial".to_string();
    let mut ctx = new_ctx(&fx, "run", config, true);
    full_run(&mut ctx);
    let results = fx.out_dir.join("results");
    assert!(results.join("test_results_2_trial.csv").exists());
    assert!(results.join("predictions_trial.bin").exists());
    assert!(results.join("summary_trial.json").exists());
}
