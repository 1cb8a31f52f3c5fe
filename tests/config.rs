use std::path::PathBuf;

use fcd_lesion_eval::config::{EvalConfig, StoreFormat};
use tempfile::TempDir;

#[test]
fn defaults_are_valid() {
    let config = EvalConfig::default();
    config.validate().unwrap();
    assert_eq!(config.threshold, "0.5");
    assert_eq!(config.min_area_threshold, 100);
    assert_eq!(config.roc_points, 51);
    assert_eq!(config.borderzone_distance, 20.0);
    assert_eq!(config.saliency.steps, 25);
    assert_eq!(config.saliency.batch_size, 5);
    assert_eq!(config.mc_dropout.repetitions, 1);
}

#[test]
fn partial_json_keeps_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"suffix": "_v2", "threshold": "sigmoid", "mc_dropout": {"repetitions": 10, "p": 0.2}}"#,
    )
    .unwrap();
    let config = EvalConfig::load(&path).unwrap();
    assert_eq!(config.suffix, "_v2");
    assert_eq!(config.threshold, "sigmoid");
    assert_eq!(config.mc_dropout.repetitions, 10);
    assert_eq!(config.mc_dropout.seed, 0);
    assert_eq!(config.min_area_threshold, 100);
    assert_eq!(config.store_format, StoreFormat::Binary);
}

#[test]
fn output_paths_follow_suffix_and_fold() {
    let mut config = EvalConfig {
        out_dir: PathBuf::from("/exp"),
        suffix: "_a".to_string(),
        ..EvalConfig::default()
    };
    assert_eq!(config.predictions_path(), PathBuf::from("/exp/results/predictions_a.bin"));
    assert_eq!(config.test_results_path(), PathBuf::from("/exp/results/test_results_a.csv"));
    assert_eq!(
        config.sigmoid_params_path(),
        PathBuf::from("/exp/results/sigmoid_parameters.csv")
    );
    config.fold = Some(3);
    config.store_format = StoreFormat::Hdf5;
    assert_eq!(config.test_results_path(), PathBuf::from("/exp/results/test_results_3_a.csv"));
    assert_eq!(config.predictions_path(), PathBuf::from("/exp/results/predictions_a.hdf5"));
}

#[test]
fn invalid_values_are_rejected() {
    let mut config = EvalConfig::default();
    config.mc_dropout.p = 1.0;
    assert!(config.validate().is_err());

    let mut config = EvalConfig::default();
    config.roc_points = 1;
    assert!(config.validate().is_err());

    let mut config = EvalConfig::default();
    config.suffix = "a/b".to_string();
    assert!(config.validate().is_err());

    let mut config = EvalConfig::default();
    config.threshold = "otsu".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn malformed_config_names_the_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = EvalConfig::load(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("broken.json"));
}
