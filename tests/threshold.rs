use fcd_lesion_eval::math::sigmoid::SigmoidParams;
use fcd_lesion_eval::threshold::{
    ThresholdParameters, ThresholdSpec, load_sigmoid_params, resolve, save_sigmoid_params,
};
use tempfile::TempDir;

#[test]
fn parse_fixed_and_sigmoid() {
    assert_eq!(ThresholdSpec::parse("0.5").unwrap(), ThresholdSpec::Fixed(0.5));
    assert_eq!(ThresholdSpec::parse(" Sigmoid ").unwrap(), ThresholdSpec::Sigmoid);
    assert_eq!(ThresholdSpec::parse("1").unwrap(), ThresholdSpec::Fixed(1.0));
}

#[test]
fn parse_rejects_unknown_mode_and_out_of_range() {
    let err = ThresholdSpec::parse("otsu").unwrap_err();
    assert!(format!("{:#}", err).contains("unrecognized threshold mode"));
    assert!(ThresholdSpec::parse("1.5").is_err());
    assert!(ThresholdSpec::parse("-0.1").is_err());
}

#[test]
fn sigmoid_params_roundtrip_through_csv() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("results").join("sigmoid_parameters.csv");
    let params = SigmoidParams {
        ymin: 0.05,
        ymax: 0.7,
        k: 2.0,
        m: 10.0,
    };
    save_sigmoid_params(&path, &params).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().next().unwrap(), "ymin,ymax,k,m");
    assert_eq!(load_sigmoid_params(&path).unwrap(), params);
    assert_eq!(
        resolve(ThresholdSpec::Sigmoid, &path).unwrap(),
        ThresholdParameters::Sigmoid(params)
    );
}

#[test]
fn missing_sigmoid_params_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let err = resolve(ThresholdSpec::Sigmoid, &tmp.path().join("nope.csv")).unwrap_err();
    assert!(format!("{:#}", err).contains("optimize-threshold"));
}

#[test]
fn inverted_sigmoid_params_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sigmoid_parameters.csv");
    std::fs::write(&path, "ymin,ymax,k,m\n0.9,0.1,1,10\n").unwrap();
    assert!(load_sigmoid_params(&path).is_err());
}

#[test]
fn fixed_threshold_resolves_without_file() {
    let tmp = TempDir::new().unwrap();
    let resolved = resolve(ThresholdSpec::Fixed(0.3), &tmp.path().join("absent.csv")).unwrap();
    assert_eq!(resolved, ThresholdParameters::Fixed(0.3));
    assert_eq!(resolved.describe(), "fixed(0.3)");
}
