use fcd_lesion_eval::metrics::RocAccumulator;
use fcd_lesion_eval::metrics::roc::borderzone;

#[test]
fn thresholds_span_zero_to_one() {
    let acc = RocAccumulator::new(51).unwrap();
    let t = acc.thresholds();
    assert_eq!(t.len(), 51);
    assert_eq!(t[0], 0.0);
    assert_eq!(t[50], 1.0);
    assert!((t[25] - 0.5).abs() < 1e-6);
}

#[test]
fn too_few_points_is_an_error() {
    assert!(RocAccumulator::new(1).is_err());
}

#[test]
fn perfectly_separated_cohort_has_unit_auc() {
    let mut acc = RocAccumulator::new(51).unwrap();
    // patient: lesion vertex at 0.8, borderzone vertex at 0.9
    acc.add_subject(&[0.8, 0.9, 0.0], &[true, false, false], &[true, true, false])
        .unwrap();
    // control never exceeds 0.3
    acc.add_subject(&[0.3, 0.1, 0.2], &[false; 3], &[false; 3])
        .unwrap();
    assert_eq!(acc.n_patients(), 1);
    assert_eq!(acc.n_controls(), 1);

    let curves = acc.finalize();
    assert_eq!(curves.sensitivity_counts[40], 1);
    assert_eq!(curves.sensitivity_counts[41], 0);
    assert_eq!(curves.sensitivity_plus_counts[41], 1);
    assert_eq!(curves.sensitivity_plus_counts[46], 0);
    assert_eq!(curves.specificity_counts[15], 0);
    assert_eq!(curves.specificity_counts[16], 1);
    assert_eq!(curves.sensitivity[0], 1.0);
    assert_eq!(curves.specificity[50], 1.0);
    assert!((curves.auc - 1.0).abs() < 1e-12);
    assert!(curves.auc_plus >= curves.auc);
}

#[test]
fn missed_lesion_lowers_sensitivity() {
    let mut acc = RocAccumulator::new(11).unwrap();
    acc.add_subject(&[0.95, 0.0], &[true, false], &[true, false]).unwrap();
    acc.add_subject(&[0.05, 0.0], &[true, false], &[true, false]).unwrap();
    acc.add_subject(&[0.0, 0.0], &[false, false], &[false, false]).unwrap();

    let curves = acc.finalize();
    assert_eq!(curves.n_patients, 2);
    assert_eq!(curves.sensitivity_counts[0], 2);
    assert_eq!(curves.sensitivity_counts[5], 1);
    assert!((curves.sensitivity[5] - 0.5).abs() < 1e-12);
}

#[test]
fn cohort_without_controls_reports_zero_specificity() {
    let mut acc = RocAccumulator::new(5).unwrap();
    acc.add_subject(&[0.6], &[true], &[true]).unwrap();
    let curves = acc.finalize();
    assert_eq!(curves.n_controls, 0);
    assert!(curves.specificity.iter().all(|&s| s == 0.0));
}

#[test]
fn input_lengths_must_agree() {
    let mut acc = RocAccumulator::new(5).unwrap();
    assert!(acc.add_subject(&[0.1, 0.2], &[true], &[true]).is_err());
}

#[test]
fn borderzone_is_strictly_below_cutoff() {
    assert_eq!(
        borderzone(&[0.0, 19.9, 20.0, f32::NAN, 150.0], 20.0),
        vec![true, true, false, false, false]
    );
}

#[test]
fn counters_never_increase_with_threshold() {
    let mut acc = RocAccumulator::new(51).unwrap();
    let prediction: Vec<f32> = (0..20).map(|i| i as f32 / 19.0).collect();
    let mut labels = vec![false; 20];
    labels[15] = true;
    let zone: Vec<bool> = (0..20).map(|i| i >= 12).collect();
    acc.add_subject(&prediction, &labels, &zone).unwrap();
    acc.add_subject(&prediction, &labels, &zone).unwrap();
    let control: Vec<f32> = (0..20).map(|i| i as f32 / 40.0).collect();
    acc.add_subject(&control, &[false; 20], &[false; 20]).unwrap();

    let curves = acc.finalize();
    for w in curves.sensitivity_counts.windows(2) {
        assert!(w[1] <= w[0]);
    }
    for w in curves.sensitivity_plus_counts.windows(2) {
        assert!(w[1] <= w[0]);
    }
    for w in curves.specificity_counts.windows(2) {
        assert!(w[1] >= w[0]);
    }
    assert!((0.0..=1.0).contains(&curves.auc));
}
