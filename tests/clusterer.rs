use fcd_lesion_eval::cluster::{cluster_islands, subject_threshold, threshold_and_cluster};
use fcd_lesion_eval::math::sigmoid::SigmoidParams;
use fcd_lesion_eval::mesh::{Adjacency, Cohort, CortexMask};
use fcd_lesion_eval::threshold::ThresholdParameters;

fn path_graph(n: usize) -> Adjacency {
    let edges: Vec<(usize, usize)> = (0..n - 1).map(|i| (i, i + 1)).collect();
    Adjacency::from_edges(n, &edges).unwrap()
}

fn full_cortex(n: usize) -> Cohort {
    Cohort::new(CortexMask::all(n), path_graph(n)).unwrap()
}

fn pred(n: usize, high: &[std::ops::Range<usize>]) -> Vec<f32> {
    let mut out = vec![0.1f32; n];
    for r in high {
        for v in r.clone() {
            out[v] = 0.9;
        }
    }
    out
}

#[test]
fn islands_below_min_area_are_dropped() {
    let mut mask = vec![false; 10];
    for v in [0, 1, 2, 6, 7] {
        mask[v] = true;
    }
    let (ids, count) = cluster_islands(&mask, &path_graph(10), 0, 3).unwrap();
    assert_eq!(count, 1);
    assert_eq!(&ids[..3], &[1, 1, 1]);
    assert!(ids[3..].iter().all(|&c| c == 0));
}

#[test]
fn island_ids_continue_from_counter() {
    let mut mask = vec![false; 6];
    mask[0] = true;
    mask[4] = true;
    let (ids, count) = cluster_islands(&mask, &path_graph(6), 7, 1).unwrap();
    assert_eq!(count, 9);
    assert_eq!(ids, vec![8, 0, 0, 0, 9, 0]);
}

#[test]
fn island_mask_length_must_match_mesh() {
    assert!(cluster_islands(&[true; 4], &path_graph(5), 0, 1).is_err());
}

#[test]
fn counter_is_shared_from_left_to_right() {
    let cohort = full_cortex(10);
    let mut prediction = pred(10, &[0..3, 6..8]);
    prediction.extend(pred(10, &[2..6]));

    let clustered = threshold_and_cluster(&cohort, &prediction, 0.5, 2).unwrap();
    assert_eq!(clustered.len(), 20);
    assert_eq!(&clustered[0..3], &[1, 1, 1]);
    assert_eq!(&clustered[6..8], &[2, 2]);
    assert!(clustered[12..16].iter().all(|&c| c == 3));
    assert_eq!(clustered.iter().copied().max(), Some(3));
}

#[test]
fn non_cortex_vertices_split_components() {
    let mut mask = vec![true; 10];
    mask[5] = false;
    let cohort = Cohort::new(CortexMask::from_mask(mask), path_graph(10)).unwrap();
    assert_eq!(cohort.n_cortex(), 9);

    let prediction = vec![0.8f32; 18];
    let clustered = threshold_and_cluster(&cohort, &prediction, 0.5, 1).unwrap();
    // cortex index 5 is mesh vertex 6
    assert_eq!(&clustered[..9], &[1, 1, 1, 1, 1, 2, 2, 2, 2]);
    assert_eq!(&clustered[9..], &[3, 3, 3, 3, 3, 4, 4, 4, 4]);
}

#[test]
fn threshold_is_inclusive() {
    let cohort = full_cortex(4);
    let prediction = vec![0.5f32, 0.5, 0.2, 0.2, 0.2, 0.2, 0.2, 0.2];
    let clustered = threshold_and_cluster(&cohort, &prediction, 0.5, 1).unwrap();
    assert_eq!(clustered, vec![1, 1, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn nothing_above_threshold_yields_all_zero() {
    let cohort = full_cortex(5);
    let clustered = threshold_and_cluster(&cohort, &[0.1; 10], 0.5, 1).unwrap();
    assert!(clustered.iter().all(|&c| c == 0));
}

#[test]
fn prediction_length_is_checked() {
    let cohort = full_cortex(5);
    assert!(threshold_and_cluster(&cohort, &[0.9; 9], 0.5, 1).is_err());
}

#[test]
fn clustering_is_deterministic() {
    let cohort = full_cortex(30);
    let mut prediction = pred(30, &[1..5, 9..14, 20..29]);
    prediction.extend(pred(30, &[0..2, 15..25]));
    let a = threshold_and_cluster(&cohort, &prediction, 0.5, 2).unwrap();
    let b = threshold_and_cluster(&cohort, &prediction, 0.5, 2).unwrap();
    assert_eq!(a, b);
}

#[test]
fn fixed_threshold_ignores_distance() {
    let t = subject_threshold(&ThresholdParameters::Fixed(0.4), None, "s1").unwrap();
    assert_eq!(t, 0.4);
}

#[test]
fn sigmoid_threshold_uses_minimum_distance() {
    let params = SigmoidParams {
        ymin: 0.1,
        ymax: 0.9,
        k: 2.0,
        m: 10.0,
    };
    let distance = vec![50.0, f32::NAN, 10.0, 30.0];
    let t = subject_threshold(&ThresholdParameters::Sigmoid(params), Some(&distance), "s1").unwrap();
    assert!((t - 0.5).abs() < 1e-4);
}

#[test]
fn sigmoid_threshold_requires_distance() {
    let params = SigmoidParams {
        ymin: 0.1,
        ymax: 0.9,
        k: 2.0,
        m: 10.0,
    };
    let sig = ThresholdParameters::Sigmoid(params);
    assert!(subject_threshold(&sig, None, "s1").is_err());
    let err = subject_threshold(&sig, Some(&[f32::NAN, f32::NAN]), "s1").unwrap_err();
    assert!(format!("{:#}", err).contains("s1"));
}

#[test]
fn small_island_dropped_large_island_kept() {
    let n = 210;
    // 5-vertex island, a gap, then a 200-vertex island
    let mut mask = vec![true; n];
    mask[5..10].fill(false);
    let (ids, count) = cluster_islands(&mask, &path_graph(n), 4, 100).unwrap();
    assert_eq!(count, 5);
    assert!(ids[..5].iter().all(|&c| c == 0));
    assert!(ids[10..].iter().all(|&c| c == 5));
}

#[test]
fn empty_mask_leaves_counter_unchanged() {
    let (ids, count) = cluster_islands(&[false; 8], &path_graph(8), 3, 1).unwrap();
    assert_eq!(count, 3);
    assert!(ids.iter().all(|&c| c == 0));
}

#[test]
fn left_and_right_ids_are_disjoint() {
    let cohort = full_cortex(12);
    let mut prediction = pred(12, &[0..4, 8..12]);
    prediction.extend(pred(12, &[0..4, 8..12]));
    let clustered = threshold_and_cluster(&cohort, &prediction, 0.5, 1).unwrap();
    let left: std::collections::BTreeSet<u32> =
        clustered[..12].iter().copied().filter(|&c| c > 0).collect();
    let right: std::collections::BTreeSet<u32> =
        clustered[12..].iter().copied().filter(|&c| c > 0).collect();
    assert_eq!(left.len(), 2);
    assert_eq!(right.len(), 2);
    assert!(left.is_disjoint(&right));
}

#[test]
fn lesion_of_150_vertices_is_one_detected_island() {
    let n = 400;
    let cohort = full_cortex(n);
    let mut labels = vec![false; 2 * n];
    labels[100..250].fill(true);
    let prediction: Vec<f32> = labels.iter().map(|&l| if l { 0.9 } else { 0.05 }).collect();

    let clustered = threshold_and_cluster(&cohort, &prediction, 0.5, 100).unwrap();
    assert_eq!(clustered.iter().copied().max(), Some(1));
    assert_eq!(clustered.iter().filter(|&&c| c == 1).count(), 150);

    let stats = fcd_lesion_eval::metrics::subject_stats("sub-01", &clustered, &labels).unwrap();
    assert!(stats.detected);
    assert_eq!(stats.dice_lesional, 1.0);
    assert_eq!((stats.fp, stats.fn_), (0, 0));
}
