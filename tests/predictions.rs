mod common;

use candle_core::Device;
use candle_fewshot::predictions::{
    cosine, predict, predict_with_projection, LabelSet, PredictionResult,
};
use candle_fewshot::projection::{learn_projection, ProjectionMatrix};
use candle_fewshot::FewshotError;
use common::matrix;

#[test]
fn world_sports_business_scenario() {
    let labels = LabelSet::new(["World", "Sports", "Business"]);
    let prototypes = matrix(&[vec![1., 0.], vec![0., 1.], vec![-1., 0.]]);
    let queries = matrix(&[vec![0.9, 0.1]]);

    let results = predict(&queries, &prototypes, 2).unwrap();
    assert_eq!(results.len(), 1);
    let names: Vec<&str> = results[0]
        .labels()
        .into_iter()
        .map(|l| labels.name(l).unwrap())
        .collect();
    assert_eq!(names, vec!["World", "Sports"]);
    assert!((results[0].ranked[0].score - 0.9939).abs() < 1e-3);
}

#[test]
fn every_query_gets_min_k_n_scores_in_descending_order() {
    let prototypes = matrix(&[vec![1., 0., 0.], vec![0., 1., 0.], vec![0., 0., 1.]]);
    let queries = matrix(&[vec![0.2, 0.5, 0.3], vec![-1., 2., 0.5], vec![3., 1., 2.]]);

    for k in [1, 2, 3, 10] {
        let results = predict(&queries, &prototypes, k).unwrap();
        assert_eq!(results.len(), 3);
        for r in &results {
            assert_eq!(r.ranked.len(), k.min(3));
            assert!(r.ranked.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }
}

#[test]
fn predictions_are_deterministic() {
    let prototypes = matrix(&[vec![0.3, -0.2], vec![0.1, 0.9], vec![-0.5, 0.5]]);
    let queries = matrix(&[vec![0.7, 0.7], vec![-0.1, 0.4]]);
    assert_eq!(
        predict(&queries, &prototypes, 3).unwrap(),
        predict(&queries, &prototypes, 3).unwrap()
    );
}

#[test]
fn self_similarity_is_one() {
    let v = [0.3f32, -1.7, 2.2, 0.01];
    assert!((cosine(&v, &v).unwrap() - 1.0).abs() < 1e-6);
}

fn assert_same_ranking(plain: &[PredictionResult], projected: &[PredictionResult]) {
    assert_eq!(plain.len(), projected.len());
    for (a, b) in plain.iter().zip(projected) {
        assert_eq!(a.labels(), b.labels());
        for (x, y) in a.ranked.iter().zip(&b.ranked) {
            assert!((x.score - y.score).abs() < 1e-5, "{} != {}", x.score, y.score);
        }
    }
}

#[test]
fn identity_projection_matches_plain_prediction() {
    let prototypes = matrix(&[vec![1., 0., 0.5], vec![0., 1., 0.], vec![0.2, 0.2, 1.]]);
    let queries = matrix(&[vec![0.9, 0.1, 0.], vec![0., 0.3, 1.]]);

    let identity = ProjectionMatrix::identity(3, &Device::Cpu).unwrap();
    let plain = predict(&queries, &prototypes, 2).unwrap();
    let projected = predict_with_projection(&queries, &prototypes, &identity, 2).unwrap();
    assert_same_ranking(&plain, &projected);

    // A learned map between identical spaces is the identity as well
    let anchors = matrix(&[vec![1., 0., 0.], vec![0., 1., 0.], vec![0., 0., 1.], vec![1., 1., 1.]]);
    let learned = learn_projection(&anchors, &anchors).unwrap();
    let projected = predict_with_projection(&queries, &prototypes, &learned, 2).unwrap();
    assert_same_ranking(&plain, &projected);
}

#[test]
fn projected_prediction_checks_both_dimensions() {
    let projection = ProjectionMatrix::identity(2, &Device::Cpu).unwrap();
    let queries = matrix(&[vec![1., 0., 0.]]);
    let prototypes = matrix(&[vec![1., 0.]]);
    assert!(matches!(
        predict_with_projection(&queries, &prototypes, &projection, 1),
        Err(FewshotError::ShapeMismatch { .. })
    ));

    let queries = matrix(&[vec![1., 0.]]);
    let prototypes = matrix(&[vec![1., 0., 0.]]);
    assert!(matches!(
        predict_with_projection(&queries, &prototypes, &projection, 1),
        Err(FewshotError::ShapeMismatch { .. })
    ));
}
