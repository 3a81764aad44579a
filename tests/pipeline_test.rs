mod common;

use common::{detection, png_bytes, scan_image, Stubs, AXIAL, SAGITTAL};
use fetal_scan::analysis::{
    BoundingBox, PipelineStage, PlaneLabel, ProcessedImageRecord, ScanPipeline, NO_REGION_ERROR,
};
use fetal_scan::config::PipelineConfig;
use fetal_scan::ScanError;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tokio::sync::mpsc;

fn pipeline(stubs: &Stubs) -> ScanPipeline {
    ScanPipeline::new(stubs.context(), PipelineConfig::default())
}

fn analyze(stubs: &Stubs, name: &str) -> ProcessedImageRecord {
    pipeline(stubs).process(&png_bytes(&scan_image()), name).unwrap()
}

#[test]
fn single_axial_region_uses_axial_models() {
    let stubs = Stubs::new(vec![detection(0.9, AXIAL, BoundingBox::new(8.0, 4.0, 40.0, 36.0))]);
    let record = analyze(&stubs, "scan.png");

    let analyzed = record.analyzed().expect("region should be analyzed");
    assert_eq!(analyzed.img_name, "scan.png");
    assert_eq!(analyzed.plane.plane_type, PlaneLabel::Axial);
    assert_eq!(analyzed.plane.prediction_prob, 0.9);

    // one forward and one capture per axial model, none on the sagittal pair
    assert_eq!(stubs.axial_quality.calls(), 2);
    assert_eq!(stubs.axial_pathology.calls(), 2);
    assert_eq!(stubs.sagittal_calls(), 0);

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["plane"]["type"], "Axial");
}

#[test]
fn sagittal_region_uses_sagittal_models() {
    let stubs = Stubs::new(vec![detection(0.6, SAGITTAL, BoundingBox::new(0.0, 0.0, 32.0, 32.0))]);
    let record = analyze(&stubs, "sag.png");

    assert_eq!(record.analyzed().unwrap().plane.plane_type, PlaneLabel::Sagittal);
    assert_eq!(stubs.axial_calls(), 0);
    assert_eq!(stubs.sagittal_quality.calls(), 2);
    assert_eq!(stubs.sagittal_pathology.calls(), 2);
}

#[test]
fn no_region_returns_error_record() {
    let stubs = Stubs::new(Vec::new());
    let record = analyze(&stubs, "x.png");

    let json = serde_json::to_value(&record).unwrap();
    let obj = json.as_object().unwrap();
    assert_eq!(obj.len(), 2);
    assert_eq!(obj["img_name"], "x.png");
    assert_eq!(obj["error"], NO_REGION_ERROR);
    assert_eq!(stubs.classifier_calls(), 0);
}

#[test]
fn threshold_is_exclusive() {
    let stubs = Stubs::new(vec![detection(0.05, AXIAL, BoundingBox::new(0.0, 0.0, 20.0, 20.0))]);
    let record = analyze(&stubs, "edge.png");
    assert_eq!(record.error(), Some(NO_REGION_ERROR));
}

#[test]
fn highest_confidence_region_wins() {
    let low = BoundingBox::new(0.0, 0.0, 20.0, 20.0);
    let high = BoundingBox::new(30.0, 10.0, 62.0, 46.0);
    let stubs = Stubs::new(vec![detection(0.3, SAGITTAL, low), detection(0.7, AXIAL, high)]);

    let record = analyze(&stubs, "two.png");
    let analyzed = record.analyzed().unwrap();
    assert_eq!(analyzed.plane.prediction_prob, 0.7);
    assert_eq!(analyzed.plane.bbox, high);
    assert_eq!(analyzed.plane.plane_type, PlaneLabel::Axial);
    assert_eq!(analyzed.cropped_img.dimensions(), (32, 36));
}

#[test]
fn probabilities_are_rounded_to_two_decimals() {
    let stubs = Stubs::new(vec![detection(0.9, AXIAL, BoundingBox::new(8.0, 4.0, 40.0, 36.0))]);
    let record = analyze(&stubs, "scan.png");
    let analyzed = record.analyzed().unwrap();

    // sigmoid(0.0) = 0.5, sigmoid(2.0) = 0.8808
    assert_eq!(analyzed.quality.prediction_prob, 0.5);
    assert_eq!(analyzed.pathology.prediction_prob, 0.88);
    for p in [analyzed.quality.prediction_prob, analyzed.pathology.prediction_prob] {
        assert!((0.0..=1.0).contains(&p));
        assert_eq!((p * 100.0).round() / 100.0, p);
    }
}

#[test]
fn heatmaps_match_crop_and_follow_their_own_model() {
    let stubs = Stubs::new(vec![detection(0.9, AXIAL, BoundingBox::new(8.0, 4.0, 40.0, 36.0))]);
    let record = analyze(&stubs, "scan.png");
    let analyzed = record.analyzed().unwrap();

    let crop_size = analyzed.cropped_img.dimensions();
    assert_eq!(crop_size, (32, 32));
    assert_eq!(analyzed.quality.heatmap.dimensions(), crop_size);
    assert_eq!(analyzed.pathology.heatmap.dimensions(), crop_size);

    // quality activates top-left, pathology bottom-right
    let q_corner = analyzed.quality.heatmap.get_pixel(0, 0);
    let p_corner = analyzed.pathology.heatmap.get_pixel(0, 0);
    assert!(q_corner[0] > q_corner[2], "quality corner {:?}", q_corner);
    assert!(p_corner[2] > p_corner[0], "pathology corner {:?}", p_corner);

    let p_far = analyzed.pathology.heatmap.get_pixel(31, 31);
    assert!(p_far[0] > p_far[2], "pathology far corner {:?}", p_far);
}

#[test]
fn unknown_plane_class_is_an_error() {
    let stubs = Stubs::new(vec![detection(0.9, 5, BoundingBox::new(0.0, 0.0, 20.0, 20.0))]);
    let err = pipeline(&stubs)
        .process(&png_bytes(&scan_image()), "odd.png")
        .unwrap_err();

    assert!(matches!(err, ScanError::UnknownPlane(5)), "{err:?}");
    assert_eq!(stubs.classifier_calls(), 0);
}

#[test]
fn model_failures_carry_stage_and_image() {
    let mut stubs = Stubs::new(vec![detection(0.9, AXIAL, BoundingBox::new(8.0, 4.0, 40.0, 36.0))]);
    stubs.axial_pathology = std::sync::Arc::new(common::StubClassifier::new("axial-pathology", 1.0).failing());

    let err = pipeline(&stubs)
        .process(&png_bytes(&scan_image()), "bad.png")
        .unwrap_err();

    match err {
        ScanError::ModelInference { stage, image, message } => {
            assert_eq!(stage, PipelineStage::Classified);
            assert_eq!(image, "bad.png");
            assert!(message.contains("backend failure"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn undecodable_bytes_are_rejected() {
    let stubs = Stubs::new(Vec::new());
    let err = pipeline(&stubs).process(b"plain text", "junk.png").unwrap_err();

    match &err {
        ScanError::InvalidInput(message) => assert!(message.contains("junk.png"), "{message}"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.error_code(), "INVALID_INPUT");
    assert_eq!(stubs.detector.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn small_frames_are_analyzed() {
    let stubs = Stubs::new(vec![detection(0.9, AXIAL, BoundingBox::new(0.0, 0.0, 12.0, 12.0))]);
    let tiny = DynamicImage::ImageRgb8(RgbImage::from_fn(12, 12, |x, y| {
        let v = (x * 20 + y) as u8;
        Rgb([v, v, v])
    }));

    let record = pipeline(&stubs).process(&png_bytes(&tiny), "tiny.png").unwrap();
    let analyzed = record.analyzed().expect("small frame should be analyzed");
    assert_eq!(analyzed.cropped_img.dimensions(), (12, 12));
    assert_eq!(analyzed.quality.heatmap.dimensions(), (12, 12));
}

#[test]
fn empty_crop_names_the_image() {
    let stubs = Stubs::new(vec![detection(0.9, AXIAL, BoundingBox::new(10.0, 10.0, 10.0, 20.0))]);
    let err = pipeline(&stubs)
        .process_batch([(png_bytes(&scan_image()).as_slice(), "flat.png")])
        .unwrap_err();

    match err {
        ScanError::InvalidInput(message) => assert!(message.starts_with("flat.png: "), "{message}"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(stubs.classifier_calls(), 0);
}

#[test]
fn status_reports_every_stage() {
    let stubs = Stubs::new(vec![detection(0.9, AXIAL, BoundingBox::new(8.0, 4.0, 40.0, 36.0))]);
    let (tx, mut rx) = mpsc::unbounded_channel();

    pipeline(&stubs)
        .with_status(tx)
        .process(&png_bytes(&scan_image()), "scan.png")
        .unwrap();

    let mut stages = Vec::new();
    while let Ok(status) = rx.try_recv() {
        assert!((0.0..=1.0).contains(&status.progress));
        stages.push(status.stage);
    }
    assert_eq!(
        stages,
        vec![
            PipelineStage::Received,
            PipelineStage::Detected,
            PipelineStage::Routed,
            PipelineStage::Classified,
            PipelineStage::Explained,
            PipelineStage::Completed,
        ]
    );
}

#[test]
fn batch_keeps_input_order() {
    let stubs = Stubs::new(vec![detection(0.9, AXIAL, BoundingBox::new(8.0, 4.0, 40.0, 36.0))]);
    let bytes = png_bytes(&scan_image());

    let records = pipeline(&stubs)
        .process_batch([(bytes.as_slice(), "axial.png"), (bytes.as_slice(), "again.png")])
        .unwrap();

    let names: Vec<_> = records.iter().map(|r| r.img_name()).collect();
    assert_eq!(names, ["axial.png", "again.png"]);
    assert_eq!(stubs.axial_quality.calls(), 4);
}
