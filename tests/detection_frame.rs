use framesight::{
    ClassColorMap, ColorMode, FramePipeline, LabelTable, Layout, Origin, PipelineConfig, Shape,
    TensorBuffer,
};
use image::{Rgba, RgbaImage};

/// Synthetic camera frame: dark background with a bright block where the
/// "object" sits.
fn synthetic_frame(width: u32, height: u32) -> RgbaImage {
    let mut frame = RgbaImage::from_pixel(width, height, Rgba([20, 20, 20, 255]));
    for y in height / 4..height / 2 {
        for x in width / 4..width / 2 {
            frame.put_pixel(x, y, Rgba([230, 180, 40, 255]));
        }
    }
    frame
}

/// Fake engine output: an N=300 block, mostly sub-threshold noise rows,
/// with a cluster of overlapping hits plus one distinct object.
fn synthetic_engine_output() -> TensorBuffer {
    let mut rows = vec![[8.0f32, 8.0, 4.0, 4.0, 0.05, 0.0]; 300];
    rows[10] = [24.0, 24.0, 16.0, 16.0, 0.92, 0.0];
    rows[11] = [25.0, 24.0, 16.0, 16.0, 0.85, 0.0];
    rows[12] = [25.0, 25.0, 15.0, 16.0, 0.80, 0.0];
    rows[20] = [48.0, 48.0, 10.0, 10.0, 0.75, 1.0];
    // A confident row with an unmapped class index; must be skipped, not
    // crash the frame.
    rows[30] = [40.0, 10.0, 6.0, 6.0, 0.9, 99.0];

    let data: Vec<f32> = rows.iter().flatten().copied().collect();
    TensorBuffer::from_vec(&[1, 300, 6], Layout::Hwc, data).unwrap()
}

#[test]
fn test_full_detection_frame() {
    let table = LabelTable::from_json(r#"{"0": "person", "1": "bicycle"}"#).unwrap();
    let colors = ClassColorMap::new(&table, ColorMode::Deterministic);
    let pipeline = FramePipeline::new(PipelineConfig {
        input_width: 64,
        input_height: 64,
        ..PipelineConfig::default()
    })
    .unwrap();

    // 1. Pixels -> engine-ready tensor.
    let frame = synthetic_frame(96, 72);
    let mut engine_input = pipeline.preprocess(&frame).unwrap();
    assert_eq!(engine_input.layout(), Layout::Chw);
    assert_eq!(engine_input.shape(), Shape::new(1, 64, 64, 3));

    // The engine boundary is a plain 4-axis view in storage order.
    let view = engine_input.as_array4().unwrap();
    assert_eq!(view.dim(), (1, 3, 64, 64));
    drop(view);

    // 2. Fake inference, then postprocess.
    let raw_output = synthetic_engine_output();
    let report = pipeline
        .postprocess(&mut engine_input, &raw_output, &table, &colors)
        .unwrap();

    // The overlapping person cluster collapses to one box, the bicycle
    // survives, the unmapped class row is counted, not fatal.
    assert_eq!(report.candidates_before_nms, 4);
    assert_eq!(report.detections.len(), 2);
    assert_eq!(report.detections[0].label, "person");
    assert_eq!(report.detections[0].confidence, 0.92);
    assert_eq!(report.detections[1].label, "bicycle");
    assert_eq!(report.skipped_labels, 1);

    // 3. Boxes were rendered: the person outline's top edge sits at
    // y = 24 - 16/2 = 16, and the color matches the class color.
    let person = colors.get("person").unwrap();
    assert_eq!(engine_input.get(0, 16, 24, 0), person.r);
    assert_eq!(engine_input.get(0, 16, 24, 1), person.g);
    assert_eq!(engine_input.get(0, 16, 24, 2), person.b);

    // 4. Tensor -> pixels for the display collaborator.
    let annotated = pipeline.annotated_pixels(engine_input).unwrap();
    assert_eq!((annotated.width(), annotated.height()), (64, 64));
}

#[test]
fn test_frame_with_no_detections() {
    let table = LabelTable::from_json(r#"{"0": "person"}"#).unwrap();
    let colors = ClassColorMap::new(&table, ColorMode::Deterministic);
    let pipeline = FramePipeline::new(PipelineConfig {
        input_width: 32,
        input_height: 32,
        ..PipelineConfig::default()
    })
    .unwrap();

    let frame = synthetic_frame(32, 32);
    let mut engine_input = pipeline.preprocess(&frame).unwrap();
    let before = engine_input.clone();

    // All rows below threshold.
    let data: Vec<f32> = vec![[4.0f32, 4.0, 2.0, 2.0, 0.1, 0.0]; 300]
        .iter()
        .flatten()
        .copied()
        .collect();
    let raw_output = TensorBuffer::from_vec(&[1, 300, 6], Layout::Hwc, data).unwrap();

    let report = pipeline
        .postprocess(&mut engine_input, &raw_output, &table, &colors)
        .unwrap();
    assert!(report.detections.is_empty());
    assert_eq!(report.candidates_before_nms, 0);
    // Nothing drawn: the tensor is untouched.
    assert_eq!(engine_input, before);
}

#[test]
fn test_bottom_left_origin_source() {
    // A frame with a bright top row. With the bottom-left convention the
    // codec flips rows, so a buffer stored bottom-up still lands with the
    // visual top at tensor row 0.
    let mut stored_bottom_up = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
    for x in 0..8 {
        // Visual top row is the last stored row.
        stored_bottom_up.put_pixel(x, 7, Rgba([255, 255, 255, 255]));
    }

    let pipeline = FramePipeline::new(PipelineConfig {
        input_width: 8,
        input_height: 8,
        origin: Origin::BottomLeft,
        center_crop: false,
        ..PipelineConfig::default()
    })
    .unwrap();

    let tensor = pipeline.preprocess(&stored_bottom_up).unwrap();
    assert!(tensor.get(0, 0, 4, 0) > 0.9, "visual top must be row 0");
    assert_eq!(tensor.get(0, 7, 4, 0), 0.0);
}

#[test]
fn test_classification_path() {
    let table = LabelTable::from_json(r#"{"0": "cat", "1": "dog", "2": "fox"}"#).unwrap();
    let pipeline = FramePipeline::new(PipelineConfig::default()).unwrap();

    let result = pipeline.classify(&[0.2, 0.1, 4.0], &table).unwrap();
    assert_eq!(result.class_index, 2);
    assert_eq!(result.label, "fox");
    assert!(result.confidence > 0.9 && result.confidence <= 1.0);
}
