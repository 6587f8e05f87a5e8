use rustseg::{
    create_segmenter, evaluate, infer, infer_all, save_model, train_pairwise, train_unary, Config,
    ImageData, LabeledImage, Labeling, Model, VOID_LABEL,
};

/// A bright disc on a dark background, the disc labelled 1.
fn disc_image(name: &str, width: u32, height: u32, cx: i32, cy: i32, radius: i32) -> LabeledImage {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    let mut labels = Vec::with_capacity((width * height) as usize);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let noise = ((x * 7 + y * 3) % 9) as u8;
            let d2 = (x - cx).pow(2) + (y - cy).pow(2);
            if d2 < radius * radius {
                data.extend_from_slice(&[220 - noise, 180 + noise, 60]);
                labels.push(1);
            } else {
                data.extend_from_slice(&[30 + noise, 40, 90 - noise]);
                labels.push(0);
            }
        }
    }
    // an unlabelled corner
    labels[0] = VOID_LABEL;
    labels[1] = VOID_LABEL;

    LabeledImage {
        name: name.to_string(),
        image: ImageData::new(data, width, height).unwrap(),
        truth: Labeling::new(labels, width, height).unwrap(),
    }
}

fn small_config() -> Config {
    Config::from_json(
        r#"{
            "num_classes": 2,
            "subsample": 2,
            "features": { "bandwidths": [1.0, 2.0], "texture_radii": [2] },
            "boosting": { "num_rounds": 15, "max_thresholds": 16 },
            "pairwise": { "candidates": [0.0, 0.5, 2.0] },
            "solver": { "max_sweeps": 5, "time_budget_ms": null }
        }"#,
    )
    .unwrap()
}

#[test]
fn test_train_infer_evaluate() {
    let config = small_config();
    let training = vec![
        disc_image("a", 32, 24, 12, 12, 7),
        disc_image("b", 32, 24, 20, 10, 6),
        disc_image("c", 32, 24, 16, 14, 9),
    ];
    let validation = vec![disc_image("v", 32, 24, 15, 11, 8)];
    let test = disc_image("t", 32, 24, 18, 13, 7);

    let unary = train_unary(&training, 2, &config).unwrap();
    assert_eq!(2, unary.num_labels());

    let outcome = train_pairwise(&validation, &unary, &config).unwrap();
    assert!(outcome.warning.is_none());
    assert_eq!(3, outcome.errors.len());
    assert!(config.pairwise.candidates.contains(&outcome.weight));

    let result = infer(&test.image, &unary, outcome.weight, &config).unwrap();
    assert_eq!(test.image.dimensions(), result.labeling.dimensions());
    assert!(result.labeling.labels().iter().all(|&l| l == 0 || l == 1));

    let (accuracy, confusion) = evaluate(&result.labeling, &test.truth, 2).unwrap();
    assert!(accuracy > 0.9, "accuracy {}", accuracy);
    assert_eq!(test.truth.len() as u64 - 2, confusion.total());
}

#[test]
fn test_zero_weight_is_per_pixel_argmax() {
    let config = small_config();
    let training = vec![disc_image("a", 24, 18, 10, 9, 6)];
    let unary = train_unary(&training, 2, &config).unwrap();

    let image = &training[0].image;
    let result = infer(image, &unary, 0.0, &config).unwrap();

    let extractor = rustseg::feat::FeatureExtractor::new(&config.features).unwrap();
    let field = unary.predict_field(&extractor.compute(image)).unwrap();
    assert_eq!(field.argmax_labeling(), result.labeling);
}

#[test]
fn test_saved_model_segments_like_library_inference() {
    let config = small_config();
    let training = vec![disc_image("a", 24, 18, 10, 9, 6), disc_image("b", 24, 18, 14, 8, 5)];
    let unary = train_unary(&training, 2, &config).unwrap();
    let weight = 0.5;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    let features = config.features.clone();
    let model = Model::new(unary.clone(), features, config.pairwise.connectivity, weight).unwrap();
    save_model(&model, &path).unwrap();

    let segmenter = create_segmenter(&path).unwrap();
    let test = disc_image("t", 24, 18, 12, 10, 6);
    let from_file = segmenter.segment(&test.image).unwrap();
    let direct = infer(&test.image, &unary, weight, &config).unwrap();
    assert_eq!(direct.labeling, from_file.labeling);

    let images = [test.image.clone(), training[0].image.clone()];
    let batch = infer_all(&images, &unary, weight, &config);
    assert_eq!(2, batch.len());
    assert_eq!(direct.labeling, batch[0].as_ref().unwrap().labeling);
}

#[test]
fn test_images_with_out_of_range_labels_are_skipped() {
    let config = small_config();
    let mut bad = disc_image("bad", 16, 12, 8, 6, 4);
    let (width, height) = bad.truth.dimensions();
    let mut labels = bad.truth.labels().to_vec();
    labels[5] = 7;
    bad.truth = Labeling::new(labels, width, height).unwrap();

    assert!(matches!(
        train_unary(&[bad.clone()], 2, &config),
        Err(rustseg::Error::Config(_))
    ));

    let good = disc_image("good", 16, 12, 7, 5, 4);
    let with_bad = train_unary(&[bad, good.clone()], 2, &config).unwrap();
    let without_bad = train_unary(&[good], 2, &config).unwrap();
    assert_eq!(without_bad, with_bad);
}

#[test]
fn test_pairwise_search_ignores_images_beyond_the_cap() {
    let mut config = small_config();
    let training = vec![disc_image("a", 24, 18, 10, 9, 6), disc_image("b", 24, 18, 14, 8, 5)];
    let unary = train_unary(&training, 2, &config).unwrap();

    let first = disc_image("v1", 24, 18, 12, 9, 6);
    // inverted ground truth: almost every pixel would count as an error
    let mut second = disc_image("v2", 24, 18, 12, 9, 6);
    let (width, height) = second.truth.dimensions();
    let inverted = second.truth.labels().iter().map(|&l| if l < 0 { l } else { 1 - l }).collect();
    second.truth = Labeling::new(inverted, width, height).unwrap();

    let alone = train_pairwise(&[first.clone()], &unary, &config).unwrap();

    config.pairwise.max_validation_images = 1;
    let capped = train_pairwise(&[first.clone(), second.clone()], &unary, &config).unwrap();
    assert_eq!(alone, capped);

    config.pairwise.max_validation_images = 2;
    let uncapped = train_pairwise(&[first, second], &unary, &config).unwrap();
    for (with_extra, without) in uncapped.errors.iter().zip(&alone.errors) {
        assert!(with_extra.1 > without.1);
    }
}
