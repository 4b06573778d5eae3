use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};
use burn_binarize::data::DocumentDataset;
use burn_binarize::diffusion::{DdimSampler, DiffusionPipeline, NoiseSchedule, NoiseSource, Sampler};
use burn_binarize::image::{output_path, save_binary_mask};
use burn_binarize::telemetry::RunContext;
use burn_binarize::{
    BinarizeConfig, BinarizeError, Binarizer, PredictionTarget, Result, ScheduleKind, SolverKind, TilingOptions,
};
use burn_core as burn;
use burn_ndarray::NdArray;

type TB = NdArray<f32>;

fn device() -> <TB as Backend>::Device {
    Default::default()
}

fn values(t: Tensor<TB, 4>) -> Vec<f32> {
    t.into_data().to_vec::<f32>().unwrap()
}

fn mean_channel(image: Tensor<TB, 4>) -> Result<Tensor<TB, 4>> {
    Ok(image.mean_dim(1))
}

fn zero_residual(x: Tensor<TB, 4>, _t: f32, _c: Tensor<TB, 4>) -> Result<Tensor<TB, 4>> {
    Ok(x.zeros_like())
}

fn iterative(steps: usize) -> DiffusionPipeline {
    let schedule = NoiseSchedule::new(ScheduleKind::Cosine, steps).unwrap();
    DiffusionPipeline::new(Sampler::Iterative(
        DdimSampler::new(schedule, PredictionTarget::PredictOriginal, 0.0).unwrap(),
    ))
}

fn page() -> Tensor<TB, 4> {
    Tensor::<TB, 4>::random([1, 3, 300, 300], Distribution::Default, &device())
}

#[test]
fn native_resolution_page_end_to_end() {
    let binarizer = Binarizer::new(
        mean_channel,
        zero_residual,
        iterative(5),
        Some(TilingOptions { tile_size: 256, fill: 1.0 }),
        0.5,
    );
    let image = page();
    let mut ctx = RunContext::new("e2e");
    let out = binarizer
        .binarize("page.png", image.clone(), &mut NoiseSource::seeded(0), &mut ctx)
        .unwrap();

    assert_eq!(out.mask.dims(), [1, 1, 300, 300]);
    assert!(values(out.residual).iter().all(|&v| v == 0.0));

    let expected: Vec<f32> = values(image.mean_dim(1)).iter().map(|&v| if v > 0.5 { 1.0 } else { 0.0 }).collect();
    assert_eq!(values(out.mask), expected);

    let records = ctx.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "page.png");
    assert_eq!((records[0].height, records[0].width), (300, 300));
    assert_eq!(records[0].tiles, 4);
    assert_eq!(records[0].model_evaluations, 5);
}

#[test]
fn tiling_does_not_change_pointwise_models() {
    let image = page();
    let tiled = Binarizer::new(
        mean_channel,
        zero_residual,
        iterative(3),
        Some(TilingOptions { tile_size: 128, fill: 1.0 }),
        0.5,
    );
    let whole = Binarizer::new(mean_channel, zero_residual, iterative(3), None, 0.5);

    let mut ctx = RunContext::new("compare");
    let a = tiled.binarize("a", image.clone(), &mut NoiseSource::seeded(1), &mut ctx).unwrap();
    let b = whole.binarize("b", image, &mut NoiseSource::seeded(1), &mut ctx).unwrap();
    assert_eq!(values(a.refined), values(b.refined));
    assert_eq!(values(a.mask), values(b.mask));
    assert_eq!(ctx.records()[0].tiles, 9);
    assert_eq!(ctx.records()[1].tiles, 1);
}

#[test]
fn refined_output_is_clamped() {
    let bright = |x: Tensor<TB, 4>, _t: f32, _c: Tensor<TB, 4>| -> Result<Tensor<TB, 4>> {
        Ok(x.ones_like().mul_scalar(3.0))
    };
    let binarizer = Binarizer::new(mean_channel, bright, iterative(4), None, 0.5);
    let image = Tensor::<TB, 4>::full([1, 3, 16, 16], 0.5, &device());
    let out = binarizer
        .binarize("bright", image, &mut NoiseSource::seeded(2), &mut RunContext::new("clamp"))
        .unwrap();
    assert!(values(out.refined).iter().all(|&v| v == 1.0));
    assert!(values(out.mask).iter().all(|&v| v == 1.0));
}

#[test]
fn fast_solver_from_config() {
    let cfg = BinarizeConfig::new()
        .with_solver(SolverKind::FastOde)
        .with_solver_steps(6)
        .with_solver_order(2)
        .with_timesteps(50);
    let binarizer = Binarizer::from_config(mean_channel, zero_residual, &cfg).unwrap();
    assert_eq!(binarizer.diffusion().sampler.kind(), SolverKind::FastOde);
    assert_eq!(binarizer.tiling(), Some(TilingOptions { tile_size: 256, fill: 1.0 }));

    let mut ctx = RunContext::new("fast").with_solver(SolverKind::FastOde);
    let out = binarizer.binarize("p", page(), &mut NoiseSource::seeded(3), &mut ctx).unwrap();
    assert_eq!(out.mask.dims(), [1, 1, 300, 300]);
    assert_eq!(ctx.summary().model_evaluations, 6);
    assert_eq!(ctx.summary().tiles, 4);
}

#[test]
fn predictor_errors_propagate_and_record_nothing() {
    let failing = |_image: Tensor<TB, 4>| -> Result<Tensor<TB, 4>> { Err(BinarizeError::model("weights missing")) };
    let binarizer = Binarizer::new(failing, zero_residual, iterative(3), None, 0.5);
    let mut ctx = RunContext::new("fail");
    let err = binarizer
        .binarize("x", page(), &mut NoiseSource::seeded(0), &mut ctx)
        .unwrap_err();
    assert!(matches!(err, BinarizeError::ModelInvocation(_)));
    assert!(ctx.records().is_empty());
}

#[test]
fn predictor_with_wrong_spatial_size_is_rejected() {
    let shrinking = |image: Tensor<TB, 4>| -> Result<Tensor<TB, 4>> {
        let [b, _, h, w] = image.dims();
        Ok(Tensor::zeros([b, 1, h / 2, w / 2], &image.device()))
    };
    let binarizer = Binarizer::new(shrinking, zero_residual, iterative(3), None, 0.5);
    let err = binarizer
        .binarize("x", page(), &mut NoiseSource::seeded(0), &mut RunContext::new("shape"))
        .unwrap_err();
    assert!(matches!(err, BinarizeError::ShapeMismatch(_)));
}

#[test]
fn masks_are_written_as_png() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    let mask = Tensor::<TB, 1>::from_floats([0.2, 0.7, 0.5, 0.9], &device()).reshape([1, 1, 2, 2]);

    let path = save_binary_mask(mask, 0.5, &out_dir, "scan.v1.jpg").unwrap();
    assert_eq!(path, out_dir.join("scan.v1.png"));
    assert_eq!(output_path(&out_dir, "scan.v1.jpg"), path);

    let written = image::open(&path).unwrap().to_luma8();
    assert_eq!(written.dimensions(), (2, 2));
    assert_eq!(written.into_raw(), vec![0, 255, 0, 255]);
}

#[test]
fn dataset_pairs_images_with_ground_truth() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("images");
    let gt = dir.path().join("gt");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::create_dir_all(&gt).unwrap();

    let gray = image::GrayImage::from_pixel(4, 3, image::Luma([200u8]));
    gray.save(images.join("b.png")).unwrap();
    gray.save(images.join("a.png")).unwrap();
    gray.save(gt.join("a.png")).unwrap();
    std::fs::write(images.join("notes.txt"), "not an image").unwrap();

    let dataset = DocumentDataset::open(&images, Some(&gt)).unwrap();
    let names: Vec<_> = dataset.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["a.png", "b.png"]);

    let samples: Vec<_> = (&dataset).into_iter().collect();
    assert_eq!(samples[0].ground_truth_path.as_deref(), Some(gt.join("a.png").as_path()));
    assert!(samples[1].ground_truth_path.is_none());

    let loaded = samples[0].load::<TB>(None, &device()).unwrap();
    assert_eq!(loaded.image.dims(), [1, 3, 3, 4]);
    let truth = loaded.ground_truth.unwrap();
    assert_eq!(truth.dims(), [1, 1, 3, 4]);
    assert!(values(truth).iter().all(|&v| (v - 200.0 / 255.0).abs() < 1e-6));

    let resized = samples[1].load::<TB>(Some(8), &device()).unwrap();
    assert_eq!(resized.image.dims(), [1, 3, 8, 8]);
}

#[test]
fn missing_image_directory_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = DocumentDataset::open(&dir.path().join("absent"), None).unwrap_err();
    assert!(matches!(err, BinarizeError::Io { .. }));
}
