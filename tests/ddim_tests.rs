use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use burn_binarize::diffusion::{CountingDenoiser, DdimSampler, NoiseSchedule, NoiseSource};
use burn_binarize::{BinarizeError, PredictionTarget, Result, ScheduleKind};
use burn_core as burn;
use burn_ndarray::NdArray;

type TB = NdArray<f32>;

fn device() -> <TB as Backend>::Device {
    Default::default()
}

fn values(t: Tensor<TB, 4>) -> Vec<f32> {
    t.into_data().to_vec::<f32>().unwrap()
}

fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}

fn sampler(kind: ScheduleKind, steps: usize, target: PredictionTarget, eta: f64) -> DdimSampler {
    DdimSampler::new(NoiseSchedule::new(kind, steps).unwrap(), target, eta).unwrap()
}

fn shrink(x: Tensor<TB, 4>, _t: f32, c: Tensor<TB, 4>) -> Result<Tensor<TB, 4>> {
    Ok(x.mul_scalar(0.5) + c.mul_scalar(0.25))
}

#[test]
fn same_seed_same_result() {
    let device = device();
    let s = sampler(ScheduleKind::Cosine, 20, PredictionTarget::PredictOriginal, 1.0);
    let cond = Tensor::<TB, 4>::ones([1, 1, 8, 8], &device);

    let run = |seed: u64| {
        let mut noise = NoiseSource::seeded(seed);
        let x_t = noise.like(&cond);
        values(s.sample(&shrink, x_t, cond.clone(), &mut noise).unwrap())
    };
    assert_eq!(run(7), run(7));
    assert_ne!(run(7), run(8));
}

#[test]
fn eta_zero_ignores_the_noise_source() {
    let device = device();
    let s = sampler(ScheduleKind::Linear, 50, PredictionTarget::PredictOriginal, 0.0);
    let cond = Tensor::<TB, 4>::ones([2, 1, 4, 4], &device);
    let x_t = NoiseSource::seeded(1).like(&cond);

    let a = s.sample(&shrink, x_t.clone(), cond.clone(), &mut NoiseSource::seeded(2)).unwrap();
    let b = s.sample(&shrink, x_t, cond, &mut NoiseSource::seeded(3)).unwrap();
    assert_eq!(values(a), values(b));
}

#[test]
fn last_step_returns_x0_without_noise() {
    let device = device();
    let s = sampler(ScheduleKind::Linear, 10, PredictionTarget::PredictOriginal, 1.0);
    assert_eq!(s.posterior_std(0), 0.0);
    assert!(s.posterior_std(5) > 0.0);

    let x_t = Tensor::<TB, 4>::ones([1, 1, 3, 3], &device);
    let x0 = Tensor::<TB, 4>::full([1, 1, 3, 3], 0.25, &device);
    let mut noise = NoiseSource::seeded(11);
    let mut untouched = noise.clone();

    let out = s.step(x_t, x0, 0, &mut noise);
    assert!(values(out).iter().all(|&v| v == 0.25));

    // No draw was consumed.
    let a: Tensor<TB, 4> = noise.standard_normal([1, 1, 2, 2], &device);
    let b: Tensor<TB, 4> = untouched.standard_normal([1, 1, 2, 2], &device);
    assert_eq!(values(a), values(b));
}

#[test]
fn noise_and_original_targets_agree() {
    let device = device();
    let eps_sampler = sampler(ScheduleKind::Quadratic, 25, PredictionTarget::PredictNoise, 1.0);
    let x0_sampler = sampler(ScheduleKind::Quadratic, 25, PredictionTarget::PredictOriginal, 1.0);
    let schedule = eps_sampler.schedule().clone();

    let eps_model = |x: Tensor<TB, 4>, _t: f32, c: Tensor<TB, 4>| -> Result<Tensor<TB, 4>> {
        Ok(x.mul_scalar(0.3) - c.mul_scalar(0.5))
    };
    // Same network expressed as a clean-signal prediction.
    let x0_model = |x: Tensor<TB, 4>, t: f32, c: Tensor<TB, 4>| -> Result<Tensor<TB, 4>> {
        let t = t as usize;
        let eps = x.clone().mul_scalar(0.3) - c.mul_scalar(0.5);
        Ok((x - eps.mul_scalar(schedule.sqrt_one_minus_alphas_cumprod()[t]))
            .div_scalar(schedule.sqrt_alphas_cumprod()[t]))
    };

    let cond = Tensor::<TB, 4>::full([1, 1, 6, 6], 0.8, &device);
    let x_t = NoiseSource::seeded(5).like(&cond);
    let a = eps_sampler
        .sample(&eps_model, x_t.clone(), cond.clone(), &mut NoiseSource::seeded(9))
        .unwrap();
    let b = x0_sampler.sample(&x0_model, x_t, cond, &mut NoiseSource::seeded(9)).unwrap();
    assert!(max_abs_diff(&values(a), &values(b)) < 1e-4);
}

#[test]
fn calls_the_denoiser_once_per_timestep() {
    let device = device();
    let s = sampler(ScheduleKind::Sigmoid, 13, PredictionTarget::PredictOriginal, 1.0);
    let counting = CountingDenoiser::new(&shrink);
    let cond = Tensor::<TB, 4>::zeros([1, 1, 2, 2], &device);
    let mut noise = NoiseSource::seeded(0);
    let x_t = noise.like(&cond);
    s.sample(&counting, x_t, cond, &mut noise).unwrap();
    assert_eq!(counting.calls(), 13);
    assert_eq!(s.num_steps(), 13);
}

#[test]
fn denoiser_errors_abort_sampling() {
    let device = device();
    let s = sampler(ScheduleKind::Linear, 10, PredictionTarget::PredictOriginal, 1.0);
    let failing = |_x: Tensor<TB, 4>, t: f32, _c: Tensor<TB, 4>| -> Result<Tensor<TB, 4>> {
        Err(BinarizeError::model(format!("out of memory at t={t}")))
    };
    let counting = CountingDenoiser::new(&failing);
    let cond = Tensor::<TB, 4>::zeros([1, 1, 2, 2], &device);
    let x_t = NoiseSource::seeded(0).like(&cond);
    let err = s.sample(&counting, x_t, cond, &mut NoiseSource::seeded(0)).unwrap_err();
    assert!(matches!(err, BinarizeError::ModelInvocation(_)));
    assert_eq!(counting.calls(), 1);
}

#[test]
fn wrong_output_shape_is_reported() {
    let device = device();
    let s = sampler(ScheduleKind::Linear, 4, PredictionTarget::PredictOriginal, 0.0);
    let bad = |x: Tensor<TB, 4>, _t: f32, _c: Tensor<TB, 4>| -> Result<Tensor<TB, 4>> {
        Ok(Tensor::zeros([1, 2, 2, 2], &x.device()))
    };
    let cond = Tensor::<TB, 4>::zeros([1, 1, 2, 2], &device);
    let x_t = NoiseSource::seeded(0).like(&cond);
    let err = s.sample(&bad, x_t, cond, &mut NoiseSource::seeded(0)).unwrap_err();
    assert!(matches!(err, BinarizeError::ShapeMismatch(_)));
}

#[test]
fn eta_outside_unit_interval_is_rejected() {
    let schedule = NoiseSchedule::new(ScheduleKind::Linear, 10).unwrap();
    for eta in [-0.1, 1.5, f64::NAN] {
        let err = DdimSampler::new(schedule.clone(), PredictionTarget::PredictNoise, eta).unwrap_err();
        assert!(matches!(err, BinarizeError::Configuration(_)));
    }
}
