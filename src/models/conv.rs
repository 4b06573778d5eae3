use burn_core as burn;

use burn::config::Config;
use burn::module::Module;
use burn_nn::conv::{Conv2d, Conv2dConfig};
use burn_nn::{Linear, LinearConfig, PaddingConfig2d};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use burn_tensor::activation::{relu, sigmoid, silu};

use crate::diffusion::{Denoiser, InitialPredictor};
use crate::error::Result;

fn conv3x3<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

/// Plain conv stack mapping a page to a coarse mask in `[0, 1]`.
#[derive(Config, Debug)]
pub struct ConvPredictorConfig {
    #[config(default = 3)]
    pub in_channels: usize,
    #[config(default = 1)]
    pub out_channels: usize,
    #[config(default = 32)]
    pub hidden_channels: usize,
    /// Hidden 3x3 layers between the input and output convolutions.
    #[config(default = 2)]
    pub depth: usize,
}

#[derive(Module, Debug)]
pub struct ConvPredictor<B: Backend> {
    input: Conv2d<B>,
    body: Vec<Conv2d<B>>,
    output: Conv2d<B>,
}

impl ConvPredictorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvPredictor<B> {
        ConvPredictor {
            input: conv3x3(self.in_channels, self.hidden_channels, device),
            body: (0..self.depth)
                .map(|_| conv3x3(self.hidden_channels, self.hidden_channels, device))
                .collect(),
            output: conv3x3(self.hidden_channels, self.out_channels, device),
        }
    }
}

impl<B: Backend> ConvPredictor<B> {
    pub fn forward(&self, image: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut h = relu(self.input.forward(image));
        for conv in &self.body {
            h = relu(conv.forward(h));
        }
        sigmoid(self.output.forward(h))
    }
}

impl<B: Backend> InitialPredictor<B> for ConvPredictor<B> {
    fn predict(&self, image: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        Ok(self.forward(image))
    }
}

/// Conditional conv denoiser: `[x_t, condition]` in, residual (or noise) out,
/// with a sinusoidal timestep embedding added after the first layer.
#[derive(Config, Debug)]
pub struct ConvDenoiserConfig {
    /// Channels of `x_t` and of the output.
    #[config(default = 1)]
    pub channels: usize,
    #[config(default = 1)]
    pub condition_channels: usize,
    #[config(default = 32)]
    pub hidden_channels: usize,
    #[config(default = 2)]
    pub depth: usize,
}

#[derive(Module, Debug)]
pub struct ConvDenoiser<B: Backend> {
    input: Conv2d<B>,
    time: Linear<B>,
    body: Vec<Conv2d<B>>,
    output: Conv2d<B>,
    hidden_channels: usize,
}

impl ConvDenoiserConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvDenoiser<B> {
        ConvDenoiser {
            input: conv3x3(self.channels + self.condition_channels, self.hidden_channels, device),
            time: LinearConfig::new(self.hidden_channels, self.hidden_channels).init(device),
            body: (0..self.depth)
                .map(|_| conv3x3(self.hidden_channels, self.hidden_channels, device))
                .collect(),
            output: conv3x3(self.hidden_channels, self.channels, device),
            hidden_channels: self.hidden_channels,
        }
    }
}

/// `[batch, dim]` sinusoidal embedding of a scalar timestep.
pub fn timestep_embedding<B: Backend>(timestep: f32, batch: usize, dim: usize, device: &B::Device) -> Tensor<B, 2> {
    let half = dim / 2;
    let mut row = Vec::with_capacity(dim);
    let freq = |i: usize| (-(10_000f32.ln()) * i as f32 / half.max(1) as f32).exp();
    row.extend((0..half).map(|i| (timestep * freq(i)).sin()));
    row.extend((0..half).map(|i| (timestep * freq(i)).cos()));
    row.resize(dim, 0.0);
    let values: Vec<f32> = row.iter().copied().cycle().take(batch * dim).collect();
    Tensor::from_data(TensorData::new(values, [batch, dim]), device)
}

impl<B: Backend> ConvDenoiser<B> {
    pub fn forward(&self, x_t: Tensor<B, 4>, timestep: f32, condition: Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, _, _, _] = x_t.dims();
        let device = x_t.device();
        let temb = timestep_embedding::<B>(timestep, b, self.hidden_channels, &device);
        let temb = silu(self.time.forward(temb)).reshape([b, self.hidden_channels, 1, 1]);

        let mut h = relu(self.input.forward(Tensor::cat(vec![x_t, condition], 1)) + temb);
        for conv in &self.body {
            h = relu(conv.forward(h));
        }
        self.output.forward(h)
    }
}

impl<B: Backend> Denoiser<B> for ConvDenoiser<B> {
    fn denoise(&self, x_t: Tensor<B, 4>, timestep: f32, condition: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        Ok(self.forward(x_t, timestep, condition))
    }
}
