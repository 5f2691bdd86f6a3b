#![allow(dead_code)]

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use scadl::leakage::sbox;
use scadl::metadata::Metadata;
use scadl::predictor::{Predictor, TrainingConfig, TrainingHistory, Validation};
use scadl::tools::write_array;
use scadl::Result;
use std::path::Path;

/// Multinomial logistic regression trained by full-batch gradient descent.
pub struct SoftmaxRegression {
    weights: Array2<f32>,
    bias: Array1<f32>,
    learning_rate: f32,
}

impl SoftmaxRegression {
    pub fn new(num_features: usize, num_classes: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            weights: Array2::from_shape_fn((num_features, num_classes), |_| {
                rng.gen_range(-0.01..0.01)
            }),
            bias: Array1::zeros(num_classes),
            learning_rate: 1.0,
        }
    }

    fn probabilities(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let mut logits = x.dot(&self.weights) + &self.bias;
        for mut row in logits.rows_mut() {
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
        logits
    }

    fn accuracy(&self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let p = self.probabilities(x);
        let hits = p
            .rows()
            .into_iter()
            .zip(y.rows())
            .filter(|(pr, yr)| yr[argmax(pr.iter().copied())] == 1.0)
            .count();
        hits as f32 / x.nrows() as f32
    }
}

pub fn argmax<I: Iterator<Item = f32>>(values: I) -> usize {
    let mut best = (0, f32::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}

impl Predictor for SoftmaxRegression {
    fn fit(
        &mut self,
        x: ArrayView2<f32>,
        y: ArrayView2<f32>,
        validation: Validation<'_>,
        config: &TrainingConfig,
    ) -> Result<TrainingHistory> {
        let (x, y, held_out) = match validation {
            Validation::None => (x.reborrow(), y.reborrow(), None),
            Validation::Data(xv, yv) => (
                x.reborrow(),
                y.reborrow(),
                Some((xv.reborrow(), yv.reborrow())),
            ),
            Validation::Split(split) => {
                let cut = x.nrows() - (split * x.nrows() as f32).ceil() as usize;
                let (xt, xv) = x.reborrow().split_at(Axis(0), cut);
                let (yt, yv) = y.reborrow().split_at(Axis(0), cut);
                (xt, yt, Some((xv, yv)))
            }
        };
        let n = x.nrows() as f32;
        let mut history = TrainingHistory::new();
        for _ in 0..config.epochs {
            let error = self.probabilities(x) - &y;
            let grad_w = x.t().dot(&error) / n;
            let grad_b = error.sum_axis(Axis(0)) / n;
            self.weights.scaled_add(-self.learning_rate, &grad_w);
            self.bias.scaled_add(-self.learning_rate, &grad_b);
            history.push("accuracy", self.accuracy(x, y));
            if let Some((xv, yv)) = held_out {
                if xv.nrows() > 0 {
                    history.push("val_accuracy", self.accuracy(xv, yv));
                }
            }
        }
        Ok(history)
    }

    fn predict(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        Ok(self.probabilities(x))
    }

    fn save(&self, path: &Path) -> Result<()> {
        write_array(path, &self.weights)
    }
}

/// Traces with one sample leaking `±1` on the LSB of
/// `sbox[plaintext[0] ^ key[0]]` plus gaussian noise.
pub fn lsb_traces(
    n: usize,
    key: Option<u8>,
    sigma: f32,
    rng: &mut StdRng,
) -> (Array2<f32>, Vec<Metadata>) {
    let noise = Normal::new(0.0, sigma).expect("finite sigma");
    let mut traces = Array2::zeros((n, 1));
    let mut metadata = Vec::with_capacity(n);
    for i in 0..n {
        let p: u8 = rng.gen();
        let k: u8 = key.unwrap_or_else(|| rng.gen());
        let lsb = (sbox(p ^ k) & 1) as f32;
        traces[[i, 0]] = 2.0 * lsb - 1.0 + noise.sample(rng);
        metadata.push(Metadata::new(vec![p], vec![k]));
    }
    (traces, metadata)
}
