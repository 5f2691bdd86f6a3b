use crate::error::{Error, Result};
use crate::labels::{to_categorical, true_key_labels};
use crate::leakage::LeakageModel;
use crate::metadata::Metadata;
use crate::predictor::{Predictor, TrainingConfig, TrainingHistory, Validation};
use crate::rank::{key_rank, key_rank_multi_label, LogBase, RankTrajectory};
use log::info;
use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::ops::Range;
use std::path::Path;

/// Augments a training set, e.g. mixup or random crop.
pub type Augmentation =
    Box<dyn Fn(Array2<f32>, Array2<f32>) -> (Array2<f32>, Array2<f32>) + Send + Sync>;

/// Shuffles the rows of `(x, y)` and holds out `ceil(split * n)` of them.
/// Fails with [`Error::EmptyDataset`] when nothing is left to train on.
pub fn train_validation_split(
    x: ArrayView2<f32>,
    y: ArrayView2<f32>,
    split: f32,
    seed: Option<u64>,
) -> Result<(Array2<f32>, Array2<f32>, Array2<f32>, Array2<f32>)> {
    if x.nrows() != y.nrows() {
        return Err(Error::ShapeMismatch {
            what: "labels",
            expected: x.nrows(),
            actual: y.nrows(),
        });
    }
    if !(0.0..1.0).contains(&split) {
        return Err(Error::InvalidValidationSplit(split));
    }
    let n = x.nrows();
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);
    let n_validation = (split * n as f32).ceil() as usize;
    if n_validation >= n {
        return Err(Error::EmptyDataset);
    }
    let (validation, training) = indices.split_at(n_validation);
    Ok((
        x.select(Axis(0), training),
        y.select(Axis(0), training),
        x.select(Axis(0), validation),
        y.select(Axis(0), validation),
    ))
}

/// Profiling phase: trains a classifier on traces with known keys.
pub struct Profile<P, L> {
    model: P,
    leakage_model: L,
    data_aug: Option<Augmentation>,
}

impl<P: Predictor, L: LeakageModel<Metadata>> Profile<P, L> {
    pub fn new(model: P, leakage_model: L) -> Self {
        Self {
            model,
            leakage_model,
            data_aug: None,
        }
    }

    pub fn data_augmentation(&mut self, func_aug: Augmentation) {
        self.data_aug = Some(func_aug);
    }

    /// Labels every trace under its own key byte, one-hot encodes the
    /// labels over `num_classes` and fits the model.
    ///
    /// `config.validation_split` of the (possibly augmented) rows are kept
    /// aside and passed to the model as validation data.
    pub fn train(
        &mut self,
        traces: ArrayView2<f32>,
        metadata: &[Metadata],
        target_byte: usize,
        num_classes: usize,
        config: &TrainingConfig,
        data_augmentation: bool,
    ) -> Result<TrainingHistory> {
        config.validate()?;
        if traces.nrows() == 0 {
            return Err(Error::EmptyDataset);
        }
        if traces.nrows() != metadata.len() {
            return Err(Error::ShapeMismatch {
                what: "metadata",
                expected: traces.nrows(),
                actual: metadata.len(),
            });
        }

        let labels = true_key_labels(&self.leakage_model, metadata, target_byte)?;
        let y = to_categorical(labels.view(), num_classes)?;
        let (x, y) = match (&self.data_aug, data_augmentation) {
            (Some(aug), true) => aug(traces.to_owned(), y),
            _ => (traces.to_owned(), y),
        };

        let (x_training, y_training, x_validation, y_validation) =
            train_validation_split(x.view(), y.view(), config.validation_split, config.seed)?;
        info!(
            "profiling on {} traces, {} held out, {} epochs",
            x_training.nrows(),
            x_validation.nrows(),
            config.epochs
        );
        let validation = if x_validation.nrows() == 0 {
            Validation::None
        } else {
            Validation::Data(x_validation.view(), y_validation.view())
        };
        self.model
            .fit(x_training.view(), y_training.view(), validation, config)
    }

    pub fn save_model(&self, path: &Path) -> Result<()> {
        self.model.save(path)
    }

    pub fn into_model(self) -> P {
        self.model
    }
}

/// Trains one classifier whose output layer carries several labels.
pub struct MultiLabelProfile<P> {
    model: P,
}

impl<P: Predictor> MultiLabelProfile<P> {
    pub fn new(model: P) -> Self {
        Self { model }
    }

    /// `y_train` is usually built with
    /// [`multi_label_binarize`](crate::labels::multi_label_binarize).
    pub fn train(
        &mut self,
        x_train: ArrayView2<f32>,
        y_train: ArrayView2<f32>,
        config: &TrainingConfig,
    ) -> Result<TrainingHistory> {
        config.validate()?;
        if x_train.nrows() != y_train.nrows() {
            return Err(Error::ShapeMismatch {
                what: "labels",
                expected: x_train.nrows(),
                actual: y_train.nrows(),
            });
        }
        info!(
            "multi-label profiling on {} traces, {} outputs",
            x_train.nrows(),
            y_train.ncols()
        );
        self.model.fit(
            x_train,
            y_train,
            Validation::Split(config.validation_split),
            config,
        )
    }

    pub fn save_model(&self, path: &Path) -> Result<()> {
        self.model.save(path)
    }

    pub fn into_model(self) -> P {
        self.model
    }
}

/// Attack phase of a profiled classifier. Scores are summed in base 2.
pub struct Match<P, L> {
    model: P,
    leakage_model: L,
    predictions: Option<Array2<f32>>,
}

impl<P: Predictor, L> Match<P, L> {
    pub fn new(model: P, leakage_model: L) -> Self {
        Self {
            model,
            leakage_model,
            predictions: None,
        }
    }

    pub fn key_rank<M>(
        &mut self,
        x_test: ArrayView2<f32>,
        metadata: &[M],
        guess_range: usize,
        correct_key: usize,
        step: usize,
    ) -> Result<RankTrajectory>
    where
        L: LeakageModel<M>,
    {
        let predictions = self.model.predict(x_test)?;
        let trajectory = key_rank(
            predictions.view(),
            metadata,
            &self.leakage_model,
            guess_range,
            correct_key,
            step,
            LogBase::Base2,
        )?;
        self.predictions = Some(predictions);
        Ok(trajectory)
    }

    /// Predictions of the last [`Match::key_rank`] call.
    pub fn predictions(&self) -> Option<&Array2<f32>> {
        self.predictions.as_ref()
    }
}

/// Attack phase of a multi-label classifier. Scores are summed in
/// natural log.
pub struct MatchMultiLabel<P, L> {
    model: P,
    leakage_model: L,
    predictions: Option<Array2<f32>>,
}

impl<P: Predictor, L> MatchMultiLabel<P, L> {
    pub fn new(model: P, leakage_model: L) -> Self {
        Self {
            model,
            leakage_model,
            predictions: None,
        }
    }

    /// `prob_range` selects the output columns of the targeted byte:
    /// `0..256` for k0, `256..512` for k1 and so on.
    pub fn key_rank<M>(
        &mut self,
        x_test: ArrayView2<f32>,
        metadata: &[M],
        guess_range: usize,
        correct_key: usize,
        step: usize,
        prob_range: Range<usize>,
    ) -> Result<RankTrajectory>
    where
        L: LeakageModel<M>,
    {
        let predictions = self.model.predict(x_test)?;
        let trajectory = key_rank_multi_label(
            predictions.view(),
            prob_range.clone(),
            metadata,
            &self.leakage_model,
            guess_range,
            correct_key,
            step,
            LogBase::Natural,
        )?;
        self.predictions = Some(predictions.slice_move(ndarray::s![.., prob_range]));
        Ok(trajectory)
    }

    /// Predictions of the last call, restricted to its `prob_range`.
    pub fn predictions(&self) -> Option<&Array2<f32>> {
        self.predictions.as_ref()
    }
}
