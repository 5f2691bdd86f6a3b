use crate::error::{Error, Result};
use crate::labels::{gen_labels, to_categorical};
use crate::leakage::LeakageModel;
use crate::predictor::{Predictor, TrainingConfig, TrainingHistory, TrainingResult, Validation};
use crate::tools::progress_bar;
use indicatif::ProgressBar;
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView2};
use rayon::prelude::{IntoParallelIterator, ParallelIterator};

/* Non-profiled deep-learning attack:
https://tches.iacr.org/index.php/TCHES/article/view/7387
A fresh network is trained for every key hypothesis on the labels that
hypothesis predicts. Only the right hypothesis yields labels that follow
the physical leakage, so its network learns best. */

pub struct NonProfile<L> {
    leakage_model: L,
    parallel: bool,
}

/// Accuracy curves of every hypothesis of a non-profiled attack.
#[derive(Debug, Clone)]
pub struct NonProfileResult {
    /// One row per hypothesis, one column per epoch. Curves shorter than
    /// the longest one are padded with NaN.
    pub accuracy: Array2<f32>,
    pub histories: Vec<TrainingHistory>,
}

impl NonProfileResult {
    fn from_results(results: Vec<TrainingResult>) -> Self {
        let epochs = results.iter().map(|r| r.accuracy.len()).max().unwrap_or(0);
        let mut accuracy = Array2::from_elem((results.len(), epochs), f32::NAN);
        for (guess, result) in results.iter().enumerate() {
            for (epoch, &acc) in result.accuracy.iter().enumerate() {
                accuracy[[guess, epoch]] = acc;
            }
        }
        let histories = results.into_iter().map(|r| r.history).collect();
        Self {
            accuracy,
            histories,
        }
    }

    /// Best epoch accuracy of each hypothesis.
    pub fn max_accuracy(&self) -> Array1<f32> {
        self.accuracy
            .rows()
            .into_iter()
            .map(|row| row.iter().copied().fold(f32::NEG_INFINITY, f32::max))
            .collect()
    }

    /// Hypothesis reaching the highest accuracy, lowest index on ties.
    pub fn guessed_key(&self) -> usize {
        let max = self.max_accuracy();
        let mut guess = 0;
        for i in 1..max.len() {
            if max[i] > max[guess] {
                guess = i;
            }
        }
        guess
    }
}

impl<L> NonProfile<L> {
    pub fn new(leakage_model: L) -> Self {
        Self {
            leakage_model,
            parallel: true,
        }
    }

    /// Trains hypotheses one after the other, for frameworks that cannot
    /// run several models at once.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Trains `model` on the labels predicted by `guess` and returns the
    /// `accuracy_field` curve (`"accuracy"` or `"val_accuracy"`).
    #[allow(clippy::too_many_arguments)]
    pub fn train<P, M>(
        &self,
        mut model: P,
        traces: ArrayView2<f32>,
        metadata: &[M],
        guess: usize,
        num_classes: usize,
        accuracy_field: &str,
        config: &TrainingConfig,
    ) -> Result<TrainingResult>
    where
        P: Predictor,
        L: LeakageModel<M>,
    {
        check_dataset(traces, metadata.len())?;
        config.validate()?;
        let labels = gen_labels(&self.leakage_model, metadata, guess)?;
        let y = to_categorical(labels.view(), num_classes)?;
        let history = model.fit(
            traces,
            y.view(),
            Validation::Split(config.validation_split),
            config,
        )?;
        let result = TrainingResult::from_history(history, accuracy_field)?;
        debug!("guess {}: best {} {}", guess, accuracy_field, result.best_accuracy());
        Ok(result)
    }

    /// Runs [`NonProfile::train`] for every hypothesis in
    /// `0..guess_range`, each on a new model from `model_factory`.
    #[allow(clippy::too_many_arguments)]
    pub fn attack<P, F, M>(
        &self,
        model_factory: F,
        traces: ArrayView2<f32>,
        metadata: &[M],
        guess_range: usize,
        num_classes: usize,
        accuracy_field: &str,
        config: &TrainingConfig,
    ) -> Result<NonProfileResult>
    where
        P: Predictor,
        F: Fn() -> P + Sync,
        L: LeakageModel<M> + Sync,
        M: Sync,
    {
        if guess_range == 0 {
            return Err(Error::InvalidGuessRange);
        }
        check_dataset(traces, metadata.len())?;
        config.validate()?;
        info!(
            "non-profiled attack: {} hypotheses, {} traces, {} epochs",
            guess_range,
            traces.nrows(),
            config.epochs
        );

        let bar = if config.verbose {
            progress_bar(guess_range)
        } else {
            ProgressBar::hidden()
        };
        let train_guess = |guess: usize| {
            let result = self.train(
                model_factory(),
                traces,
                metadata,
                guess,
                num_classes,
                accuracy_field,
                config,
            );
            bar.inc(1);
            result
        };
        let results: Vec<TrainingResult> = if self.parallel {
            (0..guess_range)
                .into_par_iter()
                .map(train_guess)
                .collect::<Result<_>>()?
        } else {
            (0..guess_range).map(train_guess).collect::<Result<_>>()?
        };
        bar.finish_and_clear();

        let result = NonProfileResult::from_results(results);
        info!("guessed key = {}", result.guessed_key());
        Ok(result)
    }
}

fn check_dataset(traces: ArrayView2<f32>, metadata_len: usize) -> Result<()> {
    if traces.nrows() == 0 {
        return Err(Error::EmptyDataset);
    }
    if traces.nrows() != metadata_len {
        return Err(Error::ShapeMismatch {
            what: "metadata",
            expected: traces.nrows(),
            actual: metadata_len,
        });
    }
    Ok(())
}
