use crate::error::{Error, Result};
use crate::leakage::LeakageModel;
use log::{debug, warn};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Logarithm applied to every probability before it is accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogBase {
    #[default]
    Natural,
    Base2,
}

impl LogBase {
    pub fn log(self, p: f64) -> f64 {
        match self {
            LogBase::Natural => p.ln(),
            LogBase::Base2 => p.log2(),
        }
    }
}

/// Rank of the correct key after every accumulation step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankTrajectory {
    /// Cumulative number of traces folded in at each step
    pub traces: Vec<usize>,
    /// Rank of the correct key at each step, 0 is the best
    pub ranks: Vec<usize>,
}

impl RankTrajectory {
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    pub fn push(&mut self, traces: usize, rank: usize) {
        self.traces.push(traces);
        self.ranks.push(rank);
    }

    pub fn final_rank(&self) -> Option<usize> {
        self.ranks.last().copied()
    }

    /// Smallest number of traces from which the rank stays at 0.
    pub fn traces_to_rank_zero(&self) -> Option<usize> {
        let stable_from = self.ranks.iter().rposition(|&r| r != 0).map_or(0, |i| i + 1);
        self.traces.get(stable_from).copied()
    }

    pub fn rank_array(&self) -> Array1<u64> {
        self.ranks.iter().map(|&r| r as u64).collect()
    }

    /// Two rows: cumulative traces, then ranks.
    pub fn to_array(&self) -> Array2<u64> {
        let mut out = Array2::zeros((2, self.len()));
        for (i, (&t, &r)) in self.traces.iter().zip(&self.ranks).enumerate() {
            out[[0, i]] = t as u64;
            out[[1, i]] = r as u64;
        }
        out
    }
}

/// Position of `scores[correct_key]` in `scores` sorted in decreasing
/// order. Equal scores are not told apart: the first position holding
/// the same value is returned.
pub fn rank_of(scores: ArrayView1<f64>, correct_key: usize) -> usize {
    let target = scores[correct_key];
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    sorted
        .iter()
        .position(|&v| v == target)
        .unwrap_or(sorted.len() - 1)
}

/// Accumulates per-hypothesis log-likelihoods over a stream of
/// prediction rows and ranks the correct key.
pub struct RankProcessor {
    /// Guess range upper excluded bound
    guess_range: usize,
    correct_key: usize,
    log_base: LogBase,
    /// Cumulative log score of every hypothesis
    scores: Array1<f64>,
    /// Number of rows processed
    len_rows: usize,
    trajectory: RankTrajectory,
}

impl RankProcessor {
    pub fn new(guess_range: usize, correct_key: usize, log_base: LogBase) -> Result<Self> {
        if guess_range == 0 {
            return Err(Error::InvalidGuessRange);
        }
        if correct_key >= guess_range {
            return Err(Error::CorrectKeyOutOfRange {
                correct_key,
                guess_range,
            });
        }
        Ok(Self {
            guess_range,
            correct_key,
            log_base,
            scores: Array1::zeros(guess_range),
            len_rows: 0,
            trajectory: RankTrajectory::default(),
        })
    }

    /// Folds one prediction row into the scores.
    ///
    /// A zero probability leaves the hypothesis untouched instead of
    /// sending it to minus infinity. Hypotheses that only ever hit zero
    /// stay at 0 and may outrank hypotheses with real evidence.
    pub fn update<T, M, L>(&mut self, row: ArrayView1<T>, metadata: &M, leakage_model: &L) -> Result<()>
    where
        T: Float,
        L: LeakageModel<M> + ?Sized,
    {
        let num_classes = row.len();
        for guess in 0..self.guess_range {
            let index = leakage_model.class_index(metadata, guess)?;
            if index >= num_classes {
                return Err(Error::ClassIndexOutOfRange {
                    row: self.len_rows,
                    guess,
                    index,
                    num_classes,
                });
            }
            let p = row[index].to_f64().unwrap_or(f64::NAN);
            if !p.is_finite() || p < 0.0 {
                return Err(Error::InvalidProbability {
                    row: self.len_rows,
                    column: index,
                    value: p,
                });
            }
            if p != 0.0 {
                self.scores[guess] += self.log_base.log(p);
            }
        }
        self.len_rows += 1;
        Ok(())
    }

    /// Ranks the correct key on the current scores and records the step.
    pub fn finalize_step(&mut self) -> usize {
        let rank = rank_of(self.scores.view(), self.correct_key);
        debug!("{} traces: correct key rank {}", self.len_rows, rank);
        self.trajectory.push(self.len_rows, rank);
        rank
    }

    pub fn rank(&self) -> usize {
        rank_of(self.scores.view(), self.correct_key)
    }

    pub fn scores(&self) -> ArrayView1<'_, f64> {
        self.scores.view()
    }

    /// Hypothesis with the highest score, lowest index on ties.
    pub fn best_guess(&self) -> usize {
        let mut guess = 0;
        for i in 1..self.guess_range {
            if self.scores[i] > self.scores[guess] {
                guess = i;
            }
        }
        guess
    }

    pub fn len_rows(&self) -> usize {
        self.len_rows
    }

    pub fn trajectory(&self) -> &RankTrajectory {
        &self.trajectory
    }

    pub fn into_trajectory(self) -> RankTrajectory {
        self.trajectory
    }
}

/// Key rank curve of a single-label classifier.
///
/// Rows of `predictions` are consumed in chunks of `step`; the rank of
/// `correct_key` is taken after each chunk, so the result has
/// `ceil(n / step)` entries.
pub fn key_rank<T, M, L>(
    predictions: ArrayView2<T>,
    metadata: &[M],
    leakage_model: &L,
    guess_range: usize,
    correct_key: usize,
    step: usize,
    log_base: LogBase,
) -> Result<RankTrajectory>
where
    T: Float,
    L: LeakageModel<M> + ?Sized,
{
    let mut processor = RankProcessor::new(guess_range, correct_key, log_base)?;
    if step == 0 {
        return Err(Error::InvalidStep);
    }
    if predictions.nrows() != metadata.len() {
        return Err(Error::ShapeMismatch {
            what: "metadata",
            expected: predictions.nrows(),
            actual: metadata.len(),
        });
    }

    for (chunk, chunk_metadata) in predictions
        .axis_chunks_iter(Axis(0), step)
        .zip(metadata.chunks(step))
    {
        for (row, m) in chunk.rows().into_iter().zip(chunk_metadata) {
            processor.update(row, m, leakage_model)?;
        }
        processor.finalize_step();
    }

    if processor.trajectory().final_rank().unwrap_or(0) != 0 {
        warn!(
            "correct key not recovered after {} traces (rank {})",
            processor.len_rows(),
            processor.rank()
        );
    }
    Ok(processor.into_trajectory())
}

/// Key rank curve for one label of a multi-label classifier.
///
/// The output layer packs several labels side by side; only columns
/// `prob_range` are scored (`0..256` for byte 0, `256..512` for byte 1...).
#[allow(clippy::too_many_arguments)]
pub fn key_rank_multi_label<T, M, L>(
    predictions: ArrayView2<T>,
    prob_range: Range<usize>,
    metadata: &[M],
    leakage_model: &L,
    guess_range: usize,
    correct_key: usize,
    step: usize,
    log_base: LogBase,
) -> Result<RankTrajectory>
where
    T: Float,
    L: LeakageModel<M> + ?Sized,
{
    let columns = predictions.ncols();
    if prob_range.start >= prob_range.end || prob_range.end > columns {
        return Err(Error::InvalidProbRange {
            lo: prob_range.start,
            hi: prob_range.end,
            columns,
        });
    }
    let sliced = predictions.slice(s![.., prob_range]);
    key_rank(
        sliced,
        metadata,
        leakage_model,
        guess_range,
        correct_key,
        step,
        log_base,
    )
}
