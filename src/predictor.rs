use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Options forwarded to [`Predictor::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f32,
    pub verbose: bool,
    /// Seed for the train/validation shuffle, random when unset
    pub seed: Option<u64>,
    /// Framework specific knobs, passed through untouched
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 300,
            batch_size: 100,
            validation_split: 0.1,
            verbose: true,
            seed: None,
            extra: BTreeMap::new(),
        }
    }
}

impl TrainingConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(Error::InvalidValidationSplit(self.validation_split));
        }
        Ok(())
    }
}

/// Held-out data handed to [`Predictor::fit`].
#[derive(Debug, Clone, Copy)]
pub enum Validation<'a> {
    None,
    /// Fraction of the training rows the framework keeps aside itself
    Split(f32),
    Data(ArrayView2<'a, f32>, ArrayView2<'a, f32>),
}

/// Per-epoch metrics reported by a training run, keyed by metric name
/// (`"accuracy"`, `"val_accuracy"`, `"loss"`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub metrics: BTreeMap<String, Vec<f32>>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metric: &str, value: f32) {
        self.metrics.entry(metric.to_string()).or_default().push(value);
    }

    pub fn metric(&self, name: &str) -> Result<&[f32]> {
        self.metrics
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::MissingMetric(name.to_string()))
    }

    pub fn epochs(&self) -> usize {
        self.metrics.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

/// A classifier trained and run by an external framework.
pub trait Predictor {
    fn fit(
        &mut self,
        x: ArrayView2<f32>,
        y: ArrayView2<f32>,
        validation: Validation<'_>,
        config: &TrainingConfig,
    ) -> Result<TrainingHistory>;

    /// Returns one row of class scores per input row.
    fn predict(&self, x: ArrayView2<f32>) -> Result<Array2<f32>>;

    fn save(&self, path: &Path) -> Result<()>;
}

/// What a training call hands back: the selected metric curve and the
/// full history it was taken from.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingResult {
    pub accuracy: Vec<f32>,
    pub history: TrainingHistory,
}

impl TrainingResult {
    pub fn from_history(history: TrainingHistory, metric: &str) -> Result<Self> {
        let accuracy = history.metric(metric)?.to_vec();
        Ok(Self { accuracy, history })
    }

    pub fn best_accuracy(&self) -> f32 {
        self.accuracy
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_json() {
        let config: TrainingConfig =
            serde_json::from_str(r#"{"epochs": 50, "extra": {"learning_rate": 0.01}}"#).unwrap();
        assert_eq!(config.epochs, 50);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.validation_split, 0.1);
        assert!(config.verbose);
        assert_eq!(config.extra["learning_rate"], serde_json::json!(0.01));
        assert!(config.validate().is_ok());

        let bad = TrainingConfig {
            validation_split: 1.0,
            ..TrainingConfig::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidValidationSplit(_))));
    }

    #[test]
    fn test_history() {
        let mut history = TrainingHistory::new();
        history.push("accuracy", 0.2);
        history.push("accuracy", 0.7);
        history.push("loss", 1.0);
        assert_eq!(history.metric("accuracy").unwrap(), &[0.2, 0.7]);
        assert_eq!(history.epochs(), 2);
        assert!(matches!(
            history.metric("val_accuracy"),
            Err(Error::MissingMetric(_))
        ));

        let result = TrainingResult::from_history(history, "accuracy").unwrap();
        assert_eq!(result.best_accuracy(), 0.7);
    }

    #[test]
    fn test_json_files() {
        let dir = std::env::temp_dir();
        let history_path = dir.join(format!("scadl-history-{}.json", std::process::id()));
        let mut history = TrainingHistory::new();
        history.push("val_accuracy", 0.5);
        history.save_json(&history_path).unwrap();
        let back: TrainingHistory =
            serde_json::from_reader(File::open(&history_path).unwrap()).unwrap();
        assert_eq!(back, history);
        std::fs::remove_file(&history_path).unwrap();

        let config_path = dir.join(format!("scadl-config-{}.json", std::process::id()));
        std::fs::write(&config_path, r#"{"batch_size": 128, "seed": 4}"#).unwrap();
        let config = TrainingConfig::from_json_file(&config_path).unwrap();
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.seed, Some(4));
        assert_eq!(config.epochs, 300);
        std::fs::remove_file(&config_path).unwrap();
    }
}
