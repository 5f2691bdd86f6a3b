use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("guess range must be at least 1")]
    InvalidGuessRange,

    #[error("correct key {correct_key} is outside the guess range 0..{guess_range}")]
    CorrectKeyOutOfRange { correct_key: usize, guess_range: usize },

    #[error("step must be at least 1")]
    InvalidStep,

    #[error("shape mismatch: {what} has {actual} rows, expected {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid probability range {lo}..{hi} for {columns} columns")]
    InvalidProbRange { lo: usize, hi: usize, columns: usize },

    #[error("validation split must lie in [0, 1), got {0}")]
    InvalidValidationSplit(f32),

    #[error("empty dataset")]
    EmptyDataset,

    #[error("class index {index} out of range for {num_classes} classes (row {row}, guess {guess})")]
    ClassIndexOutOfRange {
        row: usize,
        guess: usize,
        index: usize,
        num_classes: usize,
    },

    #[error("label {label} out of range for {num_classes} classes")]
    LabelOutOfRange { label: usize, num_classes: usize },

    #[error("metadata has no {field} byte at index {index}")]
    MetadataIndex { field: &'static str, index: usize },

    #[error("leakage model: {0}")]
    LeakageModel(String),

    #[error("invalid probability {value} at row {row}, column {column}")]
    InvalidProbability { row: usize, column: usize, value: f64 },

    #[error("predictor: {0}")]
    Predictor(String),

    #[error("training history has no metric `{0}`")]
    MissingMetric(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),

    #[error(transparent)]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
