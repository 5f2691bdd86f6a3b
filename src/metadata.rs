use crate::error::{Error, Result};
use crate::tools::read_array_2_from_npy_file;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Auxiliary data captured alongside one trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub plaintext: Vec<u8>,
    pub key: Vec<u8>,
    #[serde(default)]
    pub ciphertext: Option<Vec<u8>>,
}

impl Metadata {
    pub fn new(plaintext: Vec<u8>, key: Vec<u8>) -> Self {
        Self {
            plaintext,
            key,
            ciphertext: None,
        }
    }

    pub fn with_ciphertext(mut self, ciphertext: Vec<u8>) -> Self {
        self.ciphertext = Some(ciphertext);
        self
    }

    pub fn plaintext_byte(&self, index: usize) -> Result<u8> {
        self.plaintext.get(index).copied().ok_or(Error::MetadataIndex {
            field: "plaintext",
            index,
        })
    }

    pub fn key_byte(&self, index: usize) -> Result<u8> {
        self.key.get(index).copied().ok_or(Error::MetadataIndex {
            field: "key",
            index,
        })
    }

    pub fn ciphertext_byte(&self, index: usize) -> Result<u8> {
        self.ciphertext
            .as_ref()
            .and_then(|c| c.get(index).copied())
            .ok_or(Error::MetadataIndex {
                field: "ciphertext",
                index,
            })
    }
}

fn row_bytes(row: ArrayView1<u8>) -> Vec<u8> {
    row.iter().copied().collect()
}

/// Zips plaintext, key and optional ciphertext matrices row by row.
///
/// An empty key matrix (zero columns) is accepted for attack sets where
/// the key is unknown.
pub fn metadata_from_arrays(
    plaintext: &Array2<u8>,
    key: &Array2<u8>,
    ciphertext: Option<&Array2<u8>>,
) -> Result<Vec<Metadata>> {
    let rows = plaintext.nrows();
    if key.nrows() != rows && key.ncols() != 0 {
        return Err(Error::ShapeMismatch {
            what: "key",
            expected: rows,
            actual: key.nrows(),
        });
    }
    if let Some(c) = ciphertext {
        if c.nrows() != rows {
            return Err(Error::ShapeMismatch {
                what: "ciphertext",
                expected: rows,
                actual: c.nrows(),
            });
        }
    }

    let metadata = (0..rows)
        .map(|i| {
            let key_row = if key.ncols() == 0 {
                Vec::new()
            } else {
                row_bytes(key.row(i))
            };
            let mut m = Metadata::new(row_bytes(plaintext.row(i)), key_row);
            if let Some(c) = ciphertext {
                m = m.with_ciphertext(row_bytes(c.row(i)));
            }
            m
        })
        .collect();
    Ok(metadata)
}

/// Loads metadata from `.npy` matrices of `u8`, one row per trace.
pub fn load_metadata(
    plaintext_path: &str,
    key_path: Option<&str>,
    ciphertext_path: Option<&str>,
) -> Result<Vec<Metadata>> {
    let plaintext: Array2<u8> = read_array_2_from_npy_file(plaintext_path)?;
    let key: Array2<u8> = match key_path {
        Some(path) => read_array_2_from_npy_file(path)?,
        None => Array2::zeros((plaintext.nrows(), 0)),
    };
    let ciphertext: Option<Array2<u8>> = match ciphertext_path {
        Some(path) => Some(read_array_2_from_npy_file(path)?),
        None => None,
    };
    metadata_from_arrays(&plaintext, &key, ciphertext.as_ref())
}
