use crate::error::{Error, Result};
use crate::leakage::LeakageModel;
use crate::metadata::Metadata;
use ndarray::{Array1, Array2, ArrayView1};

/// Applies `leakage_model(row, arg)` to every metadata row.
pub fn gen_labels<M, L>(leakage_model: &L, metadata: &[M], arg: usize) -> Result<Array1<usize>>
where
    L: LeakageModel<M> + ?Sized,
{
    metadata
        .iter()
        .map(|m| leakage_model.class_index(m, arg))
        .collect::<Result<Vec<usize>>>()
        .map(Array1::from)
}

/// Labels under each row's own key byte, as used for profiling.
pub fn true_key_labels<L>(
    leakage_model: &L,
    metadata: &[Metadata],
    target_byte: usize,
) -> Result<Array1<usize>>
where
    L: LeakageModel<Metadata> + ?Sized,
{
    metadata
        .iter()
        .map(|m| leakage_model.class_index(m, m.key_byte(target_byte)? as usize))
        .collect::<Result<Vec<usize>>>()
        .map(Array1::from)
}

/// One-hot encoding of `labels` over `num_classes` columns.
pub fn to_categorical(labels: ArrayView1<usize>, num_classes: usize) -> Result<Array2<f32>> {
    let mut y = Array2::zeros((labels.len(), num_classes));
    for (row, &label) in labels.iter().enumerate() {
        if label >= num_classes {
            return Err(Error::LabelOutOfRange { label, num_classes });
        }
        y[[row, label]] = 1.0;
    }
    Ok(y)
}

/// Packs several label columns into one indicator matrix.
///
/// Label set `b` occupies columns `b * classes_per_label..(b + 1) *
/// classes_per_label`, so one sigmoid output layer can be trained on every
/// byte at once.
pub fn multi_label_binarize(
    columns: &[ArrayView1<usize>],
    classes_per_label: usize,
) -> Result<Array2<f32>> {
    let rows = columns.first().map_or(0, |c| c.len());
    let mut y = Array2::zeros((rows, columns.len() * classes_per_label));
    for (b, column) in columns.iter().enumerate() {
        if column.len() != rows {
            return Err(Error::ShapeMismatch {
                what: "label column",
                expected: rows,
                actual: column.len(),
            });
        }
        let offset = b * classes_per_label;
        for (row, &label) in column.iter().enumerate() {
            if label >= classes_per_label {
                return Err(Error::LabelOutOfRange {
                    label,
                    num_classes: classes_per_label,
                });
            }
            y[[row, offset + label]] = 1.0;
        }
    }
    Ok(y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leakage::{sbox, SboxOutput};
    use ndarray::array;

    #[test]
    fn test_gen_labels() {
        let md = vec![vec![1u8], vec![2], vec![3]];
        let model = |m: &Vec<u8>, g: usize| m[0] as usize * g;
        assert_eq!(gen_labels(&model, &md, 2).unwrap(), array![2, 4, 6]);
    }

    #[test]
    fn test_true_key_labels() {
        let md = vec![
            Metadata::new(vec![0x01, 0x02], vec![0x10, 0x20]),
            Metadata::new(vec![0x03, 0x04], vec![0x30, 0x40]),
        ];
        let labels = true_key_labels(&SboxOutput { target_byte: 1 }, &md, 1).unwrap();
        assert_eq!(labels[0], sbox(0x02 ^ 0x20) as usize);
        assert_eq!(labels[1], sbox(0x04 ^ 0x40) as usize);
        assert!(true_key_labels(&SboxOutput { target_byte: 1 }, &md, 2).is_err());
    }

    #[test]
    fn test_to_categorical() {
        let y = to_categorical(array![0, 2, 1].view(), 3).unwrap();
        assert_eq!(y, array![[1., 0., 0.], [0., 0., 1.], [0., 1., 0.]]);
        assert!(matches!(
            to_categorical(array![3].view(), 3),
            Err(Error::LabelOutOfRange { label: 3, num_classes: 3 })
        ));
    }

    #[test]
    fn test_multi_label_binarize() {
        let b0 = array![1usize, 0];
        let b1 = array![3usize, 2];
        let y = multi_label_binarize(&[b0.view(), b1.view()], 4).unwrap();
        assert_eq!(y.shape(), &[2, 8]);
        assert_eq!(y.row(0).to_vec(), vec![0., 1., 0., 0., 0., 0., 0., 1.]);
        assert_eq!(y.row(1).to_vec(), vec![1., 0., 0., 0., 0., 0., 1., 0.]);
        assert_eq!(y.sum(), 4.);
    }
}
