use crate::error::Result;
use crate::rank::RankTrajectory;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{ArrayBase, Data, Dimension, Array2};
use ndarray_npy::{ReadNpyExt, ReadableElement, WritableElement, WriteNpyExt};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

pub fn read_array_2_from_npy_file<T: ReadableElement, P: AsRef<Path>>(dir: P) -> Result<Array2<T>> {
    let reader = File::open(dir)?;
    let arr: Array2<T> = Array2::<T>::read_npy(reader)?;
    Ok(arr)
}

pub fn write_array<A, S, D, P>(dir: P, ar: &ArrayBase<S, D>) -> Result<()>
where
    A: WritableElement,
    S: Data<Elem = A>,
    D: Dimension,
    P: AsRef<Path>,
{
    let writer = BufWriter::new(File::create(dir)?);
    ar.write_npy(writer)?;
    Ok(())
}

/// Writes a rank trajectory as `traces,rank` CSV rows.
pub fn write_rank_csv<P: AsRef<Path>>(dir: P, trajectory: &RankTrajectory) -> Result<()> {
    let mut writer = csv::Writer::from_path(dir)?;
    writer.write_record(["traces", "rank"])?;
    for (traces, rank) in trajectory.traces.iter().zip(&trajectory.ranks) {
        writer.write_record(&[traces.to_string(), rank.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Creates a [`ProgressBar`] with a predefined default style.
pub fn progress_bar(len: usize) -> ProgressBar {
    let style = ProgressStyle::with_template("{elapsed_precise} {wide_bar} {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let progress_bar = ProgressBar::new(len as u64).with_style(style);
    progress_bar.enable_steady_tick(Duration::from_millis(100));
    progress_bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::env;
    use std::fs;

    fn scratch(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(format!("scadl-tools-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_npy_round_trip() {
        let path = scratch("probs.npy");
        let probs = array![[0.25f32, 0.75], [0.5, 0.5]];
        write_array(&path, &probs).unwrap();
        let back: Array2<f32> = read_array_2_from_npy_file(&path).unwrap();
        assert_eq!(back, probs);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(read_array_2_from_npy_file::<f32, _>(scratch("missing.npy")).is_err());
    }

    #[test]
    fn test_rank_csv() {
        let path = scratch("rank.csv");
        let mut trajectory = RankTrajectory::default();
        trajectory.push(10, 3);
        trajectory.push(20, 0);
        write_rank_csv(&path, &trajectory).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "traces,rank\n10,3\n20,0\n");
        fs::remove_file(&path).unwrap();
    }
}
