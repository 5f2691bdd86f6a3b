use anyhow::{bail, Context, Result};
use log::info;
use ndarray::Array2;
use scadl::leakage::{LeakageModel, SboxHw, SboxLsb, SboxOutput};
use scadl::metadata::{load_metadata, Metadata};
use scadl::rank::{key_rank_multi_label, LogBase};
use scadl::tools::{read_array_2_from_npy_file, write_array, write_rank_csv};
use serde::Deserialize;
use std::{env, fs::File, io::BufReader, time::Instant};

/// Key rank job, read from the JSON file given on the command line.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RankJob {
    /// `f32` predictions, one row per attack trace
    predictions: String,
    /// `u8` plaintexts, one row per attack trace
    plaintexts: String,
    /// `u8` keys; the first row gives the correct key when `correct_key`
    /// is not set
    keys: Option<String>,
    target_byte: usize,
    /// Labelling the predictions were trained on
    #[serde(default)]
    leakage: Leakage,
    #[serde(default = "default_guess_range")]
    guess_range: usize,
    correct_key: Option<usize>,
    #[serde(default = "default_step")]
    step: usize,
    #[serde(default)]
    log_base: LogBase,
    /// Output columns of the targeted byte, all of them when unset
    prob_range: Option<(usize, usize)>,
    output: String,
    csv: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Leakage {
    #[default]
    Sbox,
    Lsb,
    Hw,
}

impl Leakage {
    fn model(self, target_byte: usize) -> Box<dyn LeakageModel<Metadata>> {
        match self {
            Leakage::Sbox => Box::new(SboxOutput { target_byte }),
            Leakage::Lsb => Box::new(SboxLsb { target_byte }),
            Leakage::Hw => Box::new(SboxHw { target_byte }),
        }
    }
}

fn default_guess_range() -> usize {
    256
}

fn default_step() -> usize {
    10
}

fn run(job: &RankJob) -> Result<()> {
    let predictions: Array2<f32> = read_array_2_from_npy_file(&job.predictions)
        .with_context(|| format!("reading predictions {}", job.predictions))?;
    let metadata = load_metadata(&job.plaintexts, job.keys.as_deref(), None)
        .context("reading metadata")?;

    let correct_key = match (job.correct_key, metadata.first()) {
        (Some(key), _) => key,
        (None, Some(m)) if !m.key.is_empty() => m.key_byte(job.target_byte)? as usize,
        _ => bail!("no correct_key given and no keys to take it from"),
    };
    let (lo, hi) = job.prob_range.unwrap_or((0, predictions.ncols()));

    info!(
        "ranking key byte {} ({:?}) over {} traces, correct key {:#04x}",
        job.target_byte,
        job.leakage,
        predictions.nrows(),
        correct_key
    );
    let trajectory = key_rank_multi_label(
        predictions.view(),
        lo..hi,
        &metadata,
        job.leakage.model(job.target_byte).as_ref(),
        job.guess_range,
        correct_key,
        job.step,
        job.log_base,
    )?;

    write_array(&job.output, &trajectory.to_array())?;
    if let Some(csv) = &job.csv {
        write_rank_csv(csv, &trajectory)?;
    }
    match trajectory.traces_to_rank_zero() {
        Some(n) => println!("Key rank 0 reached after {n} traces"),
        None => println!("Final key rank = {:?}", trajectory.final_rank()),
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        bail!("usage: {} <job.json>", args[0]);
    }
    let reader = BufReader::new(File::open(&args[1]).with_context(|| format!("opening {}", args[1]))?);
    let job: RankJob = serde_json::from_reader(reader).context("parsing job file")?;

    let t = Instant::now();
    run(&job)?;
    info!("done in {:?}", t.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_selects_leakage_model() {
        let job: RankJob = serde_json::from_str(
            r#"{"predictions": "p.npy", "plaintexts": "t.npy", "target_byte": 0,
                "leakage": "lsb", "output": "rank.npy"}"#,
        )
        .unwrap();
        let m = Metadata::new(vec![0x00], vec![]);
        // sbox[0] = 0x63
        let model = job.leakage.model(job.target_byte);
        assert_eq!(model.class_index(&m, 0).unwrap(), 1);
        assert_eq!(Leakage::Hw.model(0).class_index(&m, 0).unwrap(), 4);
        assert_eq!(Leakage::default().model(0).class_index(&m, 0).unwrap(), 0x63);
        assert_eq!(job.step, 10);
    }
}
