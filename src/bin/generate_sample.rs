use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use openfret::{write_data, ChannelParams, Dataset, Metadata, MetadataValue, Orientation};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    fn range(&mut self, lo: usize, hi: usize) -> usize {
        lo + (self.next_u64() % (hi - lo) as u64) as usize
    }
}

const FRAMES: usize = 400;
const TOTAL_INTENSITY: f64 = 1000.0;
const BACKGROUND: f64 = 40.0;

/// One molecule: donor/acceptor intensities for a given FRET efficiency.
/// The acceptor bleaches first (donor recovers), then the donor bleaches.
fn generate_pair(efficiency: f64, rng: &mut SimpleRng) -> (Vec<f64>, Vec<f64>) {
    let acceptor_bleach = rng.range(FRAMES / 3, FRAMES * 3 / 4);
    let donor_bleach = rng.range(acceptor_bleach, FRAMES);
    let mut donor = Vec::with_capacity(FRAMES);
    let mut acceptor = Vec::with_capacity(FRAMES);
    for frame in 0..FRAMES {
        let (d, a) = if frame < acceptor_bleach {
            (TOTAL_INTENSITY * (1.0 - efficiency), TOTAL_INTENSITY * efficiency)
        } else if frame < donor_bleach {
            (TOTAL_INTENSITY, 0.0)
        } else {
            (0.0, 0.0)
        };
        donor.push(d + BACKGROUND + rng.gauss(0.0, 25.0));
        acceptor.push(a + BACKGROUND + rng.gauss(0.0, 25.0));
    }
    (donor, acceptor)
}

fn write_pair_csv(path: &Path, donor: &[f64], acceptor: &[f64]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(["donor", "acceptor"])?;
    for (d, a) in donor.iter().zip(acceptor) {
        wtr.write_record([format!("{d:.3}"), format!("{a:.3}")])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_matrix_csv(path: &Path, rows: &[Vec<f64>]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        wtr.write_record(row.iter().map(|v| format!("{v:.3}")))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write synthetic two-color FRET traces as CSV files and a JSON document
#[derive(Parser)]
#[command(name = "generate_sample")]
struct Args {
    /// Output directory
    #[arg(default_value = "sample_data")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = Args::parse().out_dir;
    let tree_root = out_dir.join("fret_data_csv");

    let mut rng = SimpleRng::new(42);
    let conditions = [("high_fret", 0.8), ("low_fret", 0.3)];
    let traces_per_condition = 5;

    let mut donor_rows = Vec::new();
    let mut acceptor_rows = Vec::new();
    for (label, efficiency) in conditions {
        let label_dir = tree_root.join(label);
        fs::create_dir_all(&label_dir)
            .with_context(|| format!("creating {}", label_dir.display()))?;
        for i in 0..traces_per_condition {
            let (donor, acceptor) = generate_pair(efficiency, &mut rng);
            write_pair_csv(&label_dir.join(format!("trace_{i:03}.csv")), &donor, &acceptor)?;
            donor_rows.push(donor);
            acceptor_rows.push(acceptor);
        }
    }

    let donor_path = out_dir.join("donor_traces.csv");
    let acceptor_path = out_dir.join("acceptor_traces.csv");
    write_matrix_csv(&donor_path, &donor_rows)?;
    write_matrix_csv(&acceptor_path, &acceptor_rows)?;

    // Matrix files assembled into a full document.
    let mut dataset = Dataset::new("Synthetic FRET Experiment");
    dataset.description = Some("Simulated two-color smFRET traces".into());
    dataset.experiment_type = Some("2-Color FRET".into());
    dataset.authors = vec!["Sample Generator".into()];
    dataset.date = NaiveDate::from_ymd_opt(2024, 1, 1);
    dataset
        .metadata
        .insert("seed".into(), MetadataValue::Integer(42));
    let mut buffer = Metadata::new();
    buffer.insert("pH".into(), MetadataValue::Float(7.4));
    dataset
        .sample_details
        .insert("buffer_conditions".into(), "Phosphate buffer".into());
    dataset
        .sample_details
        .insert("other_details".into(), buffer.into());

    dataset.load_from_csv("donor", &donor_path, Orientation::Rows, &ChannelParams::default())?;
    dataset.load_from_csv(
        "acceptor",
        &acceptor_path,
        Orientation::Rows,
        &ChannelParams::default(),
    )?;
    let donor = ChannelParams {
        excitation_wavelength: Some(532.0),
        emission_wavelength: Some(585.0),
        ..Default::default()
    };
    let acceptor = ChannelParams {
        excitation_wavelength: Some(640.0),
        emission_wavelength: Some(680.0),
        ..Default::default()
    };
    dataset.bulk_set(Some("donor"), &donor);
    dataset.bulk_set(Some("acceptor"), &acceptor);
    dataset.bulk_set(
        None,
        &ChannelParams {
            exposure_time: Some(0.1),
            ..Default::default()
        },
    );

    let json_path = out_dir.join("fret_data.json");
    write_data(&dataset, &json_path)?;

    println!(
        "Wrote {} traces ({FRAMES} frames each) to {}, {} and {}",
        dataset.len(),
        tree_root.display(),
        donor_path.display(),
        json_path.display()
    );
    Ok(())
}
