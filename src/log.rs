use crate::descriptor::DatasetDescriptor;
use crate::input::ExtractionJob;
use std::io::Write;
use std::time::Duration;

/// Installs the `env_logger` backend.
///
/// `verbose` raises the level to debug and `quiet` lowers it to errors only.
/// Otherwise `RUST_LOG` applies, defaulting to info.
pub fn init_logging(verbose: bool, quiet: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    } else if quiet {
        builder.filter_level(log::LevelFilter::Error);
    }
    builder
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .try_init()
        .ok();
}

pub fn show_greeting(source: &str) {
    println!("=== geoslice ===");
    println!("Loading job from: {}", source);
}

pub fn job_echo(job: &ExtractionJob) {
    let selection = &job.selection;
    println!("\nJob:");
    println!("  Input: {}", job.input);
    println!("  Output: {}", job.output);
    if let Some(key) = &job.dataset.data_key {
        println!("  Variable: {}", key);
    }

    if selection.coords.is_empty() {
        println!("  Region: whole domain");
    } else {
        let side = |value: &Option<crate::coords::CoordValue>| match value {
            Some(v) => v.to_string(),
            None => "-".to_string(),
        };
        println!(
            "  Region: top={} bottom={} left={} right={}",
            side(&selection.coords.top),
            side(&selection.coords.bottom),
            side(&selection.coords.left),
            side(&selection.coords.right)
        );
    }

    if selection.time_range.is_empty() {
        println!("  Period: whole record");
    } else {
        let bound = |value: &Option<crate::time::TimeBound>| match value {
            Some(v) => v.to_string(),
            None => "-".to_string(),
        };
        println!(
            "  Period: {} to {}",
            bound(&selection.time_range.start),
            bound(&selection.time_range.end)
        );
    }

    if let Some(reshape) = &selection.data_reshape {
        println!("  Reshape: {}", reshape);
    }
    if let Some(stat) = &job.statistic {
        println!("  Statistic: {} along axis {}", stat.kind, stat.axis);
    }
}

pub fn show_dataset(descriptor: &DatasetDescriptor) {
    println!("\nDataset: {}", descriptor.labels().dataset);
    println!("  Variable: {} {:?}", descriptor.data_key(), descriptor.shape());
    println!("  Files: {}", descriptor.source().files().len());
}

pub fn show_farewell_with_timing(shape: &[usize], elapsed: Duration) {
    println!("\nExtracted array of shape {:?}", shape);
    println!("=== Extraction completed in {:.2?} ===", elapsed);
}
