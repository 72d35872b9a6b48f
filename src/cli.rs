//! # CLI Module
//!
//! This module provides the command-line interface for geoslice, including:
//! - Argument parsing with clap
//! - Job file loading (JSON/YAML)
//! - Environment variable support with the GEOSLICE_ prefix
//! - Merging of job file, environment and command-line selections
//! - Template generation for common extraction jobs

use crate::coords::{CoordBounds, CoordValue};
use crate::extract::{DataReshape, SelectionRequest};
use crate::input::{ExtractionJob, StatisticConfig};
use crate::stats::Statistic;
use crate::time::{TimeBound, TimeRange};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Spatial and temporal sub-array extraction for NetCDF datasets
#[derive(Parser, Debug)]
#[command(name = "geoslice")]
#[command(about = "Extract regions and periods from gridded or site-based NetCDF datasets")]
#[command(version)]
#[command(long_about = "
geoslice cuts spatial and temporal subsets out of geophysical NetCDF datasets.
Bounding boxes accept signed degrees or cardinal notation (61S, 120W), and time
ranges accept partial dates that are padded to whole months or years.

FEATURES:
  • Gridded (lat x lon) and site-based (paired coordinates) datasets
  • Partial dates: 1938 means the whole year, 1938-05 the whole month
  • Packed data: scale_factor/add_offset applied, missing values masked
  • Multi-file datasets from a directory or a wildcard pattern
  • Parquet or JSON output, optional mean/std reduction
  • Shell completions: Auto-completion for bash, zsh, fish, and PowerShell

EXAMPLES:
  # Tropics from 1950 to 1999
  geoslice extract gistemp.nc tropics.parquet --top 23N --bottom 23S \\
    --start 1950 --end 1999

  # One month, flattened to (time, lat*lon)
  geoslice extract gistemp.nc may1938.json --start 1938-05 --end 1938-05 \\
    --reshape time,latlon

  # Using a job file
  geoslice extract --config region.yaml

  # Generate templates
  geoslice template region --format yaml > region.yaml

  # File inspection
  geoslice info gistemp.nc --detailed
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Job file path (JSON or YAML)
    #[arg(short, long, global = true, env = "GEOSLICE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract a region and period from a dataset
    #[command(long_about = "
Extract a spatial and temporal subset of a NetCDF dataset.

Coordinates and dates given on the command line override those of the job file,
which in turn override GEOSLICE_BBOX and GEOSLICE_PERIOD.

EXAMPLES:
  # Bounding box in cardinal notation
  geoslice extract gistemp.nc out.parquet --top 61N --bottom 61S --left 91 --right 271

  # Raw time values in the file's own units
  geoslice extract sst.nc out.json --start-raw 43000 --end-raw 43365

  # Directory of yearly files, joined along time
  geoslice extract data/ all.parquet --concat-axis 0

  # Site-based data with a mean over time
  geoslice extract stations.nc mean.json --sites --statistic mean --stat-axis 0

  # Dry run for validation
  geoslice extract gistemp.nc out.parquet --start 1938-05 --dry-run
")]
    Extract(ExtractArgs),

    /// Validate a job file
    #[command(long_about = "
Validate job files without reading any data.

This command checks:
• Job file syntax and structure
• Input file existence
• Output extension (.parquet or .json)
• Reshape and height options

EXAMPLES:
  # Validate a job file
  geoslice validate job.json

  # Validate with the resolved job printed
  geoslice validate job.yaml --detailed
")]
    Validate {
        /// Job file to validate
        config_file: Option<PathBuf>,

        /// Show the parsed job
        #[arg(long)]
        detailed: bool,
    },

    /// Show information about a NetCDF file
    #[command(long_about = "
Inspect NetCDF files and display structure information.

Besides the raw dimensions, variables and attributes, the detected dataset
layout (coordinate variables, data variable, packing and time span) is shown.

EXAMPLES:
  # Basic file info
  geoslice info data.nc

  # Detailed information
  geoslice info data.nc --detailed

  # Info about a specific variable
  geoslice info data.nc -n tempanomaly

  # JSON output for scripting
  geoslice info data.nc --format json
")]
    Info {
        /// NetCDF file, directory or wildcard pattern
        file: String,

        /// Show every variable and global attribute
        #[arg(long)]
        detailed: bool,

        /// List only this variable and use it as the data variable
        #[arg(short = 'n', long)]
        variable: Option<String>,

        /// Output format for file information
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Generate job templates
    #[command(long_about = "
Generate job file templates for common use cases.

Available templates:
• basic: Whole dataset to Parquet
• region: Bounding box and period
• sites: Site-based dataset with a time mean
• multifile: Directory of files joined along time

EXAMPLES:
  geoslice template basic
  geoslice template region --format yaml -o region.yaml
")]
    Template {
        /// Template type to generate
        #[arg(value_enum)]
        template_type: TemplateType,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Configuration format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Json)]
        format: ConfigFormat,
    },

    /// Generate shell completions
    #[command(long_about = "
Generate shell completion scripts for bash, zsh, fish, and PowerShell.

INSTALLATION:
  geoslice completions bash > ~/.bash_completion.d/geoslice
  geoslice completions zsh > ~/.zsh/completions/_geoslice
  geoslice completions fish > ~/.config/fish/completions/geoslice.fish
")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ExtractArgs {
    /// Input NetCDF file, directory or wildcard pattern
    #[arg(value_name = "INPUT", env = "GEOSLICE_INPUT")]
    pub input: Option<String>,

    /// Output file (.parquet or .json)
    #[arg(value_name = "OUTPUT", env = "GEOSLICE_OUTPUT")]
    pub output: Option<String>,

    /// Data variable name (detected when omitted)
    #[arg(short = 'n', long, env = "GEOSLICE_VARIABLE")]
    pub variable: Option<String>,

    /// Northern bound, e.g. 61N or 61
    #[arg(long, allow_hyphen_values = true)]
    pub top: Option<String>,

    /// Southern bound, e.g. 61S or -61
    #[arg(long, allow_hyphen_values = true)]
    pub bottom: Option<String>,

    /// Western bound, e.g. 120W or 91
    #[arg(long, allow_hyphen_values = true)]
    pub left: Option<String>,

    /// Eastern bound, e.g. 30E or 271
    #[arg(long, allow_hyphen_values = true)]
    pub right: Option<String>,

    /// Start date: YYYY[-MM[-DD[THH[:MM[:SS[.ffffff]]]]]]
    #[arg(long, value_parser = parse_date_arg, conflicts_with = "start_raw")]
    pub start: Option<DateArg>,

    /// End date: YYYY[-MM[-DD[THH[:MM[:SS[.ffffff]]]]]]
    #[arg(long, value_parser = parse_date_arg, conflicts_with = "end_raw")]
    pub end: Option<DateArg>,

    /// Start as a raw time value in the file's units
    #[arg(long, allow_hyphen_values = true)]
    pub start_raw: Option<f64>,

    /// End as a raw time value in the file's units
    #[arg(long, allow_hyphen_values = true)]
    pub end_raw: Option<f64>,

    /// Reshape result: 'time,latlon' or dimensions like '12,-1'
    #[arg(long, value_parser = parse_reshape, allow_hyphen_values = true)]
    pub reshape: Option<DataReshape>,

    /// Dataset holds paired site coordinates instead of a grid
    #[arg(long)]
    pub sites: bool,

    /// Replace missing values with NaN
    #[arg(long)]
    pub mask_missing: bool,

    /// Reduce the result: mean or std
    #[arg(long, value_parser = parse_statistic)]
    pub statistic: Option<Statistic>,

    /// Axis for --statistic
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub stat_axis: isize,

    /// Axis to join multi-file results along (default: last)
    #[arg(long, allow_hyphen_values = true)]
    pub concat_axis: Option<isize>,

    /// Force overwrite existing output files
    #[arg(long, env = "GEOSLICE_FORCE")]
    pub force: bool,

    /// Dry run - resolve the selection without extracting
    #[arg(long, env = "GEOSLICE_DRY_RUN")]
    pub dry_run: bool,
}

/// Partial calendar date from the command line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DateArg(pub Vec<i64>);

#[derive(ValueEnum, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
    /// CSV output (where applicable)
    Csv,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum TemplateType {
    /// Whole dataset to Parquet
    Basic,
    /// Bounding box and period
    Region,
    /// Site-based dataset with a time mean
    Sites,
    /// Directory of files joined along time
    Multifile,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON configuration format
    Json,
    /// YAML configuration format
    Yaml,
}

/// Parse a calendar date from a command line argument
/// Format: YYYY[-MM[-DD[THH[:MM[:SS[.ffffff]]]]]]
pub fn parse_date(s: &str) -> Result<Vec<i64>, String> {
    let s = s.trim();
    let (date, clock) = match s.split_once(['T', ' ']) {
        Some((date, clock)) => (date, Some(clock)),
        None => (s, None),
    };

    let mut fields = Vec::new();
    for part in date.split('-') {
        fields.push(
            part.parse::<i64>()
                .map_err(|_| format!("Invalid date '{}': expected YYYY[-MM[-DD]]", s))?,
        );
    }
    if fields.len() > 3 {
        return Err(format!("Invalid date '{}': too many date fields", s));
    }

    if let Some(clock) = clock {
        if fields.len() != 3 {
            return Err(format!("Invalid date '{}': a time of day needs a full date", s));
        }
        let parts: Vec<&str> = clock.split(':').collect();
        if parts.len() > 3 {
            return Err(format!("Invalid date '{}': expected HH[:MM[:SS]]", s));
        }
        for (i, part) in parts.iter().enumerate() {
            let (whole, frac) = match part.split_once('.') {
                Some((whole, frac)) if i == 2 => (whole, Some(frac)),
                Some(_) => return Err(format!("Invalid date '{}': fractions only allowed on seconds", s)),
                None => (*part, None),
            };
            fields.push(whole.parse::<i64>().map_err(|_| format!("Invalid time in '{}'", s))?);
            if let Some(frac) = frac {
                if frac.is_empty() || frac.len() > 6 || !frac.chars().all(|c| c.is_ascii_digit()) {
                    return Err(format!("Invalid fraction of second in '{}'", s));
                }
                let micro = format!("{:0<6}", frac);
                fields.push(micro.parse::<i64>().map_err(|_| format!("Invalid time in '{}'", s))?);
            }
        }
    }
    Ok(fields)
}

fn parse_date_arg(s: &str) -> Result<DateArg, String> {
    parse_date(s).map(DateArg)
}

/// Parse a reshape argument: 'time,latlon' or comma separated dimensions
fn parse_reshape(s: &str) -> Result<DataReshape, String> {
    s.parse::<DataReshape>()
}

fn parse_statistic(s: &str) -> Result<Statistic, String> {
    s.parse::<Statistic>()
}

/// Parse a bounding box: top,bottom,left,right with empty sides allowed
/// e.g. "61N,61S,91,271" or ",,120W,30E"
pub fn parse_bbox(s: &str) -> Result<CoordBounds, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err("Bounding box must be in format 'top,bottom,left,right'".to_string());
    }
    let side = |text: &str| -> Result<Option<CoordValue>, String> {
        if text.is_empty() {
            return Ok(None);
        }
        let value = CoordValue::from(text);
        value
            .to_degrees()
            .map_err(|e| format!("Invalid bounding box: {}", e))?;
        Ok(Some(value))
    };
    Ok(CoordBounds {
        top: side(parts[0])?,
        bottom: side(parts[1])?,
        left: side(parts[2])?,
        right: side(parts[3])?,
    })
}

/// Parse a period: START..END with dates in [`parse_date`] format, either side optional
pub fn parse_period(s: &str) -> Result<TimeRange, String> {
    let (start, end) = s
        .split_once("..")
        .ok_or_else(|| "Period must be in format 'START..END'".to_string())?;
    let bound = |text: &str| -> Result<Option<TimeBound>, String> {
        let text = text.trim();
        if text.is_empty() {
            Ok(None)
        } else {
            parse_date(text).map(|fields| Some(TimeBound::Date(fields)))
        }
    };
    Ok(TimeRange::new(bound(start)?, bound(end)?))
}

/// Environment variable format:
/// - GEOSLICE_BBOX: "top,bottom,left,right", e.g. "61N,61S,91,271"
/// - GEOSLICE_PERIOD: "START..END", e.g. "1913-05..1971-09"
pub fn parse_selection_from_env() -> Result<(CoordBounds, TimeRange), String> {
    let mut coords = CoordBounds::default();
    let mut period = TimeRange::default();

    if let Ok(bbox_env) = env::var("GEOSLICE_BBOX")
        && !bbox_env.trim().is_empty()
    {
        coords = parse_bbox(&bbox_env).map_err(|e| format!("Invalid GEOSLICE_BBOX: {}", e))?;
    }

    if let Ok(period_env) = env::var("GEOSLICE_PERIOD")
        && !period_env.trim().is_empty()
    {
        period = parse_period(&period_env).map_err(|e| format!("Invalid GEOSLICE_PERIOD: {}", e))?;
    }

    Ok((coords, period))
}

fn pick<T>(high: Option<T>, low: Option<T>) -> Option<T> {
    high.or(low)
}

/// Merge selections side by side
/// Priority: CLI arguments > job file > environment variables
pub fn merge_selection(
    cli_coords: CoordBounds,
    cli_period: TimeRange,
    job: &SelectionRequest,
) -> Result<(CoordBounds, TimeRange), String> {
    let (env_coords, env_period) = parse_selection_from_env()?;

    let coords = CoordBounds {
        top: pick(cli_coords.top, pick(job.coords.top.clone(), env_coords.top)),
        bottom: pick(cli_coords.bottom, pick(job.coords.bottom.clone(), env_coords.bottom)),
        left: pick(cli_coords.left, pick(job.coords.left.clone(), env_coords.left)),
        right: pick(cli_coords.right, pick(job.coords.right.clone(), env_coords.right)),
    };
    let period = TimeRange {
        start: pick(cli_period.start, pick(job.time_range.start.clone(), env_period.start)),
        end: pick(cli_period.end, pick(job.time_range.end.clone(), env_period.end)),
    };
    Ok((coords, period))
}

impl ExtractArgs {
    pub fn coords(&self) -> CoordBounds {
        CoordBounds {
            top: self.top.as_deref().map(CoordValue::from),
            bottom: self.bottom.as_deref().map(CoordValue::from),
            left: self.left.as_deref().map(CoordValue::from),
            right: self.right.as_deref().map(CoordValue::from),
        }
    }

    pub fn period(&self) -> TimeRange {
        let start = match (&self.start, self.start_raw) {
            (Some(DateArg(fields)), _) => Some(TimeBound::Date(fields.clone())),
            (None, Some(raw)) => Some(TimeBound::Raw(raw)),
            (None, None) => None,
        };
        let end = match (&self.end, self.end_raw) {
            (Some(DateArg(fields)), _) => Some(TimeBound::Date(fields.clone())),
            (None, Some(raw)) => Some(TimeBound::Raw(raw)),
            (None, None) => None,
        };
        TimeRange::new(start, end)
    }

    /// Builds the job to run, layering these arguments over `base`.
    ///
    /// Without a base job both input and output must be given.
    pub fn into_job(self, base: Option<ExtractionJob>) -> Result<ExtractionJob, String> {
        let mut job = match base {
            Some(job) => job,
            None => {
                let input = self
                    .input
                    .clone()
                    .ok_or("Input file is required (or use --config)")?;
                let output = self
                    .output
                    .clone()
                    .ok_or("Output file is required (or use --config)")?;
                ExtractionJob::new(input, output)
            }
        };

        if let Some(input) = &self.input {
            job.input = input.clone();
        }
        if let Some(output) = &self.output {
            job.output = output.clone();
        }
        if let Some(variable) = &self.variable {
            job.dataset.data_key = Some(variable.clone());
        }
        if self.sites {
            job.dataset.gridded = Some(false);
        }

        let (coords, period) = merge_selection(self.coords(), self.period(), &job.selection)?;
        job.selection.coords = coords;
        job.selection.time_range = period;

        if let Some(reshape) = self.reshape {
            job.selection.data_reshape = Some(reshape);
        }
        if self.mask_missing {
            job.selection.mask_missing = true;
        }
        if let Some(kind) = self.statistic {
            job.statistic = Some(StatisticConfig {
                kind,
                axis: self.stat_axis,
            });
        }
        if let Some(axis) = self.concat_axis {
            job.concat_axis = axis;
        }
        Ok(job)
    }
}

/// Example job for each template type
pub fn template_job(template_type: &TemplateType) -> ExtractionJob {
    match template_type {
        TemplateType::Basic => ExtractionJob::new("gistemp1200_ERSST.nc", "gistemp.parquet"),
        TemplateType::Region => {
            let selection = SelectionRequest::new()
                .with_coords(CoordBounds::new().top("61N").bottom("61S").left(91.0).right(271.0))
                .with_time_range(TimeRange::new(
                    Some(TimeBound::date(&[1913, 5])),
                    Some(TimeBound::date(&[1971, 9])),
                ))
                .with_mask_missing(true);
            ExtractionJob::new("gistemp1200_ERSST.nc", "pacific_1913_1971.parquet").with_selection(selection)
        }
        TemplateType::Sites => {
            let mut job = ExtractionJob::new("stations.nc", "station_means.json").with_selection(
                SelectionRequest::new()
                    .with_coords(CoordBounds::new().top(50.0).bottom(25.0).left("125W").right("65W"))
                    .with_mask_missing(true),
            );
            job.dataset.gridded = Some(false);
            job.statistic = Some(StatisticConfig {
                kind: Statistic::Mean,
                axis: 0,
            });
            job
        }
        TemplateType::Multifile => {
            let mut job = ExtractionJob::new("data/", "all_years.parquet").with_selection(
                SelectionRequest::new().with_time_range(TimeRange::new(Some(TimeBound::date(&[1990])), None)),
            );
            job.concat_axis = 0;
            job
        }
    }
}

// Global mutex to ensure environment variable tests run sequentially
#[cfg(test)]
pub(crate) static ENV_TEST_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
