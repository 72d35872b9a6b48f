use anyhow::{anyhow, bail, Context, Result};
use clap::{CommandFactory, Parser};
use geoslice::cli::{template_job, Cli, Commands, ConfigFormat, ExtractArgs, OutputFormat, TemplateType};
use geoslice::info::{dataset_info, print_info_csv, print_info_human, print_info_json, print_info_yaml};
use geoslice::input::ExtractionJob;
use geoslice::log::{init_logging, job_echo, show_dataset, show_farewell_with_timing, show_greeting};
use geoslice::{extract_job, load_descriptor, write_output};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

fn main() -> Result<()> {
    let Cli {
        verbose,
        quiet,
        output_format,
        config,
        command,
    } = Cli::parse();
    init_logging(verbose, quiet);

    match command {
        Commands::Extract(args) => run_extract(args, config.as_deref(), quiet),
        Commands::Validate { config_file, detailed } => run_validate(config_file.or(config), detailed, &output_format),
        Commands::Info {
            file,
            detailed,
            variable,
            format,
        } => run_info(&file, detailed, variable.as_deref(), &format.unwrap_or(output_format)),
        Commands::Template {
            template_type,
            output,
            format,
        } => run_template(&template_type, output.as_deref(), &format),
        Commands::Completions { shell, output } => {
            let mut cmd = Cli::command();
            match output {
                Some(path) => {
                    let mut file = fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    clap_complete::generate(shell, &mut cmd, "geoslice", &mut file);
                }
                None => clap_complete::generate(shell, &mut cmd, "geoslice", &mut std::io::stdout()),
            }
            Ok(())
        }
    }
}

fn run_extract(args: ExtractArgs, config: Option<&Path>, quiet: bool) -> Result<()> {
    let start_time = Instant::now();
    let (force, dry_run) = (args.force, args.dry_run);

    let base = match config {
        Some(path) => Some(
            ExtractionJob::from_file(path).map_err(|e| anyhow!("Failed to load job file {}: {}", path.display(), e))?,
        ),
        None => None,
    };
    let source = config
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "command line".to_string());
    let job = args.into_job(base).map_err(anyhow::Error::msg)?;

    if !quiet {
        show_greeting(&source);
        job_echo(&job);
    }

    let problems = job.validate();
    if !problems.is_empty() {
        bail!("Invalid job:\n  {}", problems.join("\n  "));
    }
    if Path::new(&job.output).exists() && !force && !dry_run {
        bail!("Output file {} already exists (use --force to overwrite)", job.output);
    }

    let descriptor =
        load_descriptor(&job).with_context(|| format!("Failed to read dataset metadata from {}", job.input))?;
    if !quiet {
        show_dataset(&descriptor);
    }

    if dry_run {
        let selection = descriptor
            .selection(&job.selection.time_range, &job.selection.coords, job.selection.height.as_ref())
            .context("Selection cannot be applied to this dataset")?;
        println!("\nDry run, selection resolved to:");
        for slice in &selection {
            println!("  {}: {} positions", slice.axis, slice.selector.len());
        }
        return Ok(());
    }

    let files = job.files.clone().unwrap_or_else(|| descriptor.source().files());
    let bar = if quiet || files.len() < 2 {
        ProgressBar::hidden()
    } else {
        let style = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(files.len() as u64).with_style(style)
    };

    let data = extract_job(&job, &descriptor, |_, path| {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        bar.set_message(name);
        bar.inc(1);
    })
    .context("Extraction failed")?;
    bar.finish_and_clear();

    write_output(&job, &descriptor, &data).map_err(|e| anyhow!("Failed to write {}: {}", job.output, e))?;

    if !quiet {
        show_farewell_with_timing(data.shape(), start_time.elapsed());
    }
    Ok(())
}

fn run_validate(config_file: Option<PathBuf>, detailed: bool, format: &OutputFormat) -> Result<()> {
    let path = config_file.context("No job file given (pass a path or use --config)")?;
    let job = ExtractionJob::from_file(&path).map_err(|e| anyhow!("Invalid job file {}: {}", path.display(), e))?;
    let problems = job.validate();

    match format {
        OutputFormat::Json | OutputFormat::Yaml => {
            let report = serde_json::json!({
                "path": path.display().to_string(),
                "valid": problems.is_empty(),
                "problems": problems,
                "job": job,
            });
            if *format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", serde_yaml::to_string(&report)?);
            }
        }
        _ => {
            if problems.is_empty() {
                println!("✓ {} is valid", path.display());
                if detailed {
                    let yaml = job.to_yaml().map_err(|e| anyhow!("{}", e))?;
                    println!("\n{}", yaml);
                }
            } else {
                for problem in &problems {
                    println!("✗ {}", problem);
                }
            }
        }
    }

    if !problems.is_empty() {
        bail!("{} problem(s) found in {}", problems.len(), path.display());
    }
    Ok(())
}

fn run_info(file: &str, detailed: bool, variable: Option<&str>, format: &OutputFormat) -> Result<()> {
    let info = dataset_info(file, variable, detailed)?;
    match format {
        OutputFormat::Human => {
            print_info_human(&info);
            Ok(())
        }
        OutputFormat::Json => print_info_json(&info),
        OutputFormat::Yaml => print_info_yaml(&info),
        OutputFormat::Csv => print_info_csv(&info),
    }
}

fn run_template(template_type: &TemplateType, output: Option<&Path>, format: &ConfigFormat) -> Result<()> {
    let job = template_job(template_type);
    let content = match format {
        ConfigFormat::Json => job.to_json(),
        ConfigFormat::Yaml => job.to_yaml(),
    }
    .map_err(|e| anyhow!("Failed to render template: {}", e))?;

    match output {
        Some(path) => {
            fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Template written to {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
