//! # CLI Integration Tests
//!
//! Argument parsing for every subcommand, plus the way parsed arguments are
//! turned into extraction jobs.

#[cfg(test)]
mod tests {
    use clap::Parser;
    use std::path::PathBuf;

    use crate::cli::{Cli, Commands, ConfigFormat, DateArg, ENV_TEST_MUTEX, OutputFormat, TemplateType};
    use crate::coords::CoordValue;
    use crate::extract::DataReshape;
    use crate::input::ExtractionJob;
    use crate::stats::Statistic;
    use crate::time::TimeBound;

    /// Test basic CLI argument parsing
    #[test]
    fn test_cli_help() {
        let result = Cli::try_parse_from(["geoslice", "--help"]);
        assert!(result.is_err()); // --help causes early exit with "error"

        let error = result.unwrap_err();
        assert!(error.to_string().contains("geoslice cuts spatial and temporal subsets"));
    }

    #[test]
    fn test_cli_version() {
        let result = Cli::try_parse_from(["geoslice", "--version"]);
        assert!(result.is_err()); // --version causes early exit
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "geoslice",
            "--verbose",
            "--output-format",
            "json",
            "--config",
            "/path/to/job.json",
            "template",
            "basic",
        ]);

        assert!(cli.verbose);
        assert_eq!(cli.output_format, OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/job.json")));
    }

    #[test]
    fn test_extract_command_basic() {
        let cli = Cli::parse_from(["geoslice", "extract", "gistemp.nc", "out.parquet", "-n", "tempanomaly"]);

        if let Commands::Extract(args) = &cli.command {
            assert_eq!(args.input, Some("gistemp.nc".to_string()));
            assert_eq!(args.output, Some("out.parquet".to_string()));
            assert_eq!(args.variable, Some("tempanomaly".to_string()));
            assert!(!args.sites);
            assert!(!args.dry_run);
        } else {
            panic!("Expected Extract command");
        }
    }

    #[test]
    fn test_extract_command_with_selection() {
        let cli = Cli::parse_from([
            "geoslice",
            "extract",
            "gistemp.nc",
            "out.json",
            "--top",
            "61N",
            "--bottom",
            "-61",
            "--left",
            "91",
            "--right",
            "271",
            "--start",
            "1913-05",
            "--end",
            "1971-09",
            "--reshape",
            "time,latlon",
            "--mask-missing",
            "--force",
            "--dry-run",
        ]);

        if let Commands::Extract(args) = &cli.command {
            assert_eq!(args.top.as_deref(), Some("61N"));
            assert_eq!(args.bottom.as_deref(), Some("-61"));
            assert_eq!(args.start, Some(DateArg(vec![1913, 5])));
            assert_eq!(args.end, Some(DateArg(vec![1971, 9])));
            assert_eq!(args.reshape, Some(DataReshape::TimeLatLon));
            assert!(args.mask_missing);
            assert!(args.force);
            assert!(args.dry_run);

            let coords = args.coords();
            assert_eq!(coords.bottom.unwrap().to_degrees().unwrap(), -61.0);
        } else {
            panic!("Expected Extract command");
        }
    }

    #[test]
    fn test_extract_raw_time_and_statistic() {
        let cli = Cli::parse_from([
            "geoslice",
            "extract",
            "stations.nc",
            "mean.json",
            "--sites",
            "--start-raw",
            "-365",
            "--end-raw",
            "730.5",
            "--statistic",
            "std",
            "--stat-axis",
            "-1",
            "--concat-axis",
            "0",
        ]);

        if let Commands::Extract(args) = &cli.command {
            assert!(args.sites);
            assert_eq!(args.start_raw, Some(-365.0));
            assert_eq!(args.end_raw, Some(730.5));
            assert_eq!(args.statistic, Some(Statistic::Std));
            assert_eq!(args.stat_axis, -1);
            assert_eq!(args.concat_axis, Some(0));
        } else {
            panic!("Expected Extract command");
        }
    }

    #[test]
    fn test_date_and_raw_bounds_conflict() {
        let result = Cli::try_parse_from([
            "geoslice",
            "extract",
            "in.nc",
            "out.json",
            "--start",
            "1950",
            "--start-raw",
            "100",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_date_rejected() {
        let result = Cli::try_parse_from(["geoslice", "extract", "in.nc", "out.json", "--start", "May-1950"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_info_command() {
        let cli = Cli::parse_from([
            "geoslice",
            "info",
            "test.nc",
            "--detailed",
            "-n",
            "tempanomaly",
            "--format",
            "yaml",
        ]);

        if let Commands::Info {
            file,
            detailed,
            variable,
            format,
        } = &cli.command
        {
            assert_eq!(file, "test.nc");
            assert!(detailed);
            assert_eq!(variable, &Some("tempanomaly".to_string()));
            assert_eq!(format, &Some(OutputFormat::Yaml));
        } else {
            panic!("Expected Info command");
        }
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["geoslice", "validate", "job.yaml", "--detailed"]);

        if let Commands::Validate { config_file, detailed } = &cli.command {
            assert_eq!(config_file, &Some(PathBuf::from("job.yaml")));
            assert!(detailed);
        } else {
            panic!("Expected Validate command");
        }
    }

    #[test]
    fn test_template_command() {
        let cli = Cli::parse_from(["geoslice", "template", "region", "--format", "yaml", "-o", "region.yaml"]);

        if let Commands::Template {
            template_type,
            output,
            format,
        } = &cli.command
        {
            assert_eq!(template_type, &TemplateType::Region);
            assert_eq!(output, &Some(PathBuf::from("region.yaml")));
            assert_eq!(format, &ConfigFormat::Yaml);
        } else {
            panic!("Expected Template command");
        }
    }

    #[test]
    fn test_template_types() {
        for (name, expected) in [
            ("basic", TemplateType::Basic),
            ("region", TemplateType::Region),
            ("sites", TemplateType::Sites),
            ("multifile", TemplateType::Multifile),
        ] {
            let cli = Cli::parse_from(["geoslice", "template", name]);
            if let Commands::Template { template_type, .. } = cli.command {
                assert_eq!(template_type, expected);
            } else {
                panic!("Expected Template command");
            }
        }
        assert!(Cli::try_parse_from(["geoslice", "template", "s3"]).is_err());
    }

    #[test]
    fn test_verbose_quiet_conflict() {
        let result = Cli::try_parse_from(["geoslice", "--verbose", "--quiet", "template", "basic"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_environment_variables() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        let saved: Vec<(&str, Option<String>)> = ["GEOSLICE_INPUT", "GEOSLICE_OUTPUT", "GEOSLICE_VARIABLE"]
            .into_iter()
            .map(|key| (key, std::env::var(key).ok()))
            .collect();

        unsafe {
            std::env::set_var("GEOSLICE_INPUT", "env_input.nc");
            std::env::set_var("GEOSLICE_OUTPUT", "env_output.parquet");
            std::env::set_var("GEOSLICE_VARIABLE", "sst");
        }

        let cli = Cli::parse_from(["geoslice", "extract"]);
        if let Commands::Extract(args) = &cli.command {
            assert_eq!(args.input, Some("env_input.nc".to_string()));
            assert_eq!(args.output, Some("env_output.parquet".to_string()));
            assert_eq!(args.variable, Some("sst".to_string()));
        } else {
            panic!("Expected Extract command");
        }

        // Command line beats the environment
        let cli = Cli::parse_from(["geoslice", "extract", "cli.nc", "cli.json"]);
        if let Commands::Extract(args) = &cli.command {
            assert_eq!(args.input, Some("cli.nc".to_string()));
            assert_eq!(args.output, Some("cli.json".to_string()));
        } else {
            panic!("Expected Extract command");
        }

        unsafe {
            for (key, value) in &saved {
                match value {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_command_overrides() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        let saved: Vec<(&str, Option<String>)> = [
            "GEOSLICE_INPUT",
            "GEOSLICE_OUTPUT",
            "GEOSLICE_VARIABLE",
            "GEOSLICE_BBOX",
            "GEOSLICE_PERIOD",
        ]
        .into_iter()
        .map(|key| (key, std::env::var(key).ok()))
        .collect();
        unsafe {
            for (key, _) in &saved {
                std::env::remove_var(key);
            }
        }

        let base = ExtractionJob::from_json(
            r#"{
                "input": "base.nc",
                "output": "base.parquet",
                "dataset": {"data_key": "sst"},
                "selection": {
                    "coords": {"top": "30N", "bottom": "30S"},
                    "time_range": {"start": [1990], "end": [1999]}
                }
            }"#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "geoslice",
            "extract",
            "--top",
            "10N",
            "--end",
            "1995-06",
            "-n",
            "anomaly",
            "--statistic",
            "mean",
        ]);
        let Commands::Extract(args) = cli.command else {
            panic!("Expected Extract command");
        };
        let job = args.into_job(Some(base)).unwrap();

        // Paths come from the job file, everything given on the command line wins
        assert_eq!(job.input, "base.nc");
        assert_eq!(job.output, "base.parquet");
        assert_eq!(job.dataset.data_key, Some("anomaly".to_string()));
        assert_eq!(job.selection.coords.top, Some(CoordValue::from("10N")));
        assert_eq!(job.selection.coords.bottom, Some(CoordValue::from("30S")));
        assert_eq!(job.selection.time_range.start, Some(TimeBound::date(&[1990])));
        assert_eq!(job.selection.time_range.end, Some(TimeBound::date(&[1995, 6])));
        assert_eq!(job.statistic.map(|s| (s.kind, s.axis)), Some((Statistic::Mean, 0)));

        unsafe {
            for (key, value) in &saved {
                if let Some(v) = value {
                    std::env::set_var(key, v);
                }
            }
        }
    }
}
