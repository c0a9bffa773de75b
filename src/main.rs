use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

mod artifacts;
mod cli;
mod config;
mod core;
mod launcher;
mod logging;
mod pipeline;

use cli::{Cli, Command};
use config::PipelineConfig;
use launcher::SystemRunner;
use pipeline::Pipeline;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::setup_logging(&cli.log_dir)
        .with_context(|| format!("failed to set up logging in {}", cli.log_dir.display()))?;

    info!("Starting leaf detection pipeline");

    let config_path = cli.config.clone().unwrap_or_else(PipelineConfig::default_path);
    if let Command::InitConfig { force } = &cli.command {
        PipelineConfig::init(&config_path, *force)?;
        println!("{}", config_path.display());
        return Ok(());
    }

    let mut config = PipelineConfig::load(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    apply_overrides(&cli.command, &mut config);
    let pipeline = Pipeline::new(&config).context("invalid configuration")?;
    let mut runner = SystemRunner;

    match &cli.command {
        Command::InitConfig { .. } => {}
        Command::Unpack(_) => {
            let summary = pipeline.unpack().context("unpack")?;
            info!("Extracted {} files", summary.files);
        }
        Command::Split(_) => {
            let report = pipeline.split().context("split")?;
            if !report.is_clean() {
                warn!(
                    "Split finished with {} missing annotations and {} failed moves",
                    report.missing_labels.len(),
                    report.failures.len()
                );
            }
        }
        Command::WriteDataConfig(_) => {
            let path = pipeline.write_data_config().context("write data config")?;
            println!("{}", path.display());
        }
        Command::Setup(_) => {
            pipeline.setup(&mut runner).context("framework setup")?;
        }
        Command::Train(_) => {
            let run_dir = pipeline.train(&mut runner).context("training")?;
            println!("{}", run_dir.display());
        }
        Command::Detect(_) => {
            let run_dir = pipeline.detect(&mut runner, None).context("detection")?;
            println!("{}", run_dir.display());
        }
        Command::Collect(args) => {
            let report = pipeline
                .collect(
                    args.train_run.as_deref(),
                    args.detect_run.as_deref(),
                    args.allow_missing,
                )
                .context("collect artifacts")?;
            println!(
                "copied {} artifacts to {} ({} missing)",
                report.copied.len(),
                config.export_dir.display(),
                report.missing.len()
            );
        }
        Command::Stats(_) => print_stats(&pipeline),
        Command::Run(args) => {
            let summary = pipeline
                .run(&mut runner, args.steps(), args.allow_missing)
                .context("pipeline run")?;
            if let Some(run) = &summary.train_run {
                println!("train run: {}", run.display());
            }
            if let Some(run) = &summary.detect_run {
                println!("detect run: {}", run.display());
            }
        }
    }

    Ok(())
}

fn apply_overrides(command: &Command, config: &mut PipelineConfig) {
    match command {
        Command::InitConfig { .. } => {}
        Command::Unpack(args) => args.apply(config),
        Command::Split(args) => args.apply(config),
        Command::WriteDataConfig(args) => args.apply(config),
        Command::Setup(args) => args.apply(config),
        Command::Train(args) => args.apply(config),
        Command::Detect(args) => args.apply(config),
        Command::Collect(args) => args.apply(config),
        Command::Stats(args) => args.apply(config),
        Command::Run(args) => args.apply(config),
    }
}

fn print_stats(pipeline: &Pipeline<'_>) {
    for stats in pipeline.stats() {
        println!(
            "{}: {} images, {} labels",
            stats.split.as_str(),
            stats.counts.images,
            stats.counts.labels
        );
        for (class, count) in &stats.class_objects {
            println!("  {:<12} {}", class, count);
        }
        if stats.malformed_lines > 0 {
            println!("  malformed label lines: {}", stats.malformed_lines);
        }
        for issue in stats
            .integrity
            .images_without_labels
            .iter()
            .chain(&stats.integrity.labels_without_images)
        {
            println!("  {:?}: {}", issue.issue_type, issue.path.display());
        }
    }
}
