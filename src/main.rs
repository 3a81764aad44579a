use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fetal_scan::{
    analysis::RecordExporter, config::Config, web::serve, InferenceContext, ScanPipeline,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fetal-scan")]
#[command(about = "Fetal ultrasound plane detection with quality and pathology scoring")]
struct Args {
    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Model directory path
    #[arg(long, global = true, default_value = "models")]
    models_dir: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP analysis service
    Serve {
        /// Server bind address
        #[arg(long, default_value = "0.0.0.0:5005")]
        bind: String,

        /// Number of worker threads
        #[arg(long)]
        workers: Option<usize>,

        /// Enable development mode
        #[arg(long)]
        dev: bool,
    },
    /// Analyze image files and print the records
    Analyze {
        /// Images to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Organization id written into annotations
        #[arg(long)]
        org_id: Option<String>,

        /// Override the detector confidence threshold
        #[arg(long)]
        confidence: Option<f32>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
    Annotations,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Serve { bind, workers, dev } => {
            tracing::info!("Starting fetal scan service...");
            tracing::info!("Bind address: {}", bind);
            tracing::info!("Models directory: {}", args.models_dir);

            let config = Config::new(bind, args.models_dir, workers, dev)?;
            tracing::info!("Worker threads: {}", config.workers);

            let runtime = config.build_runtime()?;
            runtime.block_on(serve(config))?;
        }
        Command::Analyze {
            files,
            format,
            org_id,
            confidence,
        } => {
            let mut config = Config::new(String::new(), args.models_dir, None, false)?;
            if let Some(threshold) = confidence {
                config.pipeline_config.confidence_threshold = threshold;
            }

            let output = analyze_files(&config, &files, format, org_id.as_deref())?;
            println!("{}", output);
        }
    }

    Ok(())
}

fn analyze_files(config: &Config, files: &[PathBuf], format: OutputFormat, org_id: Option<&str>) -> Result<String> {
    let context = Arc::new(InferenceContext::load(config)?);
    let pipeline = ScanPipeline::new(context, config.pipeline_config.clone());

    let mut records = Vec::with_capacity(files.len());
    for path in files {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let record = pipeline
            .process(&bytes, &name)
            .with_context(|| format!("Failed to analyze {}", path.display()))?;
        records.push(record);
    }

    let output = match format {
        OutputFormat::Json => RecordExporter::to_json(&records)?,
        OutputFormat::Csv => RecordExporter::to_csv(&records),
        OutputFormat::Annotations => RecordExporter::to_annotations_json(&records, org_id)?,
    };
    Ok(output)
}
