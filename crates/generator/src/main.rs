//! qaforge CLI
//!
//! Builds question-answering evaluation datasets from a chunked vector store.
//!
//! # Usage
//!
//! ```bash
//! # List document sources in the store
//! qaforge sources
//!
//! # Generate from the training partition, checkpointing to a file
//! qaforge generate --split train --output data/train.json
//!
//! # Resume single stages from a checkpoint
//! qaforge evolve --input data/train.json --steps reasoning_evolution
//! qaforge answer --input data/train.json
//!
//! # Export for an evaluation harness
//! qaforge export --input data/train.json --output data/train.jsonl --format deep-eval
//! ```

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use qaforge_common::{
    config::AppConfig,
    dataset::{
        export::{self, ExportFormat},
        Dataset,
    },
    errors::AppError,
    llm::create_model,
    metrics::{self, LLM_LATENCY_BUCKETS, METRICS_PREFIX},
    source::create_source,
    synthesis::{all_chunks, split_sources, AnswerSynthesizer, DatasetGenerator, QueryEvolver, SplitName},
    VERSION,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "qaforge", version, about)]
struct Cli {
    /// Configuration file; defaults to config/default, config/{APP_ENV}, config/local
    #[arg(short, long, global = true, env = "QAFORGE_CONFIG")]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List source identifiers in the chunk store
    Sources,

    /// Run the generation pipeline
    Generate {
        /// Partition of the source-level split to draw chunks from
        #[arg(long, value_enum, default_value_t = SplitArg::All)]
        split: SplitArg,

        /// Checkpoint file; overrides generation.checkpoint_path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of questions (contexts in multi-context mode)
        #[arg(short = 'n', long)]
        number_of_questions: Option<usize>,

        /// Build multi-chunk contexts
        #[arg(long)]
        multi_context: bool,

        /// Run the evolution stage
        #[arg(long)]
        evolve: bool,

        /// Skip answer generation
        #[arg(long)]
        no_answers: bool,
    },

    /// Evolve every query of a checkpoint; run `answer` afterwards
    Evolve {
        #[arg(short, long)]
        input: PathBuf,

        /// Defaults to overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Comma-separated strategy names; defaults to generation.evolve_steps
        #[arg(long, value_delimiter = ',')]
        steps: Vec<String>,
    },

    /// Generate reference answers for a checkpoint
    Answer {
        #[arg(short, long)]
        input: PathBuf,

        /// Defaults to overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export a checkpoint as JSON Lines
    Export {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, value_enum, default_value_t = FormatArg::Plain)]
        format: FormatArg,
    },

    /// Report provenance violations in a checkpoint
    Validate {
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SplitArg {
    All,
    Train,
    Validation,
    Test,
}

impl SplitArg {
    fn partition(self) -> Option<SplitName> {
        match self {
            SplitArg::All => None,
            SplitArg::Train => Some(SplitName::Train),
            SplitArg::Validation => Some(SplitName::Validation),
            SplitArg::Test => Some(SplitName::Test),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FormatArg {
    Plain,
    DeepEval,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Plain => ExportFormat::Plain,
            FormatArg::DeepEval => ExportFormat::DeepEval,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "qaforge failed");
            eprintln!("error: {:#}", e);
            let code = e
                .downcast_ref::<AppError>()
                .map(AppError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("failed to load configuration")?;

    init_tracing(&config, cli.verbose);
    info!(service = %config.observability.service_name, "Starting qaforge v{}", VERSION);

    if config.observability.metrics_port != 0 {
        init_metrics(config.observability.metrics_port)?;
    }

    config.validate()?;

    match cli.command {
        Command::Sources => {
            let source = create_source(&config.source).await?;
            for name in source.list_sources().await? {
                println!("{}", name);
            }
        }

        Command::Generate {
            split,
            output,
            number_of_questions,
            multi_context,
            evolve,
            no_answers,
        } => {
            let mut generation = config.generation.clone();
            if let Some(path) = output {
                generation.checkpoint_path = Some(path);
            }
            if let Some(n) = number_of_questions {
                generation.number_of_questions = n;
            }
            generation.multi_context |= multi_context;
            generation.evolve_queries |= evolve;
            if no_answers {
                generation.generate_answers = false;
            }

            let source = create_source(&config.source).await?;
            let model = create_model(&config.llm)?;

            let (chunks, sources) = match split.partition() {
                None => (all_chunks(source.as_ref()).await?, None),
                Some(name) => {
                    let partition = split_sources(source.as_ref(), &generation.split_ratio, generation.seed)
                        .await?
                        .take(name);
                    (partition.chunks, Some(partition.sources))
                }
            };
            info!(split = ?split, chunks = chunks.len(), "Chunk pool ready");

            let checkpoint = generation.checkpoint_path.clone();
            let generator = DatasetGenerator::new(generation, source, model)?;
            let dataset = generator.generate(chunks, sources).await?;

            match checkpoint {
                Some(path) => info!(path = %path.display(), queries = dataset.len(), "Dataset written"),
                None => println!("{}", serde_json::to_string_pretty(&dataset)?),
            }
        }

        Command::Evolve { input, output, steps } => {
            let steps = if steps.is_empty() {
                config.generation.evolve_steps.clone()
            } else {
                steps
            };
            let mut dataset = Dataset::load_json(&input).await?;
            let model = create_model(&config.llm)?;

            let added = QueryEvolver::new(model).evolve(&mut dataset, &steps).await?;

            let target = output.unwrap_or(input);
            dataset.save_json(&target).await?;
            info!(added, path = %target.display(), "Evolved dataset written");
        }

        Command::Answer { input, output } => {
            let mut dataset = Dataset::load_json(&input).await?;
            let model = create_model(&config.llm)?;

            let answered = AnswerSynthesizer::new(model).answer_all(&mut dataset).await?;

            let target = output.unwrap_or(input);
            dataset.save_json(&target).await?;
            info!(answered, path = %target.display(), "Answered dataset written");
        }

        Command::Export { input, output, format } => {
            let dataset = Dataset::load_json(&input).await?;
            let rows = export::to_rows(&dataset, format.into())?;
            let written = export::write_jsonl(&rows, &output).await?;
            info!(rows = written, path = %output.display(), "Export complete");
        }

        Command::Validate { input } => {
            let dataset = Dataset::load_json(&input).await?;
            let violations = dataset.validate();
            for violation in &violations {
                println!("{}", violation);
            }
            if !violations.is_empty() {
                return Err(AppError::Validation {
                    message: format!("{} provenance violation(s) in {}", violations.len(), input.display()),
                    field: None,
                }
                .into());
            }
            println!("ok: {} queries, {} chunks", dataset.len(), dataset.corpus.len());
        }
    }

    Ok(())
}

/// Logs go to stderr so dataset output on stdout stays machine-readable
fn init_tracing(config: &AppConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_llm_duration_seconds", METRICS_PREFIX)),
            LLM_LATENCY_BUCKETS,
        )?
        .install()
        .context("failed to install Prometheus exporter")?;

    metrics::register_metrics();
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_arguments() {
        let cli = Cli::try_parse_from([
            "qaforge", "generate", "--split", "validation", "-n", "5", "--multi-context", "--output", "out.json",
        ])
        .unwrap();
        match cli.command {
            Command::Generate {
                split,
                number_of_questions,
                multi_context,
                output,
                ..
            } => {
                assert_eq!(split, SplitArg::Validation);
                assert_eq!(split.partition(), Some(SplitName::Validation));
                assert_eq!(number_of_questions, Some(5));
                assert!(multi_context);
                assert_eq!(output, Some(PathBuf::from("out.json")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_evolve_steps_are_comma_separated() {
        let cli = Cli::try_parse_from([
            "qaforge", "evolve", "--input", "d.json", "--steps", "reasoning_evolution,in_breadth_evolution",
        ])
        .unwrap();
        match cli.command {
            Command::Evolve { steps, output, .. } => {
                assert_eq!(steps, vec!["reasoning_evolution", "in_breadth_evolution"]);
                assert!(output.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_export_format_names() {
        let cli = Cli::try_parse_from([
            "qaforge", "export", "-i", "d.json", "-o", "d.jsonl", "--format", "deep-eval",
        ])
        .unwrap();
        match cli.command {
            Command::Export { format, .. } => {
                assert_eq!(ExportFormat::from(format), ExportFormat::DeepEval);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_split_defaults_to_all() {
        let cli = Cli::try_parse_from(["qaforge", "generate"]).unwrap();
        match cli.command {
            Command::Generate { split, .. } => assert_eq!(split.partition(), None),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
