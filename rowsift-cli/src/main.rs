use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use rowsift_core::FilterPipeline;
use rowsift_infer::{CodeGenerator, HttpOpenAiGenerator, StaticCodeGenerator};
use rowsift_publish::ResultPublisher;
use rowsift_store::InMemoryTableStore;
use rowsift_types::FilterRequest;

#[derive(Parser)]
#[command(name = "rowsift")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// One-shot: filter a local CSV with a natural-language prompt and
    /// write the result next to it.
    Filter {
        /// Path to the CSV file
        #[arg(long)]
        file: String,
        /// Natural-language filter instruction
        #[arg(long)]
        prompt: String,
        /// Directory for the output artifact
        #[arg(long, default_value = "./out")]
        out_dir: String,
        /// Skip the model and keep every row (offline smoke runs)
        #[arg(long, default_value_t = false)]
        stub: bool,
    },
    /// Remove published artifacts older than the given age.
    Purge {
        #[arg(long, default_value = "./out")]
        out_dir: String,
        #[arg(long, default_value_t = 24)]
        max_age_hours: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    match cli.command {
        Command::Filter {
            file,
            prompt,
            out_dir,
            stub,
        } => {
            let generator: Arc<dyn CodeGenerator> = if stub {
                Arc::new(StaticCodeGenerator::match_all())
            } else {
                let api_key = std::env::var("ROWSIFT_LLM_API_KEY")
                    .or_else(|_| std::env::var("OPENAI_API_KEY"))
                    .ok();
                Arc::new(HttpOpenAiGenerator::new(
                    std::env::var("ROWSIFT_LLM_URL")
                        .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
                    std::env::var("ROWSIFT_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
                    api_key,
                    Duration::from_secs(30),
                ))
            };

            let pipeline = FilterPipeline::new(
                Arc::new(InMemoryTableStore::new()),
                generator,
                Arc::new(ResultPublisher::open(&out_dir)?),
            );

            let bytes = std::fs::read(&file)?;
            let upload = pipeline.upload(&file, &bytes).await?;
            println!(
                "Loaded {} rows, columns: {}",
                upload.total_rows,
                upload.columns.join(", ")
            );

            let report = pipeline
                .filter(&FilterRequest {
                    prompt,
                    file_id: Some(upload.file_id),
                })
                .await?;
            println!(
                "Filtered {} of {} rows -> {}/{}",
                report.filtered_count, report.total_count, out_dir, report.download
            );
            for record in &report.preview {
                println!("{}", serde_json::to_string(record)?);
            }
        }
        Command::Purge {
            out_dir,
            max_age_hours,
        } => {
            let publisher = ResultPublisher::open(&out_dir)?;
            let removed = publisher.purge(Duration::from_secs(max_age_hours * 3600))?;
            println!("removed {removed} artifact(s) from {out_dir}");
        }
    }

    Ok(())
}
