//! manuscript-pdf CLI: typeset manuscript artifacts into interior PDFs.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use manuscript_pdf::job::{DirectoryStore, Job, JobConfig};

#[derive(Parser)]
#[command(name = "manuscript-pdf")]
#[command(version)]
#[command(about = "Typeset manuscript artifacts into print-ready interior PDFs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Typeset a manuscript file into a PDF
    Convert {
        /// Manuscript artifact (JSON)
        #[arg(value_name = "MANUSCRIPT")]
        input: PathBuf,

        /// Output PDF file
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Book Metadata fields (JSON object)
        #[arg(short, long, value_name = "FILE")]
        metadata: Option<PathBuf>,

        /// Directories to search for the body typeface
        #[arg(long, value_name = "DIR", env = "MANUSCRIPT_PDF_FONTS", value_delimiter = ',')]
        fonts: Vec<PathBuf>,
    },

    /// Process one job from a directory store
    Run {
        /// Job identifier (a directory under the store root)
        #[arg(value_name = "JOB_ID")]
        job_id: String,

        /// Store root directory
        #[arg(long, value_name = "DIR", env = "MANUSCRIPT_PDF_STORE")]
        store: PathBuf,

        /// Base URL artifacts are published under
        #[arg(long, value_name = "URL", env = "MANUSCRIPT_PDF_PUBLIC_URL")]
        public_url: Option<String>,

        /// Directories to search for the body typeface
        #[arg(long, value_name = "DIR", env = "MANUSCRIPT_PDF_FONTS", value_delimiter = ',')]
        fonts: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Convert {
            input,
            output,
            metadata,
            fonts,
        } => manuscript_pdf::format_interior_file(&input, metadata.as_deref(), &output, &fonts)
            .map(|interior| {
                println!(
                    "Wrote {} ({} pages)",
                    output.display(),
                    interior.page_count
                );
                for note in &interior.degradations {
                    println!("  degraded: {note}");
                }
            }),
        Commands::Run {
            job_id,
            store,
            public_url,
            fonts,
        } => {
            let config = JobConfig {
                public_base_url: public_url,
                font_dirs: fonts,
                ..JobConfig::default()
            };
            let store = DirectoryStore::new(store, config.public_base_url.clone());
            Job::new(&store, &store, config)
                .run(&job_id)
                .map(|outcome| {
                    println!("{} ({} pages)", outcome.artifact.url, outcome.page_count);
                })
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
