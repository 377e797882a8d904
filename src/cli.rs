use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tb_core::config::BenchConfig;

#[derive(Parser)]
#[command(name = "transcode-bench")]
#[command(author, version, about = "Concurrent ffmpeg transcode throughput benchmark")]
pub struct Cli {
    /// Path to JSON config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the batch-size sweep against one source file
    Run(RunArgs),

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the encode plan and ffmpeg arguments for a file
    Plan {
        /// Source file to plan for
        #[arg(required = true)]
        file: PathBuf,

        /// Plan for GPU acceleration
        #[arg(long)]
        gpu: bool,

        /// Output the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,
}

/// Flags of `run`; each one overrides the matching config value.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Source file every job transcodes
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory receiving the outputs
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Output file name prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Use GPU acceleration (NVIDIA or Apple Silicon)
    #[arg(long)]
    pub gpu: bool,

    /// Comma-separated batch sizes, e.g. 2,5,8
    #[arg(long, value_delimiter = ',')]
    pub batch_sizes: Option<Vec<usize>>,

    /// Maximum jobs running at once (0 = number of CPUs)
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Per-encode timeout in seconds
    #[arg(long)]
    pub job_timeout: Option<u64>,

    /// Print the reports as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Apply the flags that were given on top of `bench`.
    pub fn apply(&self, bench: &mut BenchConfig) {
        if let Some(ref input) = self.input {
            bench.input = input.clone();
        }
        if let Some(ref dir) = self.output_dir {
            bench.output_dir = dir.clone();
        }
        if let Some(ref prefix) = self.prefix {
            bench.output_prefix = prefix.clone();
        }
        if self.gpu {
            bench.hw_accel = true;
        }
        if let Some(ref sizes) = self.batch_sizes {
            bench.batch_sizes = sizes.clone();
        }
        if let Some(n) = self.max_concurrency {
            bench.max_concurrency = n;
        }
        if let Some(secs) = self.job_timeout {
            bench.job_timeout_secs = Some(secs);
        }
    }
}
