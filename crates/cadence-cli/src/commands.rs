//! CLI command definitions.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Instantiate a pipeline run, or a single stage of it
    Plan {
        /// Path to the pipeline configuration
        #[arg(default_value = "pipeline.yaml")]
        pipeline: PathBuf,

        /// Agent pool to schedule against
        #[arg(short, long)]
        agents: Option<PathBuf>,

        /// Instantiate only this stage
        #[arg(short, long)]
        stage: Option<String>,

        /// User approving the run
        #[arg(short, long)]
        user: Option<String>,

        /// Build cause to trigger the pipeline with
        #[arg(long)]
        cause: Option<PathBuf>,
    },

    /// Rerun selected jobs of a completed stage
    Rerun {
        /// Stage to rerun, as printed by `plan` or a previous `rerun`
        stage_file: PathBuf,

        /// Path to the current pipeline configuration
        pipeline: PathBuf,

        /// Stage name in the pipeline configuration (defaults to the stage's own name)
        #[arg(short, long)]
        stage: Option<String>,

        /// Job or job instance to rerun
        #[arg(short, long = "job", required = true)]
        jobs: Vec<String>,

        /// Agent pool to schedule against
        #[arg(short, long)]
        agents: Option<PathBuf>,

        /// User approving the rerun
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Print the fingerprint of a pipeline configuration
    Fingerprint {
        /// Path to the pipeline configuration
        #[arg(default_value = "pipeline.yaml")]
        pipeline: PathBuf,
    },

    /// Print the JSON schema of the pipeline configuration format
    Schema,
}
