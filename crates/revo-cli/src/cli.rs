use std::path::PathBuf;

use clap::{Parser, Subcommand};
use revo_core::{CoordinationStrategy, OutputFormat, TaskComplexity};
use revo_parallel::DecompositionCategory;

#[derive(Parser)]
#[command(name = "revo")]
#[command(about = "reVoAgent: memory, parallel workflows and creative engines")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.config/revo-agent/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store and recall Perfect Recall memories
    Memory {
        #[command(subcommand)]
        cmd: MemoryCommands,
    },

    /// Run decomposed workflows on the Parallel Mind pools
    Workflow {
        #[command(subcommand)]
        cmd: WorkflowCommands,
    },

    /// Generate and evolve solutions with the creative engine
    Creative {
        #[command(subcommand)]
        cmd: CreativeCommands,
    },

    /// Route a request across all engines
    Coordinate {
        description: String,

        /// Free-form task kind used for adaptive routing
        #[arg(long, default_value = "research")]
        task_type: String,

        #[arg(long, value_enum, default_value = "moderate")]
        complexity: TaskComplexity,

        /// Overrides [coordinator] default_strategy
        #[arg(long, value_enum)]
        strategy: Option<CoordinationStrategy>,

        /// Domain hint for the creative engine
        #[arg(long)]
        domain: Option<String>,
    },

    /// Per-engine statistics
    Status,

    /// Ask a specialised agent
    Agent {
        #[command(subcommand)]
        cmd: AgentCommands,
    },

    /// Show/validate configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// Store a new memory
    Store {
        content: String,

        /// Content type label (code, note, error, ...)
        #[arg(long = "type", default_value = "text")]
        content_type: String,

        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,

        /// Success score in [0, 1]
        #[arg(long, default_value_t = 0.5)]
        score: f32,
    },

    /// Recall memories similar to a query
    Recall {
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Overrides [recall] similarity_threshold
        #[arg(long)]
        min_similarity: Option<f32>,

        /// Only these content types (repeatable)
        #[arg(long = "type")]
        content_types: Vec<String>,

        /// Entry must carry one of these tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// List memories, newest first
    List {
        #[arg(long = "type")]
        content_type: Option<String>,

        #[arg(long)]
        tag: Option<String>,

        /// Only entries created on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Case-insensitive regex over content
        #[arg(long)]
        pattern: Option<String>,
    },

    /// Show one memory (ULID or unique prefix)
    Show { id: String },

    /// Delete one memory
    Delete { id: String },

    /// Record how useful a memory turned out to be
    Rate {
        id: String,
        /// New success score in [0, 1]
        score: f32,
    },

    /// Store statistics
    Stats,
}

#[derive(Subcommand)]
pub enum WorkflowCommands {
    /// Decompose a description into steps and run them
    Run {
        description: String,

        /// Template family; inferred from the description when omitted
        #[arg(long, value_enum)]
        category: Option<DecompositionCategory>,

        /// Seconds before unfinished steps are cancelled
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the step graph as Mermaid instead of running it
        #[arg(long)]
        plan: bool,
    },
}

#[derive(Subcommand)]
pub enum CreativeCommands {
    /// Combine the best-matching patterns into a solution
    Generate {
        problem: String,

        #[arg(long)]
        domain: Option<String>,

        /// Constraint the solution must respect (repeatable)
        #[arg(long = "constraint")]
        constraints: Vec<String>,
    },

    /// Evolve a solution with the genetic search
    Evolve {
        problem: String,

        #[arg(long)]
        generations: Option<usize>,

        #[arg(long)]
        population: Option<usize>,

        #[arg(long)]
        mutation_rate: Option<f64>,

        /// Fixed seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        domain: Option<String>,
    },

    /// Render a solution from explicit pattern ids
    Combine {
        problem: String,

        /// Comma-separated pattern ids
        #[arg(long, value_delimiter = ',', required = true)]
        patterns: Vec<String>,
    },

    /// List the pattern catalog
    Patterns,
}

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Review a source file
    Analyze {
        file: PathBuf,

        /// Language label; guessed from the file extension when omitted
        #[arg(long)]
        language: Option<String>,

        /// What the review should focus on
        #[arg(long, default_value = "General code review")]
        focus: String,
    },

    /// Diagnose an error message
    Debug {
        error: String,

        /// File containing the code that produced the error
        #[arg(long)]
        code: Option<PathBuf>,
    },

    /// Plan a workflow for a goal
    Workflow {
        description: String,

        #[arg(long, value_enum)]
        category: Option<DecompositionCategory>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration (API key masked)
    Show,
    /// Validate the configuration file
    Validate,
}
