use anyhow::Result;
use clap::Parser;
use revo_config::RevoConfig;

mod agent_cmd;
mod cli;
mod config_cmds;
mod coordinate_cmd;
mod creative_cmd;
mod logging;
mod memory_cmd;
mod output;
mod workflow_cmd;

use cli::{Cli, Commands};
use coordinate_cmd::CoordinateArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output_format = cli.format.clone();

    let config = match RevoConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            logging::init(None);
            return Err(err);
        }
    };
    // Keeps the file writer alive until exit.
    let _log_guard = logging::init(config.logging.dir.as_deref());
    tracing::debug!(config = ?cli.config, "configuration loaded");

    match cli.command {
        Commands::Memory { cmd } => {
            memory_cmd::handle_memory_command(cmd, &config, output_format).await?;
        }
        Commands::Workflow { cmd } => {
            workflow_cmd::handle_workflow_command(cmd, &config, output_format).await?;
        }
        Commands::Creative { cmd } => {
            creative_cmd::handle_creative_command(cmd, &config, output_format)?;
        }
        Commands::Coordinate {
            description,
            task_type,
            complexity,
            strategy,
            domain,
        } => {
            let args = CoordinateArgs {
                description,
                task_type,
                complexity,
                strategy,
                domain,
            };
            coordinate_cmd::handle_coordinate(args, &config, output_format).await?;
        }
        Commands::Status => {
            coordinate_cmd::handle_status(&config, output_format)?;
        }
        Commands::Agent { cmd } => {
            agent_cmd::handle_agent_command(cmd, &config, output_format).await?;
        }
        Commands::Config { cmd } => {
            config_cmds::handle_config_command(cmd, &config, cli.config.as_deref(), output_format)?;
        }
    }

    Ok(())
}
