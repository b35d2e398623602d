use std::path::Path;

use anyhow::Result;
use revo_config::RevoConfig;
use revo_core::OutputFormat;

use crate::cli::ConfigCommands;

pub(crate) fn handle_config_command(
    command: ConfigCommands,
    config: &RevoConfig,
    path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    match command {
        ConfigCommands::Show => match format {
            OutputFormat::Json => {
                let mut shown = config.clone();
                shown.llm = shown.llm.redacted_for_display();
                println!("{}", serde_json::to_string_pretty(&shown)?);
                Ok(())
            }
            OutputFormat::Text => {
                print!("{}", config.to_display_toml()?);
                Ok(())
            }
        },
        ConfigCommands::Validate => {
            // Loading already validated; report where the values came from.
            match path {
                Some(path) => eprintln!("Configuration is valid: {}", path.display()),
                None => eprintln!("Configuration is valid"),
            }
            Ok(())
        }
    }
}
