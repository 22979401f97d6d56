//! Config command - configuration management.

use anyhow::Result;
use clap::{Args, Subcommand};

use inkstream_config::{InkstreamConfig, save_config};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./inkstream.toml) instead of user config
        #[arg(long)]
        local: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the user config file path
    Path,
}

pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local, force } => cmd_init(ctx, local, force),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let effective = ctx.config().effective();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&effective)?);
    } else {
        print!("{}", effective.to_toml()?);
    }
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    println!("Config file search order (later overrides earlier):\n");

    for source in &ctx.loaded.sources {
        let status = if source.loaded { "✓ loaded" } else { "· not found" };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = ctx.loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'inkstream config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }
    Ok(())
}

fn cmd_init(ctx: &Context, local: bool, force: bool) -> Result<()> {
    let path = if local {
        std::path::PathBuf::from("inkstream.toml")
    } else {
        user_config_path(ctx)?
    };

    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    save_config(&InkstreamConfig::new().effective(), &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    println!("{}", user_config_path(ctx)?.display());
    Ok(())
}

/// The user layer. Discovery checks it first, honoring `--config-dir`.
fn user_config_path(ctx: &Context) -> Result<std::path::PathBuf> {
    if ctx.loaded.sources.len() > 1 {
        return Ok(ctx.loaded.sources[0].path.clone());
    }
    inkstream_config::user_config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}
