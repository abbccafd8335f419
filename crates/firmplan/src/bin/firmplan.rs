use anyhow::Result;
use clap::Parser;
use firmplan::tools::{load_tools_def, parse_option, render, resolve};
use indexmap::IndexMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Firmware build metadata inspection
#[derive(Parser)]
#[clap(version = "0.1")]
struct Opts {
    /// Raise log verbosity (-v debug, -vv trace)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    Tools(Tools),
}

/// Show the tool definition, and optionally arbitrated build options, for one build context
#[derive(Parser)]
struct Tools {
    #[clap(long)]
    tools_def: PathBuf,
    #[clap(long, default_value = "DEBUG")]
    target: String,
    #[clap(long)]
    toolchain: String,
    #[clap(long, default_value = "X64")]
    arch: String,
    /// FAMILY:TARGET_TOOLCHAIN_ARCH_TOOL_ATTRIBUTE=VALUE, repeatable
    #[clap(long = "option")]
    options: Vec<String>,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    init_logging(opts.verbose);

    match opts.subcmd {
        SubCommand::Tools(tools) => {
            let tools_def = load_tools_def(&tools.tools_def)?;
            let mut options = IndexMap::new();
            for option in &tools.options {
                let (key, value) = parse_option(option)?;
                options.insert(key, value);
            }
            let report = resolve(&tools_def, &tools.target, &tools.toolchain, &tools.arch, &options)?;
            print!("{}", render(&report));
        }
    }
    Ok(())
}
