use clap::Parser;
use console::style;
use lockstep::commands::{lock, sync};
use lockstep::config::{Cli, Command, OutputFormat};
use lockstep::ui::{render_human, render_json};
use lockstep::{Config, Mode};
use std::process::ExitCode;

/// Exit status for configuration and startup failures
const EXIT_FATAL: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = lockstep::logging::init(cli.verbose) {
        eprintln!("warning: logging disabled: {}", e);
    }

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<u8> {
    // Convert CLI args to Config - this validates immediately
    let config = Config::try_from(cli)?;

    match &cli.command {
        Command::Check => report(&config, Mode::Check),
        Command::Fix => report(&config, Mode::Fix),
        Command::Get { key } => match lock::get(&config, key)? {
            Some(value) => {
                print!("{}", value);
                if !value.ends_with('\n') {
                    println!();
                }
                Ok(0)
            }
            None => {
                eprintln!("{} unknown lock key '{}'", style("error:").red().bold(), key);
                Ok(EXIT_FATAL)
            }
        },
        Command::List => {
            let table = lock::load_lock_table(&config)?;
            print!("{}", lock::format_list(&table));
            Ok(0)
        }
    }
}

fn report(config: &Config, mode: Mode) -> anyhow::Result<u8> {
    let report = sync::run(config, mode)?;

    match config.format {
        OutputFormat::Human => print!("{}", render_human(&report)),
        OutputFormat::Json => println!("{}", render_json(&report)?),
    }

    Ok(report.exit_code())
}
