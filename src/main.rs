use clap::{CommandFactory, Parser};
use datetidy::cli::{Command, run_cli};
use datetidy::config::AppConfig;
use datetidy::output::OutputFormatter;
use std::path::PathBuf;
use std::process;

/// Copy files into a date-structured layout, then find and clean up
/// duplicate copies.
///
/// Stages run in the order analyze, copy, find, clean when several are
/// given.
#[derive(Debug, Parser)]
#[command(name = "datetidy", version, about)]
struct Args {
    /// Count source files by extension and write the analysis report
    #[arg(long)]
    analyze: bool,

    /// Copy source files into the target folder pattern
    #[arg(long)]
    copy: bool,

    /// Scan the target folder and write the duplicates report
    #[arg(long)]
    find_duplicates: bool,

    /// Delete the files marked DELETE in the duplicates report
    #[arg(long)]
    clean_duplicates: bool,

    /// Preview --copy or --clean-duplicates without changing any file
    #[arg(long)]
    dry_run: bool,

    /// Duplicates report to write or read instead of the configured one
    #[arg(long, value_name = "PATH")]
    duplicates_log: Option<PathBuf>,

    /// Configuration file (defaults to .datetidyrc.toml, then
    /// ~/.config/datetidy/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Args {
    fn commands(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.analyze {
            commands.push(Command::Analyze);
        }
        if self.copy {
            commands.push(Command::Copy {
                dry_run: self.dry_run,
            });
        }
        if self.find_duplicates {
            commands.push(Command::FindDuplicates);
        }
        if self.clean_duplicates {
            commands.push(Command::CleanDuplicates {
                dry_run: self.dry_run,
            });
        }
        commands
    }
}

fn main() {
    let args = Args::parse();

    let commands = args.commands();
    if commands.is_empty() {
        // Nothing selected: show usage instead of silently succeeding.
        if let Err(e) = Args::command().print_help() {
            OutputFormatter::error(&format!("Could not print help: {}", e));
            process::exit(1);
        }
        println!();
        return;
    }

    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            OutputFormatter::error(&format!("Error loading configuration: {}", e));
            process::exit(1);
        }
    };

    for command in commands {
        if let Err(e) = run_cli(command, &config, args.duplicates_log.as_deref()) {
            OutputFormatter::error(&format!("Error: {}", e));
            process::exit(1);
        }
    }
}
