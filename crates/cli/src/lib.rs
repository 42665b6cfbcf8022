pub mod commands;
pub mod util;

use clap::{Parser, Subcommand, ValueEnum};
use commands::{parse, query};
use std::io::Write;
use thicket_xpath::XPathVersion;
use tracing_subscriber::EnvFilter;
use util::CliResult;

#[derive(Parser, Debug)]
#[command(name = "thicket", version, about = "Evaluate XPath 1.0-3.1 expressions against XML documents")]
pub struct Cli {
    /// Increase log output (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate an expression and print the resulting items.
    Query(query::QueryArgs),
    /// Parse an expression and print its token tree.
    Parse(parse::ParseArgs),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum VersionArg {
    #[value(name = "1.0")]
    V1,
    #[value(name = "2.0")]
    V2,
    #[value(name = "3.0")]
    V3,
    #[default]
    #[value(name = "3.1")]
    V31,
}

impl From<VersionArg> for XPathVersion {
    fn from(value: VersionArg) -> Self {
        match value {
            VersionArg::V1 => XPathVersion::V1_0,
            VersionArg::V2 => XPathVersion::V2_0,
            VersionArg::V3 => XPathVersion::V3_0,
            VersionArg::V31 => XPathVersion::V3_1,
        }
    }
}

pub fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = execute(&cli.command)?;
    let mut stdout = std::io::stdout().lock();
    if !output.is_empty() {
        writeln!(stdout, "{output}")?;
    }
    Ok(())
}

pub fn execute(command: &Commands) -> CliResult<String> {
    match command {
        Commands::Query(args) => query::run(args),
        Commands::Parse(args) => parse::run(args),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // a second init (tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn versions_parse_from_dotted_names() {
        let cli = Cli::try_parse_from(["thicket", "parse", "--xpath-version", "2.0", "1 + 1"]).expect("args");
        let Commands::Parse(args) = cli.command else { panic!("parse command expected") };
        assert_eq!(XPathVersion::from(args.version), XPathVersion::V2_0);
    }
}
