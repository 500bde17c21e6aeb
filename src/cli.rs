//! Command-line interface implementation for Scaffold.
//! Provides argument parsing and help text formatting using clap.

use clap::{error::ErrorKind, CommandFactory, Parser};
use std::path::PathBuf;

use crate::config::{parse_assignment, OutputConfig};
use crate::serializer::OutputFormat;

/// Command-line arguments structure for Scaffold.
#[derive(Parser, Debug)]
#[command(author, version, about = "Scaffold: directive-driven markup templating", long_about = None)]
pub struct Args {
    /// Template file, or literal markup
    #[arg(value_name = "TEMPLATE")]
    pub template: String,

    /// File to write the rendered output to (stdout when omitted)
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// JSON or YAML file with placeholder values
    #[arg(long, value_name = "FILE")]
    pub vars: Option<PathBuf>,

    /// Placeholder value as key=value; repeatable, wins over --vars
    #[arg(short, long = "set", value_name = "KEY=VALUE", value_parser = parse_set)]
    pub set: Vec<(String, String)>,

    /// Keep whitespace runs in all text
    #[arg(long)]
    pub preserve_whitespace: bool,

    /// Keep comments in the output
    #[arg(long)]
    pub preserve_comments: bool,

    /// Output format, detected from the document when omitted
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            preserve_whitespace: self.preserve_whitespace,
            preserve_comments: self.preserve_comments,
            format: self.format,
        }
    }
}

fn parse_set(value: &str) -> Result<(String, String), String> {
    parse_assignment(value).map_err(|e| e.to_string())
}

/// Parses command line arguments and returns the Args structure.
///
/// # Exits
/// * With status code 1 if required arguments are missing
/// * With clap's default error handling for other argument errors
pub fn get_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if e.kind() == ErrorKind::MissingRequiredArgument {
                let _ = Args::command()
                    .help_template(
                        r#"{about-section}
{usage-heading} {usage}

{all-args}
{after-help}
"#,
                    )
                    .print_help();
                std::process::exit(1);
            } else {
                e.exit();
            }
        }
    }
}
