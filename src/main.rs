use anyhow::Result;
use clap::Parser;
use class_recover::cli::{Cli, OutputFormat};
use class_recover::error::Error;
use class_recover::report::{
    CollectingReporter, TextReporter, render_introspection, render_summary,
};
use class_recover::{config, pipeline};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[class-recover] {e:#}");
            let code = e.downcast_ref::<Error>().map_or(1, Error::exit_code);
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = config::resolve(cli)?;

    let report = match cli.format {
        OutputFormat::Text => {
            let report = pipeline::run(&config, &mut TextReporter)?;
            if let Some(introspection) = &report.introspection {
                println!();
                print!("{}", render_introspection(introspection));
            }
            println!("{}", render_summary(&report));
            report
        }
        OutputFormat::Json => {
            let mut collector = CollectingReporter::default();
            let mut report = pipeline::run(&config, &mut collector)?;
            report.files = collector.files;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report
        }
    };

    match pipeline::check(&report) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("[class-recover] {e}");
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}
