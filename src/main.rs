//! objexec command line driver

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use objexec::{LoadPlan, LoadedObject, ObjectReport, PlannedCall};

/// Load functions from a relocatable ELF64 object and call them natively.
#[derive(Parser, Debug)]
#[command(name = "objexec", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the ELF header, section table and symbol table.
    Inspect {
        /// Object file to describe
        object: PathBuf,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Load an object and call one function.
    Call {
        /// Object file to load
        object: PathBuf,
        /// Function symbol name
        symbol: String,
        /// Signature such as `i32(i32)` or `i64(i64, i64)`
        signature: String,
        /// Integer arguments
        #[arg(allow_negative_numbers = true)]
        args: Vec<i64>,
        /// Call repeatedly, feeding the result back as the first argument
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },

    /// Run every call listed in a JSON plan file.
    Run {
        /// Plan file
        plan: PathBuf,
        /// Emit JSON outcomes
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("objexec: {:#}", e);
            let code = e
                .downcast_ref::<objexec::Error>()
                .map_or(1, objexec::Error::exit_code);
            ExitCode::from(code.clamp(1, 255) as u8)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Inspect { object, json } => {
            let report = ObjectReport::from_path(&object)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Call {
            object,
            symbol,
            signature,
            args,
            repeat,
        } => {
            let call = PlannedCall {
                symbol,
                signature,
                args,
                repeat,
                expect: None,
            };
            let plan = LoadPlan {
                object,
                calls: vec![call],
            };
            plan.validate()?;
            let loaded = LoadedObject::load(&plan.object)?;
            // SAFETY: the user asserts the signature on the command line.
            let outcome = unsafe { objexec::plan::run_call(&loaded, &plan.calls[0])? };
            println!("{}", outcome.display);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { plan, json } => {
            let plan = LoadPlan::from_file(&plan)
                .with_context(|| format!("loading plan {}", plan.display()))?;
            // SAFETY: signatures are asserted by the plan author.
            let outcomes = unsafe { objexec::plan::run_plan(&plan)? };

            if json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else {
                for o in &outcomes {
                    let status = match o.matched {
                        Some(true) => " ok",
                        Some(false) => " MISMATCH",
                        None => "",
                    };
                    println!("{} {} = {}{}", o.symbol, o.signature, o.display, status);
                }
            }

            if outcomes.iter().any(|o| o.matched == Some(false)) {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}
