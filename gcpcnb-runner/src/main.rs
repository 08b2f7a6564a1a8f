//! Single entry point for the bundled buildpacks. The lifecycle scripts of each buildpack invoke
//! it as `runner -buildpack=<id> -phase=<detect|build> <paths...>`.

mod buildpacks;
mod cli;

use crate::cli::{normalize_args, Cli};
use clap::Parser;
use gcpcnb::config::{parse_bool, GOOGLE_DEBUG, X_GOOGLE_TARGET_PLATFORM};
use gcpcnb::exit_code::GENERIC_UNSPECIFIED_ERROR;
use gcpcnb::{dispatch, Env, Invocation};
use log::{debug, error};
use std::process;

// Suppress warnings due to the `unused_crate_dependencies` lint not handling integration tests well.
#[cfg(test)]
use assert_cmd as _;
#[cfg(test)]
use indoc as _;
#[cfg(test)]
use tempfile as _;

fn main() {
    let env = Env::from_current();
    setup_logging(&env);

    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            process::exit(if error.use_stderr() {
                GENERIC_UNSPECIFIED_ERROR
            } else {
                0
            });
        }
    };

    let registry = match buildpacks::registry() {
        Ok(registry) => registry,
        Err(error) => {
            error!("Unable to register buildpacks: {error}");
            process::exit(GENERIC_UNSPECIFIED_ERROR);
        }
    };

    let invocation = Invocation::from(cli);
    debug!(
        "Running {} for {}",
        invocation.phase.as_deref().unwrap_or("<none>"),
        invocation.buildpack_id.as_deref().unwrap_or("<none>")
    );
    if let Some(platform) = env.get_non_empty(X_GOOGLE_TARGET_PLATFORM) {
        debug!("Target platform: {platform}");
    }

    process::exit(dispatch(&registry, &invocation, &env));
}

fn setup_logging(env: &Env) {
    let debug = env
        .get_string_lossy(GOOGLE_DEBUG)
        .and_then(|value| parse_bool(&value))
        .unwrap_or(false);

    if let Err(error) = stderrlog::new()
        .verbosity(if debug { 3 } else { 1 }) // LevelFilter::Debug or LevelFilter::Warn
        .init()
    {
        eprintln!("Unable to initialize logger: {error}");
        process::exit(GENERIC_UNSPECIFIED_ERROR);
    }
}
