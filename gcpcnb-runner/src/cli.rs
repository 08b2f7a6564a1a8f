use clap::Parser;
use gcpcnb::Invocation;
use std::ffi::OsString;
use std::path::PathBuf;

/// Runs the detect or build phase of one of the bundled buildpacks.
#[derive(Parser, Debug)]
#[command(name = "runner", version, about, long_about = None)]
pub(crate) struct Cli {
    /// ID of the buildpack to run, e.g. google.go.build
    #[arg(long)]
    pub buildpack: Option<String>,
    /// Phase to run, 'detect' or 'build'
    #[arg(long)]
    pub phase: Option<String>,
    /// Paths supplied by the lifecycle
    pub args: Vec<PathBuf>,
}

impl From<Cli> for Invocation {
    fn from(cli: Cli) -> Self {
        Self {
            buildpack_id: cli.buildpack,
            phase: cli.phase,
            args: cli.args,
        }
    }
}

const SINGLE_DASH_FLAGS: [&str; 2] = ["-buildpack", "-phase"];

/// Rewrites the single-dash flags the lifecycle scripts pass (`-buildpack=<id>`) to their
/// double-dash form.
pub(crate) fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| {
            let Some(value) = arg.to_str() else {
                return arg;
            };

            let is_single_dash_flag = SINGLE_DASH_FLAGS.iter().any(|flag| {
                value == *flag
                    || value
                        .strip_prefix(flag)
                        .is_some_and(|rest| rest.starts_with('='))
            });

            if is_single_dash_flag {
                OsString::from(format!("-{value}"))
            } else {
                arg
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_command() {
        // Trigger Clap's internal assertions that validate the command configuration.
        Cli::command().debug_assert();
    }

    #[test]
    fn single_dash_flags_are_accepted() {
        let args = normalize_args(
            [
                "runner",
                "-buildpack=google.go.build",
                "-phase",
                "build",
                "/layers/google.go.build",
                "/platform",
                "/tmp/plan.toml",
            ]
            .map(OsString::from),
        );

        let invocation = Invocation::from(Cli::try_parse_from(args).unwrap());

        assert_eq!(invocation.buildpack_id.as_deref(), Some("google.go.build"));
        assert_eq!(invocation.phase.as_deref(), Some("build"));
        assert_eq!(
            invocation.args,
            [
                PathBuf::from("/layers/google.go.build"),
                PathBuf::from("/platform"),
                PathBuf::from("/tmp/plan.toml"),
            ]
        );
    }

    #[test]
    fn other_arguments_are_untouched() {
        let args = normalize_args(["--phase=detect", "-phases", "/platform"].map(OsString::from));

        assert_eq!(
            args,
            ["--phase=detect", "-phases", "/platform"].map(OsString::from)
        );
    }
}
