//! Removes the application source from the image once earlier buildpacks have built it.

use gcpcnb::build::BuildContext;
use gcpcnb::config::{parse_bool, GOOGLE_CLEAR_SOURCE};
use gcpcnb::detect::{DetectContext, DetectResult};
use gcpcnb::{devmode, BuilderError};
use std::fs;

pub(crate) fn detect(context: &DetectContext) -> gcpcnb::Result<DetectResult> {
    if devmode::enabled_for_detect(context) {
        return Ok(DetectResult::opt_out("Keeping the source for dev mode"));
    }

    if let Some(value) = context.env_var(GOOGLE_CLEAR_SOURCE) {
        let clear = parse_bool(&value).ok_or_else(|| {
            BuilderError::user(format!(
                "parsing {GOOGLE_CLEAR_SOURCE:?}: invalid boolean value {value:?}"
            ))
        })?;

        if clear {
            return Ok(DetectResult::opt_in(format!(
                "{GOOGLE_CLEAR_SOURCE} set, clearing source"
            )));
        }
    }

    Ok(DetectResult::opt_out(format!(
        "{GOOGLE_CLEAR_SOURCE} not set, opting out"
    )))
}

pub(crate) fn build(context: &mut BuildContext) -> gcpcnb::Result<()> {
    context.info("Clearing source");

    // Hidden entries are kept, like a shell glob of `*` would.
    let pattern = format!(
        "{}/*",
        glob::Pattern::escape(&context.app_dir.to_string_lossy())
    );
    let options = glob::MatchOptions {
        require_literal_leading_dot: true,
        ..glob::MatchOptions::new()
    };
    let paths = glob::glob_with(&pattern, options).map_err(|error| {
        BuilderError::internal(format!("matching files with pattern {pattern:?}: {error}"))
    })?;

    for path in paths.filter_map(Result::ok) {
        if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }

    Ok(())
}
