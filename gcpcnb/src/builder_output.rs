//! Structured results in `$BUILDER_OUTPUT/output`, consumed by the builder that invoked the
//! lifecycle.

use crate::error::{BuilderError, Status};
use gcpcnb_data::buildpack::BuildpackInfo;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const BUILDER_OUTPUT_FILENAME: &str = "output";

/// Error messages are cut to this many bytes.
pub const MAX_MESSAGE_BYTES: usize = 3000;

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct BuilderOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    #[serde(default)]
    pub stats: Vec<BuilderStat>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub buildpack_id: String,
    pub buildpack_version: String,
    pub error_type: Status,
    pub canonical_code: Status,
    pub error_id: String,
    pub error_message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuilderStat {
    pub buildpack_id: String,
    pub buildpack_version: String,
    pub total_duration_ms: u64,
    pub user_duration_ms: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum BuilderOutputError {
    #[error("Couldn't access {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Couldn't encode or decode builder output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Replaces the output file with an error record.
///
/// Detect steps may run in parallel, so the file is written to a temporary file in the same
/// directory first and then renamed into place, the last writer wins.
pub fn save_error_output(
    output_dir: &Path,
    buildpack: &BuildpackInfo,
    error: &BuilderError,
) -> Result<ErrorRecord, BuilderOutputError> {
    save_error_record(output_dir, &buildpack.id, &buildpack.version, error)
}

/// Like [`save_error_output`], for failures where only the requested buildpack ID is known.
pub fn save_error_record(
    output_dir: &Path,
    buildpack_id: &str,
    buildpack_version: &str,
    error: &BuilderError,
) -> Result<ErrorRecord, BuilderOutputError> {
    let record = ErrorRecord {
        buildpack_id: buildpack_id.to_string(),
        buildpack_version: buildpack_version.to_string(),
        error_type: error.status(),
        canonical_code: error.status(),
        error_id: error.id().to_string(),
        error_message: keep_tail(error.message()),
    };

    let output = BuilderOutput {
        error: Some(record.clone()),
        stats: Vec::new(),
    };

    write_atomically(output_dir, &serde_json::to_vec(&output)?)?;
    Ok(record)
}

/// Appends build statistics to the output file, keeping whatever it already contains.
pub fn save_success_output(
    output_dir: &Path,
    buildpack: &BuildpackInfo,
    total: Duration,
    user: Duration,
) -> Result<(), BuilderOutputError> {
    let path = output_dir.join(BUILDER_OUTPUT_FILENAME);

    let mut output = match fs::read(&path) {
        Ok(contents) => serde_json::from_slice::<BuilderOutput>(&contents)?,
        Err(source) if source.kind() == io::ErrorKind::NotFound => BuilderOutput::default(),
        Err(source) => return Err(BuilderOutputError::Io { path, source }),
    };

    output.stats.push(BuilderStat {
        buildpack_id: buildpack.id.to_string(),
        buildpack_version: buildpack.version.clone(),
        total_duration_ms: duration_ms(total),
        user_duration_ms: duration_ms(user),
    });

    write_atomically(output_dir, &serde_json::to_vec(&output)?)
}

pub fn read_output(output_dir: &Path) -> Result<BuilderOutput, BuilderOutputError> {
    let path = output_dir.join(BUILDER_OUTPUT_FILENAME);
    let contents = fs::read(&path).map_err(|source| BuilderOutputError::Io { path, source })?;
    Ok(serde_json::from_slice(&contents)?)
}

/// Whether `message` matches the `EXPECTED_BUILDER_OUTPUT` pattern.
pub fn expected_pattern_matches(
    pattern: &str,
    message: &str,
) -> Result<bool, Box<fancy_regex::Error>> {
    let regex = fancy_regex::Regex::new(pattern).map_err(Box::new)?;
    regex.is_match(message).map_err(Box::new)
}

fn write_atomically(output_dir: &Path, contents: &[u8]) -> Result<(), BuilderOutputError> {
    let io_error = |source| BuilderOutputError::Io {
        path: output_dir.to_path_buf(),
        source,
    };

    fs::create_dir_all(output_dir).map_err(io_error)?;

    let mut temp_file = tempfile::Builder::new()
        .prefix(BUILDER_OUTPUT_FILENAME)
        .tempfile_in(output_dir)
        .map_err(io_error)?;
    temp_file.write_all(contents).map_err(io_error)?;
    temp_file
        .persist(output_dir.join(BUILDER_OUTPUT_FILENAME))
        .map_err(|persist_error| io_error(persist_error.error))?;

    Ok(())
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Keeps the end of an over-long message, marking the cut with a leading `...`.
#[must_use]
pub fn keep_tail(message: &str) -> String {
    let message = message.trim();
    if message.len() <= MAX_MESSAGE_BYTES {
        return message.to_string();
    }

    let mut start = message.len() - MAX_MESSAGE_BYTES + 3;
    while !message.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &message[start..])
}

/// Keeps the start of an over-long message, marking the cut with a trailing `...`.
#[must_use]
pub fn keep_head(message: &str) -> String {
    let message = message.trim();
    if message.len() <= MAX_MESSAGE_BYTES {
        return message.to_string();
    }

    let mut end = MAX_MESSAGE_BYTES - 3;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &message[..end])
}
