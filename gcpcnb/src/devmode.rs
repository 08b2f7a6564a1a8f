//! Development mode: images that rebuild and restart the application when source files change.
//!
//! The file watcher itself (`watchexec`) is expected on the `PATH` of the run image.

use crate::build::BuildContext;
use crate::config::{parse_bool, GOOGLE_DEVMODE};
use crate::detect::DetectContext;
use crate::Result;
use gcpcnb_data::bom;
use gcpcnb_data::layer_content_metadata::LayerTypes;
use std::fs;
use std::path::Path;
use toml::value::{Array, Table};

const SCRIPTS_LAYER: &str = "devmode_scripts";
const BUILD_AND_RUN: &str = "build_and_run.sh";

/// The script that watches source files and reruns `build_and_run.sh` when they change.
pub const WATCH_AND_RUN: &str = "watch_and_run.sh";

/// The bill of materials entry carrying the sync rules.
pub const BOM_ENTRY_NAME: &str = "devmode";

/// The metadata key of the sync rules within the [`BOM_ENTRY_NAME`] entry.
pub const SYNC_METADATA_KEY: &str = "devmode.sync";

/// Files matching `src` (a glob relative to the application) are copied below `dest` when they
/// change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRule {
    pub src: String,
    pub dest: String,
}

impl SyncRule {
    pub fn new(src: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
        }
    }

    fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.insert(String::from("dest"), toml::Value::from(self.dest.as_str()));
        table.insert(String::from("src"), toml::Value::from(self.src.as_str()));
        table
    }
}

/// How to build and run the application for a language.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub build_cmd: Vec<String>,
    pub run_cmd: Vec<String>,
    /// File extensions that trigger a restart.
    pub ext: Vec<String>,
}

/// Whether the builder runs in development mode. An unparsable `GOOGLE_DEVMODE` is reported
/// and treated as disabled.
pub fn enabled(context: &mut BuildContext) -> bool {
    match parse(context.env_var(GOOGLE_DEVMODE)) {
        Ok(enabled) => enabled,
        Err(warning) => {
            context.warn(warning);
            false
        }
    }
}

/// Like [`enabled`], for detection.
#[must_use]
pub fn enabled_for_detect(context: &DetectContext) -> bool {
    match parse(context.env_var(GOOGLE_DEVMODE)) {
        Ok(enabled) => enabled,
        Err(warning) => {
            context.warn(warning);
            false
        }
    }
}

fn parse(value: Option<String>) -> std::result::Result<bool, String> {
    let Some(value) = value else {
        return Ok(false);
    };

    parse_bool(&value).ok_or_else(|| {
        format!("{GOOGLE_DEVMODE} env var must be parseable to a bool: {value:?}")
    })
}

/// Records the sync rules in the launch bill of materials.
pub fn add_sync_metadata(context: &mut BuildContext, rules: &[SyncRule]) {
    let rules: Array = rules
        .iter()
        .map(|rule| toml::Value::Table(rule.to_table()))
        .collect();

    let mut metadata = Table::new();
    metadata.insert(String::from(SYNC_METADATA_KEY), toml::Value::Array(rules));

    context.add_bom_entry(bom::Entry::new(BOM_ENTRY_NAME, metadata));
}

/// Writes the build and watch scripts into a launch layer and makes the watcher the `web`
/// process.
pub fn add_file_watcher_process(context: &mut BuildContext, config: &Config) -> Result<()> {
    let layer = context.layer(
        SCRIPTS_LAYER,
        LayerTypes {
            launch: true,
            ..LayerTypes::default()
        },
    )?;

    let bin_dir = layer.path().join("bin");
    fs::create_dir_all(&bin_dir)?;

    let steps: Vec<String> = [&config.build_cmd, &config.run_cmd]
        .into_iter()
        .filter(|cmd| !cmd.is_empty())
        .map(|cmd| cmd.join(" "))
        .collect();

    let build_and_run = bin_dir.join(BUILD_AND_RUN);
    write_script(
        &build_and_run,
        &format!("#!/bin/sh\n{}", steps.join(" && ")),
    )?;

    write_script(
        &bin_dir.join(WATCH_AND_RUN),
        &format!(
            "#!/bin/sh\nwatchexec -r -e {} {}",
            config.ext.join(","),
            build_and_run.display()
        ),
    )?;

    context.add_web_process(vec![String::from(WATCH_AND_RUN)])
}

fn write_script(path: &Path, contents: &str) -> std::io::Result<()> {
    fs::write(path, contents)?;

    #[cfg(target_family = "unix")]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(())
}
