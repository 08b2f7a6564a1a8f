//! Compiles a Go application into a launch layer.

use gcpcnb::build::BuildContext;
use gcpcnb::cache::{self, CacheInputs};
use gcpcnb::config::GOOGLE_BUILDABLE;
use gcpcnb::data::layer_content_metadata::LayerTypes;
use gcpcnb::detect::{DetectContext, DetectResult};
use gcpcnb::devmode::{self, SyncRule};
use gcpcnb::exec::{ExecParams, MessageProducer};
use gcpcnb::layer_env::{ModificationBehavior, Scope};
use std::fs;

/// Name of the compiled binary inside the `bin` layer.
const OUT_BIN: &str = "main";

pub(crate) fn detect(context: &DetectContext) -> gcpcnb::Result<DetectResult> {
    if context.has_at_least_one("*.go")? {
        Ok(DetectResult::opt_in("found *.go files"))
    } else {
        Ok(DetectResult::opt_out("No *.go files found"))
    }
}

pub(crate) fn build(context: &mut BuildContext) -> gcpcnb::Result<()> {
    if context.app_dir.join("go.mod").exists() {
        let gopath = context.layer(
            "gopath",
            LayerTypes {
                build: true,
                cache: true,
                launch: false,
            },
        )?;

        // Downloaded modules stay valid for as long as the module files are unchanged.
        let module_files = ["go.mod", "go.sum"]
            .map(|file| context.app_dir.join(file))
            .into_iter()
            .filter(|path| path.exists());
        let inputs = CacheInputs::new().with_files(module_files);
        cache::hash_and_check(context, &gopath, cache::DEPENDENCY_HASH_KEY, &inputs)?;

        let gopath_dir = gopath.path().as_os_str().to_owned();
        let layer_env = context.layer_env_mut(&gopath)?;
        layer_env.insert(Scope::Build, ModificationBehavior::Override, "GOPATH", gopath_dir);
        layer_env.insert(Scope::Build, ModificationBehavior::Override, "GO111MODULE", "on");
    }

    let bin = context.layer(
        "bin",
        LayerTypes {
            launch: true,
            ..LayerTypes::default()
        },
    )?;
    let bin_dir = bin.path().join("bin");
    fs::create_dir_all(&bin_dir)?;

    let package = context
        .env_var(GOOGLE_BUILDABLE)
        .filter(|package| !package.is_empty())
        .unwrap_or_else(|| String::from("."));

    context.exec(
        ExecParams::new([
            String::from("go"),
            String::from("build"),
            String::from("-o"),
            bin_dir.join(OUT_BIN).to_string_lossy().to_string(),
            package.clone(),
        ])
        .dir(context.app_dir.clone())
        .user_attributed()
        .message_producer(MessageProducer::StderrTail),
    )?;

    if !devmode::enabled(context) {
        return context.add_web_process(vec![String::from(OUT_BIN)]);
    }

    devmode::add_file_watcher_process(
        context,
        &devmode::Config {
            build_cmd: Vec::new(),
            run_cmd: vec![String::from("go"), String::from("run"), package],
            ext: vec![String::from("go")],
        },
    )?;
    devmode::add_sync_metadata(context, &sync_rules());

    Ok(())
}

fn sync_rules() -> [SyncRule; 1] {
    [SyncRule::new("**/*.go", "/workspace")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_sources_sync_to_the_workspace() {
        assert_eq!(
            sync_rules(),
            [SyncRule {
                src: String::from("**/*.go"),
                dest: String::from("/workspace"),
            }]
        );
    }
}
