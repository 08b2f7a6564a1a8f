//! Runs the runner binary the way the lifecycle scripts of each buildpack do.

// Required due to: https://github.com/rust-lang/rust/issues/95513
#![allow(unused_crate_dependencies)]

use assert_cmd::Command;
use gcpcnb::builder_output::read_output;
use gcpcnb::data::launch::Launch;
use gcpcnb::toml_file::read_toml_file;
use indoc::indoc;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Output;
use tempfile::{tempdir, TempDir};

const FAKE_GO: &str = indoc! {r#"
    #!/bin/sh
    if [ "$1" = "build" ]; then
      printf '#!/bin/sh\necho hello\n' > "$3"
      chmod +x "$3"
    fi
"#};

struct Build {
    app: TempDir,
    platform: TempDir,
    layers: TempDir,
    output: TempDir,
    tools: TempDir,
    env: Vec<(String, String)>,
}

impl Build {
    fn new() -> Self {
        let tools = tempdir().unwrap();
        let go = tools.path().join("go");
        fs::write(&go, FAKE_GO).unwrap();
        fs::set_permissions(&go, fs::Permissions::from_mode(0o755)).unwrap();

        Self {
            app: tempdir().unwrap(),
            platform: tempdir().unwrap(),
            layers: tempdir().unwrap(),
            output: tempdir().unwrap(),
            tools,
            env: Vec::new(),
        }
    }

    fn env(mut self, name: &str, value: &str) -> Self {
        self.env.push((String::from(name), String::from(value)));
        self
    }

    fn app_file(&self, path: &str, contents: &str) -> &Self {
        let path = self.app.path().join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
        self
    }

    fn command(&self, buildpack: &str, phase: &str) -> Command {
        let mut command = Command::cargo_bin("runner").unwrap();
        command
            .env_clear()
            .env(
                "PATH",
                format!(
                    "{}:{}",
                    self.tools.path().display(),
                    std::env::var("PATH").unwrap_or_default()
                ),
            )
            .env("CNB_APP_DIR", self.app.path())
            .env("BUILDER_OUTPUT", self.output.path())
            .envs(self.env.iter().map(|(name, value)| (name, value)))
            .arg(format!("-buildpack={buildpack}"))
            .arg(format!("-phase={phase}"));
        command
    }

    fn detect(&self, buildpack: &str) -> Output {
        self.command(buildpack, "detect")
            .arg(self.platform.path())
            .arg(self.layers.path().join("plan.toml"))
            .output()
            .unwrap()
    }

    fn build(&self, buildpack: &str) -> Output {
        let plan_path = self.platform.path().join("plan.toml");
        fs::write(&plan_path, "").unwrap();

        self.command(buildpack, "build")
            .arg(self.layers.path())
            .arg(self.platform.path())
            .arg(plan_path)
            .output()
            .unwrap()
    }

    fn launch(&self) -> Launch {
        read_toml_file(self.layers.path().join("launch.toml")).unwrap()
    }
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn unknown_buildpack_lists_registered_ids() {
    let build = Build::new();
    let output = build.detect("google.cobol.build");

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.contains("Unknown buildpack ID: google.cobol.build"));
    assert!(stderr.contains(
        "Registered buildpacks are:\n  google.config.clear-source\n  google.config.entrypoint\n  google.dotnet.sdk\n  google.go.build"
    ));

    let error = read_output(build.output.path()).unwrap().error.unwrap();
    assert_eq!(error.buildpack_id, "google.cobol.build");
    assert_eq!(error.error_type, gcpcnb::Status::Internal);
    assert!(error
        .error_message
        .starts_with("Unknown buildpack ID: google.cobol.build"));
}

#[test]
fn missing_buildpack_flag_is_a_usage_error() {
    let output = Command::cargo_bin("runner")
        .unwrap()
        .arg("-phase=detect")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Usage: runner -buildpack <id> [args...]"));
}

#[test]
fn invalid_phase() {
    let output = Build::new()
        .command("google.go.build", "export")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Invalid phase \"export\", expected 'detect' or 'build'"));
}

#[test]
fn unknown_flags_exit_one() {
    let output = Command::cargo_bin("runner")
        .unwrap()
        .arg("--stack=google-22")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn go_detect() {
    let build = Build::new();
    assert_eq!(build.detect("google.go.build").status.code(), Some(100));

    build.app_file("cmd/server/main.go", "package main");
    let output = build.detect("google.go.build");
    assert_eq!(output.status.code(), Some(0));
    assert!(stderr(&output).contains("Opting in: found *.go files"));
}

#[test]
fn go_build_sets_web_process() {
    let build = Build::new();
    build.app_file("main.go", "package main");

    let output = build.build("google.go.build");
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    assert!(build.layers.path().join("bin/bin/main").exists());
    assert!(build.layers.path().join("bin.toml").exists());

    let launch = build.launch();
    assert_eq!(launch.processes.len(), 1);
    assert_eq!(launch.processes[0].command, "main");
    assert!(launch.bom.is_empty());

    let stats = read_output(build.output.path()).unwrap().stats;
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].buildpack_id, "google.go.build");
}

#[test]
fn go_build_in_devmode_emits_sync_rules() {
    let build = Build::new().env("GOOGLE_DEVMODE", "1");
    build.app_file("main.go", "package main");

    let output = build.build("google.go.build");
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

    let launch = build.launch();
    assert_eq!(launch.bom.len(), 1);
    assert_eq!(launch.bom[0].name, "devmode");
    assert_eq!(
        serde_json::to_string(&launch.bom[0].metadata).unwrap(),
        r#"{"devmode.sync":[{"dest":"/workspace","src":"**/*.go"}]}"#
    );
    assert_eq!(launch.processes[0].command, "watch_and_run.sh");
    assert!(build.app.path().join("main.go").exists());
}

#[test]
fn go_module_cache_follows_module_files() {
    let build = Build::new();
    build
        .app_file("main.go", "package main")
        .app_file("go.mod", "module example.com/app\n\ngo 1.21\n");

    let first = build.build("google.go.build");
    assert_eq!(first.status.code(), Some(0), "{}", stderr(&first));
    assert!(stderr(&first).contains(r#"***** CACHE MISS: "gopath""#));

    let second = build.build("google.go.build");
    assert!(stderr(&second).contains(r#"***** CACHE HIT: "gopath""#));

    build.app_file("go.sum", "golang.org/x/text v0.3.8 h1:abc=\n");
    let third = build.build("google.go.build");
    assert!(stderr(&third).contains(r#"***** CACHE MISS: "gopath""#));
}

#[test]
fn dotnet_invalid_version_fails_the_build() {
    let build = Build::new()
        .env("GOOGLE_RUNTIME_VERSION", "BAD_NEWS_BEARS")
        .env(
            "EXPECTED_BUILDER_OUTPUT",
            r"invalid \.NET SDK version specified: improper constraint: BAD_NEWS_BEARS",
        );
    build.app_file("app.csproj", "<Project />");

    assert_eq!(build.detect("google.dotnet.sdk").status.code(), Some(0));

    let output = build.build("google.dotnet.sdk");
    assert_eq!(output.status.code(), Some(1));

    let stderr = stderr(&output);
    assert!(stderr.contains("failed to build: "));
    assert!(stderr.contains(
        "invalid .NET SDK version specified: improper constraint: BAD_NEWS_BEARS"
    ));
    assert!(stderr.contains("Expected pattern included in error output: true"));

    let error = read_output(build.output.path()).unwrap().error.unwrap();
    assert_eq!(error.buildpack_id, "google.dotnet.sdk");
    assert_eq!(error.error_type, gcpcnb::Status::Unknown);
    assert_eq!(
        error.error_message,
        "invalid .NET SDK version specified: improper constraint: BAD_NEWS_BEARS"
    );
}

#[test]
fn dotnet_sdk_is_reused_from_cache() {
    let build = Build::new().env("GOOGLE_RUNTIME_VERSION", "6.0.100");
    fs::create_dir_all(build.layers.path().join("sdk")).unwrap();
    fs::write(build.layers.path().join("sdk/dotnet"), "").unwrap();
    fs::write(
        build.layers.path().join("sdk.toml"),
        indoc! {r#"
            [types]
            build = true
            cache = true
            launch = false

            [metadata]
            devmode = "false"
            version = "6.0.100"
        "#},
    )
    .unwrap();

    for _ in 0..2 {
        let output = build.build("google.dotnet.sdk");
        assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));

        let stderr = stderr(&output);
        assert!(stderr.contains(r#"***** CACHE HIT: "sdk""#));
        assert!(!stderr.contains("***** CACHE MISS:"));
        assert!(build.layers.path().join("sdk/dotnet").exists());
    }

    assert_eq!(
        fs::read_to_string(build.layers.path().join("sdk/env.build/DOTNET_ROOT.default")).unwrap(),
        build.layers.path().join("sdk").to_string_lossy()
    );
}

#[test]
fn entrypoint_from_env() {
    let build = Build::new().env("GOOGLE_ENTRYPOINT", "gunicorn -b :8080 main:app");

    assert_eq!(build.detect("google.config.entrypoint").status.code(), Some(0));
    assert_eq!(build.build("google.config.entrypoint").status.code(), Some(0));

    let launch = build.launch();
    assert_eq!(launch.processes[0].command, "gunicorn -b :8080 main:app");
    assert!(launch.processes[0].default);
    assert!(!launch.processes[0].direct);
}

#[test]
fn entrypoint_from_procfile() {
    let build = Build::new();
    assert_eq!(build.detect("google.config.entrypoint").status.code(), Some(100));

    build.app_file("Procfile", "web: ./server --port $PORT\nworker: ./worker\n");
    assert_eq!(build.detect("google.config.entrypoint").status.code(), Some(0));
    assert_eq!(build.build("google.config.entrypoint").status.code(), Some(0));

    let commands: Vec<String> = build
        .launch()
        .processes
        .iter()
        .map(|process| process.command.clone())
        .collect();
    assert_eq!(commands, ["./server --port $PORT", "./worker"]);
}

#[test]
fn clear_source_removes_visible_files() {
    let build = Build::new().env("GOOGLE_CLEAR_SOURCE", "true");
    build
        .app_file("main.go", "package main")
        .app_file("pkg/lib.go", "package pkg")
        .app_file(".keep", "");

    assert_eq!(build.detect("google.config.clear-source").status.code(), Some(0));
    assert_eq!(build.build("google.config.clear-source").status.code(), Some(0));

    assert!(!build.app.path().join("main.go").exists());
    assert!(!build.app.path().join("pkg").exists());
    assert!(build.app.path().join(".keep").exists());
}

#[test]
fn clear_source_keeps_source_in_devmode() {
    let build = Build::new()
        .env("GOOGLE_CLEAR_SOURCE", "true")
        .env("GOOGLE_DEVMODE", "true");

    assert_eq!(build.detect("google.config.clear-source").status.code(), Some(100));
}

#[test]
fn clear_source_with_invalid_value_fails_detection() {
    let build = Build::new().env("GOOGLE_CLEAR_SOURCE", "sometimes");

    let output = build.detect("google.config.clear-source");
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("failed to run /bin/detect: "));
}

#[test]
fn detect_does_not_modify_the_application() {
    let build = Build::new();
    build.app_file("main.go", "package main");

    for buildpack in [
        "google.go.build",
        "google.dotnet.sdk",
        "google.config.entrypoint",
        "google.config.clear-source",
    ] {
        build.detect(buildpack);
    }

    let entries: Vec<_> = fs::read_dir(build.app.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
    assert!(Path::new(&build.app.path().join("main.go")).exists());
}
