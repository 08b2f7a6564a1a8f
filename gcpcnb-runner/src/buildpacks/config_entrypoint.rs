//! Sets the image entrypoint from `GOOGLE_ENTRYPOINT` or a Procfile.

use gcpcnb::build::{BuildContext, ProcessOptions};
use gcpcnb::config::GOOGLE_ENTRYPOINT;
use gcpcnb::data::launch::ProcessType;
use gcpcnb::detect::{DetectContext, DetectResult};
use gcpcnb::BuilderError;
use std::collections::HashSet;
use std::fs;

const PROCFILE: &str = "Procfile";
const PROCESS_PATTERN: &str = r"(?m)^(\w+):\s*(.+)$";

pub(crate) fn detect(context: &DetectContext) -> gcpcnb::Result<DetectResult> {
    if let Some(entrypoint) = context
        .env_var(GOOGLE_ENTRYPOINT)
        .filter(|entrypoint| !entrypoint.is_empty())
    {
        return Ok(DetectResult::opt_in_env_set(GOOGLE_ENTRYPOINT, entrypoint));
    }

    if context.file_exists(PROCFILE) {
        return Ok(DetectResult::opt_in_file_found(PROCFILE));
    }

    Ok(DetectResult::opt_out(format!(
        "{GOOGLE_ENTRYPOINT} not set and {PROCFILE} not found"
    )))
}

pub(crate) fn build(context: &mut BuildContext) -> gcpcnb::Result<()> {
    if let Some(entrypoint) = context
        .env_var(GOOGLE_ENTRYPOINT)
        .filter(|entrypoint| !entrypoint.is_empty())
    {
        context.info(format!(
            "Using entrypoint from {GOOGLE_ENTRYPOINT}: {entrypoint}"
        ));
        return context.add_process(ProcessType::WEB, vec![entrypoint], shell_process(true));
    }

    let procfile = fs::read_to_string(context.app_dir.join(PROCFILE))?;
    let parsed = parse_procfile(&procfile)?;

    for duplicate in &parsed.duplicates {
        context.warn(format!(
            "Skipping duplicate {} process: {}",
            duplicate.0, duplicate.1
        ));
    }

    for (name, command) in parsed.processes {
        if name == ProcessType::WEB {
            context.info(format!("Using entrypoint from {PROCFILE}: {command}"));
        }

        let default = name == ProcessType::WEB;
        context.add_process(&name, vec![command], shell_process(default))?;
    }

    Ok(())
}

fn shell_process(default: bool) -> ProcessOptions {
    ProcessOptions {
        direct: false,
        default,
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Procfile {
    /// Processes in file order, first definition wins.
    processes: Vec<(String, String)>,
    duplicates: Vec<(String, String)>,
}

fn parse_procfile(contents: &str) -> Result<Procfile, BuilderError> {
    let regex = fancy_regex::Regex::new(PROCESS_PATTERN)
        .map_err(|error| BuilderError::internal(format!("invalid process pattern: {error}")))?;

    let mut procfile = Procfile::default();
    let mut seen = HashSet::new();

    for captures in regex.captures_iter(contents) {
        let captures = captures
            .map_err(|error| BuilderError::internal(format!("matching {PROCFILE}: {error}")))?;

        let (Some(name), Some(command)) = (captures.get(1), captures.get(2)) else {
            return Err(BuilderError::internal(format!(
                "invalid process match in {PROCFILE}: {:?}",
                captures.get(0).map(|line| line.as_str())
            )));
        };

        let entry = (
            name.as_str().to_string(),
            command.as_str().trim().to_string(),
        );

        if seen.insert(entry.0.clone()) {
            procfile.processes.push(entry);
        } else {
            procfile.duplicates.push(entry);
        }
    }

    if procfile.processes.is_empty() {
        return Err(BuilderError::user(format!(
            "did not find any processes in {PROCFILE}"
        )));
    }

    if !seen.contains(ProcessType::WEB) {
        return Err(BuilderError::user(format!(
            "{} process not found in {PROCFILE}",
            ProcessType::WEB
        )));
    }

    Ok(procfile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn procfile_processes_in_order() {
        let procfile = parse_procfile(indoc! {"
            web: gunicorn -b :$PORT main:app
            worker:   python worker.py
            web: python main.py
        "})
        .unwrap();

        assert_eq!(
            procfile.processes,
            [
                (
                    String::from("web"),
                    String::from("gunicorn -b :$PORT main:app")
                ),
                (String::from("worker"), String::from("python worker.py")),
            ]
        );
        assert_eq!(
            procfile.duplicates,
            [(String::from("web"), String::from("python main.py"))]
        );
    }

    #[test]
    fn procfile_without_processes() {
        let error = parse_procfile("# nothing here\n").unwrap_err();
        assert_eq!(error.message(), "did not find any processes in Procfile");
    }

    #[test]
    fn procfile_without_web_process() {
        let error = parse_procfile("worker: python worker.py\n").unwrap_err();
        assert_eq!(error.message(), "web process not found in Procfile");
        assert_eq!(error.status(), gcpcnb::Status::Unknown);
    }
}
