use serde::{de::DeserializeOwned, Serialize};
use std::{fs, io, path::Path};

/// An error that occurred during reading or writing a TOML file.
#[derive(thiserror::Error, Debug)]
pub enum TomlFileError {
    #[error("IO error while reading/writing TOML file: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML deserialization error while reading TOML file: {0}")]
    TomlDeserializationError(#[from] toml::de::Error),

    #[error("TOML serialization error while writing TOML file: {0}")]
    TomlSerializationError(#[from] toml::ser::Error),
}

pub fn write_toml_file(
    value: &impl Serialize,
    path: impl AsRef<Path>,
) -> Result<(), TomlFileError> {
    fs::write(path, toml::to_string(value)?)?;

    Ok(())
}

pub fn read_toml_file<A: DeserializeOwned>(path: impl AsRef<Path>) -> Result<A, TomlFileError> {
    let contents = fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

/// Like [`read_toml_file`], but a missing file yields `None`.
pub fn read_toml_file_if_exists<A: DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<Option<A>, TomlFileError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(toml::from_str(&contents)?)),
        Err(io_error) if io_error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(io_error) => Err(TomlFileError::IoError(io_error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcpcnb_data::build_plan::{BuildPlan, BuildPlanBuilder};

    #[test]
    fn missing_file_reads_as_none() {
        let temp_dir = tempfile::tempdir().unwrap();

        let result =
            read_toml_file_if_exists::<BuildPlan>(temp_dir.path().join("plan.toml")).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn written_file_is_read_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("plan.toml");
        let plan = BuildPlanBuilder::new().provides("go").requires("go").build();

        write_toml_file(&plan, &path).unwrap();

        assert_eq!(read_toml_file_if_exists::<BuildPlan>(&path).unwrap(), Some(plan));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("plan.toml");
        fs::write(&path, "[[provides]\nname = ").unwrap();

        assert!(matches!(
            read_toml_file_if_exists::<BuildPlan>(&path),
            Err(TomlFileError::TomlDeserializationError(_))
        ));
    }
}
