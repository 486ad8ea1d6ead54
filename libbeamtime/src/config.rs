use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::ConfigError;

/// TimePix files ending with this were written without the timing groups and are skipped
const RAW_ONLY_SUFFIX: &str = "rawOnly.hdf5";
const HDF_EXTENSION: &str = "hdf5";

/// Structure representing the beamtime configuration. Contains pathing and the lookup documents.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
///
/// The `paths` table maps a storage system name (`core`, `gpfs`, `local`, ...) onto the
/// filesystem prefix of the beamtime directory on that system; `file_system` picks one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub file_system: String,
    pub paths: BTreeMap<String, PathBuf>,
    pub timepix: PathBuf,
    pub pp_delay: PathBuf,
    pub fragments: PathBuf,
    pub run_numbers: PathBuf,
}

impl Default for Config {
    /// Generate a new Config object. All paths will be empty/invalid
    fn default() -> Self {
        let mut paths = BTreeMap::new();
        paths.insert(String::from("core"), PathBuf::from("None"));
        Self {
            file_system: String::from("core"),
            paths,
            timepix: PathBuf::from("timepix"),
            pp_delay: PathBuf::from("pp_delay.yaml"),
            fragments: PathBuf::from("None"),
            run_numbers: PathBuf::from("None"),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        std::fs::write(config_path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Get the beamtime prefix of the selected storage system
    pub fn get_data_prefix(&self) -> Result<&Path, ConfigError> {
        self.paths
            .get(&self.file_system)
            .map(|p| p.as_path())
            .ok_or_else(|| ConfigError::UnknownFileSystem(self.file_system.clone()))
    }

    /// Get the directory holding the TimePix HDF5 files
    pub fn get_timepix_directory(&self) -> Result<PathBuf, ConfigError> {
        let dir = self.get_data_prefix()?.join(&self.timepix);
        if dir.exists() {
            Ok(dir)
        } else {
            Err(ConfigError::BadFilePath(dir))
        }
    }

    /// Get the path to the pump-probe delay document
    pub fn get_pp_delay_path(&self) -> Result<PathBuf, ConfigError> {
        let path = self.get_data_prefix()?.join(&self.pp_delay);
        if path.exists() {
            Ok(path)
        } else {
            Err(ConfigError::BadFilePath(path))
        }
    }

    /// Find every TimePix file of a run (`run_XXXX_*.hdf5`, raw-only files excluded)
    pub fn get_run_files(&self, run_number: i32) -> Result<Vec<PathBuf>, ConfigError> {
        let prefix = format!("{}_", self.get_run_str(run_number));
        let mut files = Vec::new();
        for item in self.get_timepix_directory()?.read_dir()? {
            let item_path = item?.path();
            if !item_path.is_file() {
                continue;
            }
            let name = match item_path.file_name() {
                Some(n) => n.to_string_lossy().to_string(),
                None => continue,
            };
            let is_hdf = item_path
                .extension()
                .map(|e| e == HDF_EXTENSION)
                .unwrap_or(false);
            if is_hdf && name.starts_with(&prefix) && !name.ends_with(RAW_ONLY_SUFFIX) {
                files.push(item_path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Construct the run string using the TimePix converter format
    fn get_run_str(&self, run_number: i32) -> String {
        format!("run_{run_number:0>4}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.paths.insert(String::from("core"), root.to_path_buf());
        config
    }

    #[test]
    fn test_round_trip_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let config = make_config(dir.path());
        config.write_config_file(&path).unwrap();
        let loaded = Config::read_config_file(&path).unwrap();
        assert_eq!(loaded.file_system, "core");
        assert_eq!(loaded.get_data_prefix().unwrap(), dir.path());
    }

    #[test]
    fn test_unknown_file_system() {
        let mut config = Config::default();
        config.file_system = String::from("gpfs");
        assert!(matches!(
            config.get_data_prefix(),
            Err(ConfigError::UnknownFileSystem(_))
        ));
    }

    #[test]
    fn test_run_files() {
        let dir = tempfile::tempdir().unwrap();
        let tpx = dir.path().join("timepix");
        std::fs::create_dir(&tpx).unwrap();
        for name in [
            "run_0178_20190101-1200.hdf5",
            "run_0178_20190101-1200_rawOnly.hdf5",
            "run_1780_20190101-1300.hdf5",
            "run_0179_20190101-1400.hdf5",
            "run_0178_notes.txt",
        ] {
            std::fs::write(tpx.join(name), b"").unwrap();
        }
        let config = make_config(dir.path());
        let files = config.get_run_files(178).unwrap();
        assert_eq!(files, vec![tpx.join("run_0178_20190101-1200.hdf5")]);
        assert!(config.get_run_files(5).unwrap().is_empty());
    }

    #[test]
    fn test_missing_config_file() {
        assert!(matches!(
            Config::read_config_file(Path::new("/does/not/exist.yml")),
            Err(ConfigError::BadFilePath(_))
        ));
    }
}
