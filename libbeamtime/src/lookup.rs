use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::error::LookupError;

fn read_yaml(path: &Path) -> Result<String, LookupError> {
    if !path.exists() {
        return Err(LookupError::BadFilePath(path.to_path_buf()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Cross reference from local (TimePix) run numbers to FLASH DAQ run numbers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunNumberTable {
    runs: BTreeMap<i32, i64>,
}

impl RunNumberTable {
    pub fn load(path: &Path) -> Result<Self, LookupError> {
        Self::from_yaml(&read_yaml(path)?)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self, LookupError> {
        Ok(serde_yaml::from_str::<Self>(yaml_str)?)
    }

    /// If returns None the run has no corresponding FLASH DAQ run
    pub fn flash_run_number(&self, run_number: i32) -> Option<i64> {
        let found = self.runs.get(&run_number).copied();
        if found.is_none() {
            log::warn!("Run {run_number} does not have a corresponding FLASH DAQ run number.");
        }
        found
    }
}

/// Pump-probe delay stage position per run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelayTable {
    pp_delay: BTreeMap<i32, f64>,
}

impl DelayTable {
    pub fn load(path: &Path) -> Result<Self, LookupError> {
        Self::from_yaml(&read_yaml(path)?)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self, LookupError> {
        Ok(serde_yaml::from_str::<Self>(yaml_str)?)
    }

    /// If returns None the run has no pump-probe delay
    pub fn delay(&self, run_number: i32) -> Option<f64> {
        let found = self.pp_delay.get(&run_number).copied();
        if found.is_none() {
            log::warn!("Run {run_number} does not have pump-probe delay.");
        }
        found
    }

    /// Runs and delays from `first` to `last` (inclusive). Both ends must be in the document.
    pub fn runs_in_interval(&self, first: i32, last: i32) -> Result<Vec<(i32, f64)>, LookupError> {
        for run in [first, last] {
            if !self.pp_delay.contains_key(&run) {
                return Err(LookupError::RunNotInDocument(run));
            }
        }
        Ok(self
            .pp_delay
            .range(first..=last)
            .map(|(run, delay)| (*run, *delay))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_numbers() {
        let table = RunNumberTable::from_yaml("863: 32474\n864: 32475\n").unwrap();
        assert_eq!(table.flash_run_number(863), Some(32474));
        assert_eq!(table.flash_run_number(1), None);
    }

    #[test]
    fn test_delays() {
        let table =
            DelayTable::from_yaml("pp_delay:\n  10: 1.5\n  11: 2.0\n  13: 1.5\n").unwrap();
        assert_eq!(table.delay(11), Some(2.0));
        assert_eq!(table.delay(12), None);
        assert_eq!(
            table.runs_in_interval(10, 13).unwrap(),
            vec![(10, 1.5), (11, 2.0), (13, 1.5)]
        );
        assert!(matches!(
            table.runs_in_interval(9, 13),
            Err(LookupError::RunNotInDocument(9))
        ));
    }

    #[test]
    fn test_missing_document() {
        assert!(matches!(
            DelayTable::load(Path::new("/no/such/pp_delay.yaml")),
            Err(LookupError::BadFilePath(_))
        ));
    }
}
