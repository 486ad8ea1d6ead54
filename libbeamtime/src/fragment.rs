use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::error::LookupError;
use super::event::Attribute;
use super::filter::Filter;

/// Set used when a fragment is addressed without an experimental set
pub const DEFAULT_FRAGMENT_SET: &str = "fragments";

/// An ion species: a time-of-flight window, a detector bounding box and the VMI center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub tof_start: f64,
    pub tof_end: f64,
    pub center_x: f64,
    pub center_y: f64,
    #[serde(default = "default_start")]
    pub start_x: f64,
    #[serde(default = "default_end")]
    pub end_x: f64,
    #[serde(default = "default_start")]
    pub start_y: f64,
    #[serde(default = "default_end")]
    pub end_y: f64,
}

// Older fragment documents carry no bounding box; use the full 256 px sensor
fn default_start() -> f64 {
    -1.0
}

fn default_end() -> f64 {
    257.0
}

impl Fragment {
    /// The three simultaneous range filters selecting this fragment. Bounds are exclusive.
    pub fn filters(&self) -> [Filter; 3] {
        [
            Filter::exclusive(Attribute::Tof, self.tof_start, self.tof_end),
            Filter::exclusive(Attribute::X, self.start_x, self.end_x),
            Filter::exclusive(Attribute::Y, self.start_y, self.end_y),
        ]
    }

    pub fn center(&self) -> (f64, f64) {
        (self.center_x, self.center_y)
    }
}

/// All fragment definitions of a beamtime, grouped by experimental set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentTable {
    sets: BTreeMap<String, BTreeMap<String, Fragment>>,
}

impl FragmentTable {
    /// Read the fragment definitions from a YAML file
    pub fn load(path: &Path) -> Result<Self, LookupError> {
        if !path.exists() {
            return Err(LookupError::BadFilePath(path.to_path_buf()));
        }
        let yaml_str = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml_str)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self, LookupError> {
        Ok(serde_yaml::from_str::<Self>(yaml_str)?)
    }

    /// Look up a fragment by `set,fragment` or by a bare name in the default set.
    ///
    /// If returns None the fragment is not defined.
    pub fn get(&self, name: &str) -> Option<&Fragment> {
        let (set, fragment) = match name.split_once(',') {
            Some((set, fragment)) => (set.trim(), fragment.trim()),
            None => (DEFAULT_FRAGMENT_SET, name.trim()),
        };
        let found = self.sets.get(set).and_then(|s| s.get(fragment));
        if found.is_none() {
            log::warn!("Fragment {fragment} is not defined in set {set}");
        }
        found
    }

    pub fn names(&self) -> Vec<String> {
        self.sets
            .iter()
            .flat_map(|(set, fragments)| fragments.keys().map(move |f| format!("{set},{f}")))
            .collect()
    }
}
