use bitvec::prelude::*;
use ndarray::Array1;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use super::error::EventError;

/// The two event representations written by the TimePix converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Raw,
    Centroided,
}

const RAW_ATTRIBUTES: [Attribute; 5] = [
    Attribute::X,
    Attribute::Y,
    Attribute::Tof,
    Attribute::Tot,
    Attribute::TriggerNr,
];

const CENTROIDED_ATTRIBUTES: [Attribute; 7] = [
    Attribute::X,
    Attribute::Y,
    Attribute::Tof,
    Attribute::TotAvg,
    Attribute::TotMax,
    Attribute::ClusterSize,
    Attribute::TriggerNr,
];

impl EventType {
    /// Name of the HDF5 group holding this representation
    pub fn group_name(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Centroided => "centroided",
        }
    }

    /// The attributes (datasets) which exist for this representation
    pub fn valid_attributes(&self) -> &'static [Attribute] {
        match self {
            Self::Raw => &RAW_ATTRIBUTES,
            Self::Centroided => &CENTROIDED_ATTRIBUTES,
        }
    }

    pub fn is_valid(&self, attribute: &Attribute) -> bool {
        self.valid_attributes().contains(attribute)
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.group_name())
    }
}

impl FromStr for EventType {
    type Err = EventError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(Self::Raw),
            "centroided" => Ok(Self::Centroided),
            _ => Err(EventError::UnknownEventType(s.to_string())),
        }
    }
}

/// A single per-event quantity, stored as one dataset per event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    X,
    Y,
    Tof,
    Tot,
    TotAvg,
    TotMax,
    ClusterSize,
    TriggerNr,
}

impl Attribute {
    /// Dataset name as written in the HDF5 file
    pub fn dataset_name(&self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Tof => "tof",
            Self::Tot => "tot",
            Self::TotAvg => "tot avg",
            Self::TotMax => "tot max",
            Self::ClusterSize => "clustersize",
            Self::TriggerNr => "trigger nr",
        }
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dataset_name())
    }
}

impl FromStr for Attribute {
    type Err = EventError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "tof" => Ok(Self::Tof),
            "tot" => Ok(Self::Tot),
            "tot avg" | "tot_avg" => Ok(Self::TotAvg),
            "tot max" | "tot_max" => Ok(Self::TotMax),
            "clustersize" => Ok(Self::ClusterSize),
            "trigger nr" | "trigger_nr" | "nr" => Ok(Self::TriggerNr),
            _ => Err(EventError::UnknownAttribute(s.to_string())),
        }
    }
}

/// Parallel event columns. Every column has the same number of events.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventData {
    columns: BTreeMap<Attribute, Array1<f64>>,
    n_events: usize,
}

impl EventData {
    /// Build from a set of columns, failing if the lengths disagree
    pub fn new(columns: BTreeMap<Attribute, Array1<f64>>) -> Result<Self, EventError> {
        let n_events = columns.values().next().map(|c| c.len()).unwrap_or(0);
        for (attribute, column) in columns.iter() {
            if column.len() != n_events {
                return Err(EventError::LengthMismatch(
                    *attribute,
                    column.len(),
                    n_events,
                ));
            }
        }
        Ok(Self { columns, n_events })
    }

    pub fn len(&self) -> usize {
        self.n_events
    }

    pub fn is_empty(&self) -> bool {
        self.n_events == 0
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.columns.keys()
    }

    pub fn column(&self, attribute: &Attribute) -> Result<&Array1<f64>, EventError> {
        self.columns
            .get(attribute)
            .ok_or(EventError::MissingColumn(*attribute))
    }

    /// Keep the events for which `mask` is true
    pub fn select(&self, mask: &BitSlice) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|(attribute, column)| {
                let kept: Array1<f64> = column
                    .iter()
                    .zip(mask.iter().by_vals())
                    .filter(|(_, keep)| *keep)
                    .map(|(value, _)| *value)
                    .collect();
                (*attribute, kept)
            })
            .collect::<BTreeMap<_, _>>();
        let n_events = mask[..self.n_events.min(mask.len())].count_ones();
        Self { columns, n_events }
    }

    /// Keep only the first `n` events, used to thin out data for display
    pub fn truncated(&self, n: usize) -> Self {
        let n_events = n.min(self.n_events);
        let columns = self
            .columns
            .iter()
            .map(|(attribute, column)| {
                (*attribute, column.slice(ndarray::s![..n_events]).to_owned())
            })
            .collect();
        Self { columns, n_events }
    }

    /// Events belonging to a single detector readout
    pub fn of_trigger(&self, trigger_nr: i64) -> Result<Self, EventError> {
        let triggers = self.column(&Attribute::TriggerNr)?;
        let mask: BitVec = triggers
            .iter()
            .map(|t| *t as i64 == trigger_nr)
            .collect();
        Ok(self.select(&mask))
    }
}
