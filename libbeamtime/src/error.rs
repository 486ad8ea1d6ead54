use std::path::PathBuf;
use thiserror::Error;

use super::event::{Attribute, EventType};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config has no path prefix for file system {0}")]
    UnknownFileSystem(String),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Failed to load lookup document as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Lookup failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Lookup failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Run {0} is not part of the delay document")]
    RunNotInDocument(i32),
}

#[derive(Debug, Error)]
pub enum HDF5ReaderError {
    #[error("HDF5Reader failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("HDF5Reader could not open file {0:?} as it does not exist")]
    BadFilePath(PathBuf),
    #[error("HDF5Reader found no dataset {0} in the file")]
    MissingDataset(String),
    #[error("HDF5Reader found no attribute {1} on {0}")]
    MissingAttribute(String, String),
    #[error("The legacy file layout does not contain {0} events")]
    UnsupportedEventType(EventType),
    #[error("HDF5Reader failed due to event error: {0}")]
    EventError(#[from] EventError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CorrelationError {
    #[error("Facility train IDs ({0}) and timestamps ({1}) have unmatching length")]
    FacilityLengthMismatch(usize, usize),
    #[error("Detector trigger numbers ({0}) and timestamps ({1}) have unmatching length")]
    DetectorLengthMismatch(usize, usize),
    #[error("Found duplicates in the {0} sequence")]
    Duplicates(&'static str),
    #[error("Cannot correlate an empty {0} sequence")]
    Empty(&'static str),
    #[error("List of train IDs is not continuous, missing: {0:?}")]
    NotContinuous(Vec<i64>),
    #[error("Matching failed: {0} trigger numbers vs {1} train IDs")]
    MatchingFailed(usize, usize),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    #[error("Event column {0} has length {1}; expected {2}")]
    LengthMismatch(Attribute, usize, usize),
    #[error("Event data does not contain column {0}")]
    MissingColumn(Attribute),
    #[error("Unknown event attribute {0}")]
    UnknownAttribute(String),
    #[error("Unknown event type {0}; expected raw or centroided")]
    UnknownEventType(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("Choosing filter parameters and a fragment at the same time is not supported")]
    FiltersAndFragment,
    #[error("Attribute {0} does not exist for {1} events")]
    InvalidAttribute(Attribute, EventType),
    #[error("Filter on {0} has invalid bounds [{1}, {2}]")]
    InvalidBounds(Attribute, f64, f64),
    #[error("Could not parse filter {0}; expected attribute:start:end")]
    BadFilterString(String),
    #[error("Filter failed due to event error: {0}")]
    EventError(#[from] EventError),
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Invalid pulse ID interval ({0}, {1})")]
    InvalidInterval(i64, i64),
    #[error("Section length must be positive, got {0}")]
    InvalidSectionLength(i64),
    #[error("Pulse shape {0:?} does not match section shape {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),
    #[error("No usable pulses found in interval ({0}, {1})")]
    NoPulses(i64, i64),
    #[error("Aggregate failed due to TrainFile error: {0}")]
    TrainFileError(#[from] TrainFileError),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel {0} returned macropulse 0")]
    ZeroMacropulse(String),
    #[error("Channel {0} record is missing key {1}")]
    MissingKey(String, String),
    #[error("{0} is not a valid DOOCS history address")]
    NotHistoryAddress(String),
    #[error("Time {0} does not match the pattern YYYY-MM-DD HH:MM:SS")]
    BadTimeString(String),
    #[error("History of {0} returned no values")]
    EmptyHistory(String),
    #[error("Channel client failed: {0}")]
    ClientError(String),
}

#[derive(Debug, Error)]
pub enum TrainFileError {
    #[error("TrainFile failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("TrainFile {0:?} already exists")]
    FileExists(PathBuf),
    #[error("TrainFile {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Number of trains must be positive")]
    NoTrains,
    #[error("Key list must not be empty")]
    NoKeys,
    #[error("TrainFile failed due to channel error: {0}")]
    ChannelError(#[from] ChannelError),
    #[error("TrainFile failed due to shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HeatmapError {
    #[error("Heatmap binning needs first < last and a positive width")]
    BadBinning,
    #[error("Got {0} traces but {1} delays")]
    LengthMismatch(usize, usize),
    #[error("Traces have unequal length")]
    RaggedTraces,
    #[error("Cannot build a heatmap without traces")]
    NoTraces,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Assignment ambiguous, more than one HDF5 file for run {0}: {1:?}")]
    AmbiguousRun(i32, Vec<PathBuf>),
    #[error("Run failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Run failed due to configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Run failed due to lookup error: {0}")]
    LookupError(#[from] LookupError),
    #[error("Run failed due to HDF5Reader error: {0}")]
    HDFError(#[from] HDF5ReaderError),
    #[error("Run failed due to correlation error: {0}")]
    CorrelationError(#[from] CorrelationError),
    #[error("Run failed due to filter error: {0}")]
    FilterError(#[from] FilterError),
    #[error("Run failed due to event error: {0}")]
    EventError(#[from] EventError),
    #[error("Run failed due to heatmap error: {0}")]
    HeatmapError(#[from] HeatmapError),
}
