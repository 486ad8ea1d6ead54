use hdf5::types::VarLenUnicode;
use hdf5::File;
use ndarray::{s, ArrayD, Axis};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::aggregate::PulseSource;
use super::channel::{ChannelRecord, ChannelValue, MACROPULSE_KEY};
use super::error::{AggregateError, TrainFileError};

/// Writes channel records, one row per train, into a new HDF5 file.
///
/// Numeric keys become datasets of shape (trains,) or (trains, rows, cols). Text keys
/// are constant per channel and are stored once as file attributes.
#[derive(Debug)]
pub struct TrainFileWriter {
    file_handle: File,
    keys: Vec<String>,
    number_of_trains: usize,
    trains_written: usize,
}

// Structure
// <file> - text channel keys as attributes
// |---- <numeric key>(dset) [trains] or [trains, rows, cols]
// |---- macropulse(dset) [trains]

impl TrainFileWriter {
    /// Create the file and its datasets using `template` for the shapes and types
    pub fn new(
        path: &Path,
        template: &ChannelRecord,
        keys: &[&str],
        number_of_trains: usize,
    ) -> Result<Self, TrainFileError> {
        let file_handle = File::create(path)?;
        let mut numeric_keys = Vec::new();
        for key in keys {
            match template.get(key) {
                Some(ChannelValue::Int(_)) => {
                    file_handle
                        .new_dataset::<i64>()
                        .shape(number_of_trains)
                        .create(*key)?;
                }
                Some(ChannelValue::Float(_)) => {
                    file_handle
                        .new_dataset::<f64>()
                        .shape(number_of_trains)
                        .create(*key)?;
                }
                Some(ChannelValue::Array(array)) => {
                    let (rows, cols) = array.dim();
                    file_handle
                        .new_dataset::<f64>()
                        .shape((number_of_trains, rows, cols))
                        .create(*key)?;
                }
                Some(ChannelValue::Text(text)) => {
                    let value = match VarLenUnicode::from_str(text) {
                        Ok(v) => v,
                        Err(e) => {
                            log::warn!("Could not store {key} as attribute: {e}");
                            continue;
                        }
                    };
                    file_handle
                        .new_attr::<VarLenUnicode>()
                        .create(*key)?
                        .write_scalar(&value)?;
                    log::info!(
                        "The following key is a string and therefore appended as file.attribute: {key}"
                    );
                    continue;
                }
                None => continue,
            }
            numeric_keys.push(key.to_string());
        }
        Ok(Self {
            file_handle,
            keys: numeric_keys,
            number_of_trains,
            trains_written: 0,
        })
    }

    /// Write the next train. Keys missing from the record are left unwritten.
    pub fn write_train(&mut self, record: &ChannelRecord) -> Result<(), TrainFileError> {
        if self.trains_written >= self.number_of_trains {
            log::warn!("TrainFile is full, dropping train {:?}", record.macropulse());
            return Ok(());
        }
        let row = self.trains_written;
        for key in self.keys.iter() {
            let dataset = self.file_handle.dataset(key)?;
            match record.get(key) {
                Some(ChannelValue::Int(i)) => dataset.write_slice(&[*i][..], s![row..row + 1])?,
                Some(ChannelValue::Float(f)) => {
                    dataset.write_slice(&[*f][..], s![row..row + 1])?
                }
                Some(ChannelValue::Array(array)) => {
                    if let Err(e) = dataset.write_slice(array, s![row, .., ..]) {
                        log::warn!("Could not write {key} of train {row}: {e}");
                    }
                }
                _ => log::warn!("Train {row} has no numeric value for {key}"),
            }
        }
        self.trains_written += 1;
        Ok(())
    }

    /// Consume the writer, closing the file
    pub fn close(self) {
        if self.trains_written < self.number_of_trains {
            log::warn!(
                "Only {} of {} trains were written",
                self.trains_written,
                self.number_of_trains
            );
        }
    }
}

/// Read access to a file written by [`TrainFileWriter`]
#[derive(Debug)]
pub struct TrainFile {
    file_handle: File,
    path: PathBuf,
}

impl TrainFile {
    pub fn open(path: &Path) -> Result<Self, TrainFileError> {
        if !path.is_file() {
            return Err(TrainFileError::BadFilePath(path.to_path_buf()));
        }
        Ok(Self {
            file_handle: File::open(path)?,
            path: path.to_path_buf(),
        })
    }

    /// Dataset names, attribute names and number of trains, logged and returned
    pub fn contains(&self) -> Result<(Vec<String>, Vec<String>, usize), TrainFileError> {
        let datasets = self.file_handle.member_names()?;
        let attributes = self.file_handle.attr_names()?;
        let trains = self.number_of_trains()?;
        log::info!("Datasets: {datasets:?}");
        log::info!("Attributes: {attributes:?}");
        log::info!("Number of trains in file: {trains}");
        Ok((datasets, attributes, trains))
    }

    pub fn number_of_trains(&self) -> Result<usize, TrainFileError> {
        if !self.file_handle.link_exists(MACROPULSE_KEY) {
            return Ok(0);
        }
        Ok(self.file_handle.dataset(MACROPULSE_KEY)?.size())
    }

    /// Data of a channel key. If returns None the key was not recorded.
    pub fn channel_data(&self, key: &str) -> Result<Option<ArrayD<f64>>, TrainFileError> {
        if !self.file_handle.link_exists(key) {
            log::warn!("{key} is not included in {}", self.path.to_string_lossy());
            return Ok(None);
        }
        Ok(Some(self.file_handle.dataset(key)?.read_dyn::<f64>()?))
    }

    /// Text attribute of the file. If returns None the attribute does not exist.
    pub fn attribute(&self, key: &str) -> Result<Option<String>, TrainFileError> {
        if !self.file_handle.attr_names()?.iter().any(|n| n == key) {
            return Ok(None);
        }
        let value = self
            .file_handle
            .attr(key)?
            .read_scalar::<VarLenUnicode>()?;
        Ok(Some(value.as_str().to_string()))
    }

    pub fn macropulses(&self) -> Result<Vec<i64>, TrainFileError> {
        Ok(self.file_handle.dataset(MACROPULSE_KEY)?.read_raw::<i64>()?)
    }

    /// Use a recorded key as a pulse source for run averages
    pub fn source<'a>(&'a self, key: &str) -> ChannelSource<'a> {
        ChannelSource {
            file: self,
            key: key.to_string(),
        }
    }
}

/// One recorded key of a train file, addressed by macropulse
#[derive(Debug)]
pub struct ChannelSource<'a> {
    file: &'a TrainFile,
    key: String,
}

impl ChannelSource<'_> {
    /// Read the rows `lo..hi` of the key
    fn read_rows(&self, lo: usize, hi: usize) -> Result<ArrayD<f64>, TrainFileError> {
        let dataset = self.file.file_handle.dataset(&self.key)?;
        let rows = match dataset.ndim() {
            1 => dataset.read_slice_1d::<f64, _>(s![lo..hi])?.into_dyn(),
            2 => dataset.read_slice_2d::<f64, _>(s![lo..hi, ..])?.into_dyn(),
            _ => dataset
                .read_slice::<f64, _, ndarray::Ix3>(s![lo..hi, .., ..])?
                .into_dyn(),
        };
        Ok(rows)
    }
}

impl PulseSource for ChannelSource<'_> {
    fn pulse_id_interval(&self) -> Result<(i64, i64), AggregateError> {
        let pulses = self.file.macropulses()?;
        match (pulses.iter().min(), pulses.iter().max()) {
            (Some(first), Some(last)) => Ok((*first, *last + 1)),
            _ => Err(AggregateError::NoPulses(0, 0)),
        }
    }

    fn values_of_interval(&self, section: (i64, i64)) -> Result<Vec<ArrayD<f64>>, AggregateError> {
        // Macropulses are recorded in increasing order
        let pulses = self.file.macropulses()?;
        let lo = pulses.partition_point(|p| *p < section.0);
        let hi = pulses.partition_point(|p| *p < section.1);
        if lo >= hi {
            return Ok(vec![]);
        }
        let rows = self.read_rows(lo, hi)?;
        Ok(rows.axis_iter(Axis(0)).map(|row| row.to_owned()).collect())
    }
}
