use hdf5::File;
use ndarray::{Array1, ArrayD};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::correlation::{DetectorTiming, FacilityTiming};
use super::error::HDF5ReaderError;
use super::event::{Attribute, EventData, EventType};

const TIMING_NAME: &str = "timing";
const TIMEPIX_TIMING_NAME: &str = "timing/timepix";
const FACILITY_TIMING_NAME: &str = "timing/facility";
const TRIGGER_NR_NAME: &str = "trigger nr";
const TRAIN_ID_NAME: &str = "train id";
const TIMESTAMP_NAME: &str = "timestamp";
const NR_EVENTS_ATTR: &str = "nr events";
const SHIFT_ATTR: &str = "shift";
const CORR_COEFF_ATTR: &str = "corr coeff";

// Files written before the timing groups were introduced
const LEGACY_TRIGGER_NR: &str = "tpx3Times/triggerNr";
const LEGACY_TRIGGER_TS: &str = "tpx3Times/ns";
const LEGACY_TRAIN_ID: &str = "x2Times/bunchID";
const LEGACY_TRAIN_TS: &str = "x2Times/ns";
const LEGACY_TRIGGER_COLUMN: &str = "nr";

// Structure (grouped layout)
// raw - nr events
// |---- x, y, tof, tot, trigger nr (dset)
// centroided - nr events
// |---- x, y, tof, tot avg, tot max, clustersize, trigger nr (dset)
// timing
// |---- timepix - nr events
// |    |---- trigger nr, timestamp (dset)
// |---- facility - nr events, shift, corr coeff
// |    |---- train id, timestamp (dset)
//
// Structure (legacy layout)
// raw
// |---- x, y, tof, nr (dset)
// tpx3Times
// |---- triggerNr, ns (dset)
// x2Times
// |---- bunchID, ns (dset)

/// The on-disk schema of a TimePix file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Grouped,
    Legacy,
}

/// Scalar attributes stored alongside the grouped layout
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunAttributes {
    pub recorded_triggers: u64,
    pub recorded_train_ids: u64,
    pub number_of_raw_events: u64,
    pub number_of_centroided_events: u64,
    pub train_id_shift: f64,
    pub corr_coeff: f64,
}

/// A simple struct which wraps around the hdf5-rust library.
///
/// Opens a TimePix HDF5 file read-only. The handle is released when the reader is dropped.
#[derive(Debug)]
pub struct TimepixFile {
    file_handle: File,
    path: PathBuf,
    layout: Layout,
}

impl TimepixFile {
    /// Open the file and detect its layout
    pub fn open(path: &Path) -> Result<Self, HDF5ReaderError> {
        if !path.exists() {
            return Err(HDF5ReaderError::BadFilePath(path.to_path_buf()));
        }
        let file_handle = File::open(path)?;
        let layout = if file_handle.link_exists(TIMING_NAME) {
            Layout::Grouped
        } else {
            Layout::Legacy
        };
        if let Ok(meta) = path.metadata() {
            log::debug!(
                "Opened {} ({}, {:?} layout)",
                path.to_string_lossy(),
                human_bytes::human_bytes(meta.len() as f64),
                layout
            );
        }
        Ok(Self {
            file_handle,
            path: path.to_path_buf(),
            layout,
        })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_attr(&self, group: &str, name: &str) -> Result<f64, HDF5ReaderError> {
        let group_handle = self.file_handle.group(group)?;
        if !group_handle.attr_names()?.iter().any(|n| n == name) {
            return Err(HDF5ReaderError::MissingAttribute(
                group.to_string(),
                name.to_string(),
            ));
        }
        Ok(group_handle.attr(name)?.read_scalar::<f64>()?)
    }

    /// Read the run attributes. The legacy layout has none and returns None.
    pub fn read_attributes(&self) -> Result<Option<RunAttributes>, HDF5ReaderError> {
        if self.layout == Layout::Legacy {
            return Ok(None);
        }
        Ok(Some(RunAttributes {
            recorded_triggers: self.read_attr(TIMEPIX_TIMING_NAME, NR_EVENTS_ATTR)? as u64,
            recorded_train_ids: self.read_attr(FACILITY_TIMING_NAME, NR_EVENTS_ATTR)? as u64,
            number_of_raw_events: self.read_attr(EventType::Raw.group_name(), NR_EVENTS_ATTR)?
                as u64,
            number_of_centroided_events: self
                .read_attr(EventType::Centroided.group_name(), NR_EVENTS_ATTR)?
                as u64,
            train_id_shift: self.read_attr(FACILITY_TIMING_NAME, SHIFT_ATTR)?,
            corr_coeff: self.read_attr(FACILITY_TIMING_NAME, CORR_COEFF_ATTR)?,
        }))
    }

    fn dataset(&self, name: &str) -> Result<hdf5::Dataset, HDF5ReaderError> {
        if !self.file_handle.link_exists(name) {
            return Err(HDF5ReaderError::MissingDataset(name.to_string()));
        }
        Ok(self.file_handle.dataset(name)?)
    }

    fn column_path(
        &self,
        event_type: &EventType,
        attribute: &Attribute,
    ) -> Result<String, HDF5ReaderError> {
        match (self.layout, event_type) {
            (Layout::Legacy, EventType::Centroided) => {
                Err(HDF5ReaderError::UnsupportedEventType(*event_type))
            }
            (Layout::Legacy, EventType::Raw) if *attribute == Attribute::TriggerNr => {
                Ok(format!("{}/{}", event_type.group_name(), LEGACY_TRIGGER_COLUMN))
            }
            _ => Ok(format!(
                "{}/{}",
                event_type.group_name(),
                attribute.dataset_name()
            )),
        }
    }

    /// Read a single event column
    pub fn read_column(
        &self,
        event_type: &EventType,
        attribute: &Attribute,
    ) -> Result<Array1<f64>, HDF5ReaderError> {
        let path = self.column_path(event_type, attribute)?;
        Ok(self.dataset(&path)?.read_1d::<f64>()?)
    }

    /// Read a set of event columns into parallel event data
    pub fn read_events(
        &self,
        event_type: &EventType,
        attributes: &[Attribute],
    ) -> Result<EventData, HDF5ReaderError> {
        let mut columns = BTreeMap::new();
        for attribute in attributes {
            columns.insert(*attribute, self.read_column(event_type, attribute)?);
        }
        Ok(EventData::new(columns)?)
    }

    pub fn read_facility_timing(&self) -> Result<FacilityTiming, HDF5ReaderError> {
        let (ids, stamps) = match self.layout {
            Layout::Grouped => (
                format!("{FACILITY_TIMING_NAME}/{TRAIN_ID_NAME}"),
                format!("{FACILITY_TIMING_NAME}/{TIMESTAMP_NAME}"),
            ),
            Layout::Legacy => (LEGACY_TRAIN_ID.to_string(), LEGACY_TRAIN_TS.to_string()),
        };
        Ok(FacilityTiming {
            train_ids: self.dataset(&ids)?.read_raw::<i64>()?,
            timestamps: self.dataset(&stamps)?.read_raw::<f64>()?,
        })
    }

    pub fn read_detector_timing(&self) -> Result<DetectorTiming, HDF5ReaderError> {
        let (triggers, stamps) = match self.layout {
            Layout::Grouped => (
                format!("{TIMEPIX_TIMING_NAME}/{TRIGGER_NR_NAME}"),
                format!("{TIMEPIX_TIMING_NAME}/{TIMESTAMP_NAME}"),
            ),
            Layout::Legacy => (LEGACY_TRIGGER_NR.to_string(), LEGACY_TRIGGER_TS.to_string()),
        };
        Ok(DetectorTiming {
            trigger_numbers: self.dataset(&triggers)?.read_raw::<i64>()?,
            timestamps: self.dataset(&stamps)?.read_raw::<f64>()?,
        })
    }

    /// Number of recorded FEL trains, i.e. the number of detector triggers
    pub fn number_of_trains(&self) -> Result<usize, HDF5ReaderError> {
        let name = match self.layout {
            Layout::Grouped => format!("{TIMEPIX_TIMING_NAME}/{TRIGGER_NR_NAME}"),
            Layout::Legacy => LEGACY_TRIGGER_NR.to_string(),
        };
        Ok(self.dataset(&name)?.size())
    }

    /// Read any numeric dataset by its full path
    pub fn read_dataset(&self, name: &str) -> Result<ArrayD<f64>, HDF5ReaderError> {
        Ok(self.dataset(name)?.read_dyn::<f64>()?)
    }
}

/// Writers for scratch files used by the unit tests of this crate
#[cfg(test)]
pub(crate) mod test_files {
    use super::*;
    use ndarray::Array1;

    pub struct RunContents {
        pub train_ids: Vec<i64>,
        pub train_ts: Vec<f64>,
        pub triggers: Vec<i64>,
        pub trigger_ts: Vec<f64>,
        pub shift: f64,
    }

    impl Default for RunContents {
        fn default() -> Self {
            Self {
                train_ids: (1000..1010).collect(),
                train_ts: (0..10).map(|i| i as f64 * 100.0).collect(),
                triggers: vec![0, 1, 2, 4, 5],
                trigger_ts: vec![205.0, 305.0, 405.0, 605.0, 705.0],
                shift: f64::NAN,
            }
        }
    }

    fn write_column(group: &hdf5::Group, name: &str, data: &[f64]) -> hdf5::Result<()> {
        group
            .new_dataset_builder()
            .with_data(&Array1::from(data.to_vec()))
            .create(name)?;
        Ok(())
    }

    fn write_nr_events(group: &hdf5::Group, n: usize) -> hdf5::Result<()> {
        group
            .new_attr::<u64>()
            .create(NR_EVENTS_ATTR)?
            .write_scalar(&(n as u64))?;
        Ok(())
    }

    /// Write a grouped layout file with six raw and four centroided events
    pub fn write_grouped(path: &Path, contents: &RunContents) -> hdf5::Result<()> {
        let file = File::create(path)?;
        let raw = file.create_group("raw")?;
        write_column(&raw, "x", &[10.0, 120.0, 130.0, 140.0, 200.0, 125.0])?;
        write_column(&raw, "y", &[10.0, 100.0, 110.0, 120.0, 200.0, 105.0])?;
        write_column(&raw, "tof", &[0.5e-6, 1.2e-6, 1.5e-6, 1.8e-6, 1.5e-6, 3.0e-6])?;
        write_column(&raw, "tot", &[25.0, 50.0, 75.0, 100.0, 25.0, 50.0])?;
        write_column(&raw, "trigger nr", &[0.0, 0.0, 1.0, 2.0, 4.0, 5.0])?;
        write_nr_events(&raw, 6)?;

        let centroided = file.create_group("centroided")?;
        write_column(&centroided, "x", &[120.0, 130.0, 140.0, 200.0])?;
        write_column(&centroided, "y", &[100.0, 110.0, 120.0, 200.0])?;
        write_column(&centroided, "tof", &[1.2e-6, 1.5e-6, 1.8e-6, 1.5e-6])?;
        write_column(&centroided, "tot avg", &[40.0, 60.0, 80.0, 20.0])?;
        write_column(&centroided, "tot max", &[50.0, 75.0, 100.0, 25.0])?;
        write_column(&centroided, "clustersize", &[3.0, 4.0, 2.0, 1.0])?;
        write_column(&centroided, "trigger nr", &[0.0, 1.0, 2.0, 4.0])?;
        write_nr_events(&centroided, 4)?;

        let timing = file.create_group(TIMING_NAME)?;
        let timepix = timing.create_group("timepix")?;
        timepix
            .new_dataset_builder()
            .with_data(&Array1::from(contents.triggers.clone()))
            .create(TRIGGER_NR_NAME)?;
        write_column(&timepix, TIMESTAMP_NAME, &contents.trigger_ts)?;
        write_nr_events(&timepix, contents.triggers.len())?;

        let facility = timing.create_group("facility")?;
        facility
            .new_dataset_builder()
            .with_data(&Array1::from(contents.train_ids.clone()))
            .create(TRAIN_ID_NAME)?;
        write_column(&facility, TIMESTAMP_NAME, &contents.train_ts)?;
        write_nr_events(&facility, contents.train_ids.len())?;
        facility
            .new_attr::<f64>()
            .create(SHIFT_ATTR)?
            .write_scalar(&contents.shift)?;
        facility
            .new_attr::<f64>()
            .create(CORR_COEFF_ATTR)?
            .write_scalar(&0.98)?;
        Ok(())
    }

    /// Write a legacy layout file with four raw events
    pub fn write_legacy(path: &Path) -> hdf5::Result<()> {
        let file = File::create(path)?;
        let raw = file.create_group("raw")?;
        write_column(&raw, "x", &[1.0, 2.0, 3.0, 4.0])?;
        write_column(&raw, "y", &[1.0, 2.0, 3.0, 4.0])?;
        write_column(&raw, "tof", &[1.0e-6, 2.0e-6, 3.0e-6, 4.0e-6])?;
        write_column(&raw, LEGACY_TRIGGER_COLUMN, &[0.0, 0.0, 1.0, 2.0])?;
        let tpx = file.create_group("tpx3Times")?;
        tpx.new_dataset_builder()
            .with_data(&Array1::from(vec![0i64, 1, 2]))
            .create("triggerNr")?;
        write_column(&tpx, "ns", &[10.0, 110.0, 210.0])?;
        let x2 = file.create_group("x2Times")?;
        x2.new_dataset_builder()
            .with_data(&Array1::from(vec![7i64, 8, 9, 10]))
            .create("bunchID")?;
        write_column(&x2, "ns", &[0.0, 100.0, 200.0, 300.0])?;
        Ok(())
    }
}
