use ndarray::ArrayD;
use std::path::{Path, PathBuf};

use super::config::Config;
use super::correlation::{correlate, Correlation};
use super::error::RunError;
use super::event::{Attribute, EventData, EventType};
use super::filter::{apply_filters, EventQuery, Filter};
use super::fragment::FragmentTable;
use super::hdf_reader::{RunAttributes, TimepixFile};
use super::lookup::{DelayTable, RunNumberTable};

/// Access to a single TimePix run.
///
/// Holds only the file location and the run attributes; every read opens the file and
/// closes it again before returning.
#[derive(Debug, Clone)]
pub struct TimepixRun {
    run_number: i32,
    hdf_file: PathBuf,
    attributes: Option<RunAttributes>,
    config: Config,
}

impl TimepixRun {
    /// Locate the run file and read its attributes.
    ///
    /// If returns None the run does not exist
    pub fn open(config: &Config, run_number: i32) -> Result<Option<Self>, RunError> {
        let mut files = config.get_run_files(run_number)?;
        if files.len() > 1 {
            return Err(RunError::AmbiguousRun(run_number, files));
        }
        let hdf_file = match files.pop() {
            Some(f) => f,
            None => {
                log::warn!("Run {run_number} not found!");
                return Ok(None);
            }
        };
        Ok(Some(Self::from_file(config, run_number, &hdf_file)?))
    }

    /// Use a known file for the run, skipping the directory search
    pub fn from_file(config: &Config, run_number: i32, path: &Path) -> Result<Self, RunError> {
        let attributes = TimepixFile::open(path)?.read_attributes()?;
        Ok(Self {
            run_number,
            hdf_file: path.to_path_buf(),
            attributes,
            config: config.clone(),
        })
    }

    pub fn run_number(&self) -> i32 {
        self.run_number
    }

    pub fn hdf_file(&self) -> &Path {
        &self.hdf_file
    }

    /// Run attributes; None for files written in the legacy layout
    pub fn attributes(&self) -> Option<&RunAttributes> {
        self.attributes.as_ref()
    }

    /// Calibration offset of the train IDs, NaN if unknown
    pub fn train_id_shift(&self) -> f64 {
        self.attributes
            .map(|a| a.train_id_shift)
            .unwrap_or(f64::NAN)
    }

    pub fn number_of_trains(&self) -> Result<usize, RunError> {
        Ok(TimepixFile::open(&self.hdf_file)?.number_of_trains()?)
    }

    /// Correlate trigger numbers with train IDs, optionally applying the stored shift
    pub fn trigger_train_ids(&self, shifted: bool) -> Result<Correlation, RunError> {
        let file = TimepixFile::open(&self.hdf_file)?;
        let facility = file.read_facility_timing()?;
        let detector = file.read_detector_timing()?;
        drop(file);
        let correlation = correlate(&facility, &detector)?;
        log::info!(
            "Run {}: matched {} triggers to train IDs, {} skipped pulse(s)",
            self.run_number,
            correlation.len(),
            correlation.skipped
        );
        if shifted {
            Ok(correlation.shifted(self.train_id_shift()))
        } else {
            Ok(correlation)
        }
    }

    /// Read and filter events.
    ///
    /// The query is validated before the file is touched. If returns None the requested
    /// fragment is not defined.
    pub fn events(
        &self,
        query: &EventQuery,
        fragments: &FragmentTable,
    ) -> Result<Option<EventData>, RunError> {
        query.validate()?;
        let filters: Vec<Filter> = match &query.fragment {
            Some(name) => match fragments.get(name) {
                Some(fragment) => fragment.filters().to_vec(),
                None => return Ok(None),
            },
            None => query.filters.clone(),
        };
        let required = query.required_attributes(&filters);
        let data = TimepixFile::open(&self.hdf_file)?.read_events(&query.event_type, &required)?;
        let filtered = apply_filters(&data, &filters)?;
        // Drop the columns that were only read for filtering
        let mut columns = std::collections::BTreeMap::new();
        for attribute in query.attributes.iter() {
            columns.insert(*attribute, filtered.column(attribute)?.clone());
        }
        Ok(Some(EventData::new(columns)?))
    }

    /// tof, x and y of all events of a fragment. Loads the fragment table from the config.
    pub fn events_of_fragment(
        &self,
        event_type: EventType,
        fragment: &str,
    ) -> Result<Option<EventData>, RunError> {
        let fragments = FragmentTable::load(&self.config.fragments)?;
        let query = EventQuery::new(event_type, &[Attribute::Tof, Attribute::X, Attribute::Y])
            .with_fragment(fragment);
        self.events(&query, &fragments)
    }

    /// tof, x and y of the events of a single trigger
    pub fn events_of_trigger(
        &self,
        event_type: EventType,
        trigger_nr: i64,
    ) -> Result<EventData, RunError> {
        let attributes = [Attribute::Tof, Attribute::X, Attribute::Y, Attribute::TriggerNr];
        let data = TimepixFile::open(&self.hdf_file)?.read_events(&event_type, &attributes)?;
        Ok(data.of_trigger(trigger_nr)?)
    }

    /// Pump-probe delay of this run. If returns None the run has no delay.
    pub fn pp_delay(&self) -> Result<Option<f64>, RunError> {
        let table = DelayTable::load(&self.config.get_pp_delay_path()?)?;
        Ok(table.delay(self.run_number))
    }

    /// FLASH DAQ run number. If returns None the run has no counterpart.
    pub fn flash_run_number(&self) -> Result<Option<i64>, RunError> {
        let table = RunNumberTable::load(&self.config.run_numbers)?;
        Ok(table.flash_run_number(self.run_number))
    }

    /// Raw access to any numeric dataset in the run file
    pub fn hdf_dataset(&self, name: &str) -> Result<ArrayD<f64>, RunError> {
        Ok(TimepixFile::open(&self.hdf_file)?.read_dataset(name)?)
    }
}

/// Number of trains for every run in `first..=last`; missing runs count 0.
///
/// `on_run` is called once after each run is counted.
pub fn trains_per_run<F: FnMut(i32, usize)>(
    config: &Config,
    first: i32,
    last: i32,
    mut on_run: F,
) -> Result<Vec<(i32, usize)>, RunError> {
    let mut trains = Vec::new();
    for run_number in first..=last {
        let n = match TimepixRun::open(config, run_number)? {
            Some(run) => run.number_of_trains()?,
            None => 0,
        };
        trains.push((run_number, n));
        on_run(run_number, n);
    }
    Ok(trains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::hdf_reader::test_files::{write_grouped, RunContents};
    use ndarray::array;

    const FRAGMENTS: &str = r#"
fragments:
  test_ion:
    tof_start: 1.0e-6
    tof_end: 2.0e-6
    center_x: 128
    center_y: 128
    start_x: 100
    end_x: 150
    start_y: 90
    end_y: 150
"#;

    fn setup(contents: &RunContents) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let tpx = dir.path().join("timepix");
        std::fs::create_dir(&tpx).unwrap();
        write_grouped(&tpx.join("run_0863_20190301.hdf5"), contents).unwrap();
        std::fs::write(dir.path().join("fragments.yaml"), FRAGMENTS).unwrap();
        std::fs::write(dir.path().join("run_numbers.yaml"), "863: 32474\n").unwrap();
        std::fs::write(dir.path().join("pp_delay.yaml"), "pp_delay:\n  863: 12.5\n").unwrap();

        let mut config = Config::default();
        config.paths.insert(String::from("core"), dir.path().to_path_buf());
        config.fragments = dir.path().join("fragments.yaml");
        config.run_numbers = dir.path().join("run_numbers.yaml");
        (dir, config)
    }

    #[test]
    fn test_missing_run() {
        let (_dir, config) = setup(&RunContents::default());
        assert!(TimepixRun::open(&config, 1).unwrap().is_none());
    }

    #[test]
    fn test_ambiguous_run() {
        let (dir, config) = setup(&RunContents::default());
        write_grouped(
            &dir.path().join("timepix/run_0863_20190302.hdf5"),
            &RunContents::default(),
        )
        .unwrap();
        assert!(matches!(
            TimepixRun::open(&config, 863),
            Err(RunError::AmbiguousRun(863, _))
        ));
    }

    #[test]
    fn test_lookups() {
        let (_dir, config) = setup(&RunContents::default());
        let run = TimepixRun::open(&config, 863).unwrap().unwrap();
        assert_eq!(run.flash_run_number().unwrap(), Some(32474));
        assert_eq!(run.pp_delay().unwrap(), Some(12.5));
        assert_eq!(run.number_of_trains().unwrap(), 5);
        assert_eq!(run.attributes().unwrap().corr_coeff, 0.98);
        let mut visited = Vec::new();
        let trains = trains_per_run(&config, 862, 863, |run, _| visited.push(run)).unwrap();
        assert_eq!(trains, vec![(862, 0), (863, 5)]);
        assert_eq!(visited, vec![862, 863]);
    }

    #[test]
    fn test_trigger_train_ids() {
        let contents = RunContents {
            shift: 2.0,
            ..Default::default()
        };
        let (_dir, config) = setup(&contents);
        let run = TimepixRun::open(&config, 863).unwrap().unwrap();
        let unshifted = run.trigger_train_ids(false).unwrap();
        assert_eq!(unshifted.skipped, 1);
        assert_eq!(unshifted.train_ids, vec![1002, 1003, 1004, 1006, 1007]);
        let shifted = run.trigger_train_ids(true).unwrap();
        assert_eq!(shifted.train_ids, vec![1004, 1005, 1006, 1008, 1009]);
    }

    #[test]
    fn test_events_with_filters() {
        let (_dir, config) = setup(&RunContents::default());
        let run = TimepixRun::open(&config, 863).unwrap().unwrap();
        let fragments = FragmentTable::default();

        let all = EventQuery::new(EventType::Raw, &[Attribute::X, Attribute::Tot]);
        assert_eq!(run.events(&all, &fragments).unwrap().unwrap().len(), 6);

        let query = EventQuery::new(EventType::Raw, &[Attribute::X])
            .with_filter(Filter::new(Attribute::Tof, 0.0, 1.5e-6))
            .with_filter(Filter::new(Attribute::Y, 100.0, 200.0));
        let events = run.events(&query, &fragments).unwrap().unwrap();
        assert_eq!(events.column(&Attribute::X).unwrap(), &array![120.0, 130.0, 200.0]);
        assert_eq!(events.attributes().count(), 1);
    }

    #[test]
    fn test_events_of_fragment() {
        let (_dir, config) = setup(&RunContents::default());
        let run = TimepixRun::open(&config, 863).unwrap().unwrap();
        let events = run
            .events_of_fragment(EventType::Raw, "test_ion")
            .unwrap()
            .unwrap();
        assert_eq!(events.column(&Attribute::X).unwrap(), &array![120.0, 130.0, 140.0]);
        assert!(run
            .events_of_fragment(EventType::Raw, "argon")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_usage_errors_before_file_access() {
        let (_dir, config) = setup(&RunContents::default());
        let run = TimepixRun::open(&config, 863).unwrap().unwrap();
        // Remove the file; a validation failure must not depend on it
        std::fs::remove_file(run.hdf_file()).unwrap();
        let fragments = FragmentTable::default();

        let query = EventQuery::new(EventType::Raw, &[Attribute::X])
            .with_filter(Filter::new(Attribute::Tof, 0.0, 1.0))
            .with_fragment("test_ion");
        assert!(matches!(
            run.events(&query, &fragments),
            Err(RunError::FilterError(FilterError::FiltersAndFragment))
        ));

        let query = EventQuery::new(EventType::Raw, &[Attribute::ClusterSize]);
        assert!(matches!(
            run.events(&query, &fragments),
            Err(RunError::FilterError(FilterError::InvalidAttribute(..)))
        ));
    }

    #[test]
    fn test_events_of_trigger() {
        let (_dir, config) = setup(&RunContents::default());
        let run = TimepixRun::open(&config, 863).unwrap().unwrap();
        let events = run.events_of_trigger(EventType::Centroided, 4).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events.column(&Attribute::X).unwrap(), &array![200.0]);
        let cs = run.hdf_dataset("centroided/clustersize").unwrap();
        assert_eq!(cs.len(), 4);
    }
}
