//! Matching of TimePix trigger numbers onto FLASH train IDs.
//!
//! The detector and the facility count pulses with independent clocks. The facility
//! train ID sequence is contiguous; the detector increments its trigger counter once per
//! readout but occasionally misses a pulse, which shows up as an increment of 2. The
//! correlator aligns the first detector timestamp onto the facility timestamps and then
//! walks the triggers, advancing one extra train for every skipped pulse.
use fxhash::FxHashSet;
use std::hash::Hash;

use super::error::CorrelationError;

/// Facility side of the correlation: one train ID per accelerator pulse
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacilityTiming {
    pub train_ids: Vec<i64>,
    pub timestamps: Vec<f64>,
}

/// Detector side of the correlation: one trigger number per readout
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectorTiming {
    pub trigger_numbers: Vec<i64>,
    pub timestamps: Vec<f64>,
}

/// Aligned trigger numbers and train IDs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
    pub trigger_numbers: Vec<i64>,
    pub train_ids: Vec<i64>,
    pub skipped: usize,
    pub start_index: usize,
}

impl Correlation {
    pub fn len(&self) -> usize {
        self.trigger_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trigger_numbers.is_empty()
    }

    /// Apply a constant calibration offset to every train ID. A NaN shift is ignored.
    ///
    /// Train IDs are integers, so the shift is rounded to the nearest integer.
    pub fn shifted(mut self, shift: f64) -> Self {
        if shift.is_nan() {
            return self;
        }
        if shift.fract() != 0.0 {
            log::warn!("TrainID shift {shift} is not integral, rounding to {}", shift.round());
        }
        let offset = shift.round() as i64;
        self.train_ids.iter_mut().for_each(|id| *id += offset);
        self
    }

    pub fn pairs(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.trigger_numbers
            .iter()
            .copied()
            .zip(self.train_ids.iter().copied())
    }
}

/// Index of the value closest to `target`. The first minimum wins, NaN values are skipped.
///
/// If returns None the slice holds no comparable value
pub fn find_nearest(values: &[f64], target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, value) in values.iter().enumerate() {
        let distance = (value - target).abs();
        if distance.is_nan() {
            continue;
        }
        match best {
            Some((_, d)) if d <= distance => (),
            _ => best = Some((idx, distance)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Integers between the first and the last ID which are not in the sequence, sorted
pub fn missing_elements(ids: &[i64]) -> Vec<i64> {
    let (first, last) = match (ids.first(), ids.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return vec![],
    };
    let present: FxHashSet<i64> = ids.iter().copied().collect();
    (first.min(last)..=first.max(last))
        .filter(|id| !present.contains(id))
        .collect()
}

fn has_duplicates<T: Eq + Hash>(values: impl Iterator<Item = T>) -> bool {
    let mut seen = FxHashSet::default();
    for value in values {
        if !seen.insert(value) {
            return true;
        }
    }
    false
}

fn check_preconditions(
    facility: &FacilityTiming,
    detector: &DetectorTiming,
) -> Result<(), CorrelationError> {
    if facility.train_ids.len() != facility.timestamps.len() {
        return Err(CorrelationError::FacilityLengthMismatch(
            facility.train_ids.len(),
            facility.timestamps.len(),
        ));
    }
    if detector.trigger_numbers.len() != detector.timestamps.len() {
        return Err(CorrelationError::DetectorLengthMismatch(
            detector.trigger_numbers.len(),
            detector.timestamps.len(),
        ));
    }
    if facility.train_ids.is_empty() {
        return Err(CorrelationError::Empty("train ID"));
    }
    if detector.trigger_numbers.is_empty() {
        return Err(CorrelationError::Empty("trigger number"));
    }
    if has_duplicates(facility.train_ids.iter()) {
        return Err(CorrelationError::Duplicates("train ID"));
    }
    if has_duplicates(facility.timestamps.iter().map(|t| t.to_bits())) {
        return Err(CorrelationError::Duplicates("facility timestamp"));
    }
    if has_duplicates(detector.trigger_numbers.iter()) {
        return Err(CorrelationError::Duplicates("trigger number"));
    }
    if has_duplicates(detector.timestamps.iter().map(|t| t.to_bits())) {
        return Err(CorrelationError::Duplicates("detector timestamp"));
    }
    Ok(())
}

/// Correlate detector trigger numbers to facility train IDs.
///
/// Triggers whose train would lie beyond the last facility train ID are dropped.
/// Only an increment of exactly 2 is treated as a skipped pulse.
pub fn correlate(
    facility: &FacilityTiming,
    detector: &DetectorTiming,
) -> Result<Correlation, CorrelationError> {
    check_preconditions(facility, detector)?;

    // Both sequences are non-empty at this point
    let start_index = find_nearest(&facility.timestamps, detector.timestamps[0])
        .ok_or(CorrelationError::Empty("facility timestamp"))?;

    let missing = missing_elements(&facility.train_ids[start_index..]);
    if !missing.is_empty() {
        return Err(CorrelationError::NotContinuous(missing));
    }

    let triggers = &detector.trigger_numbers;
    let mut trigger_numbers = vec![triggers[0]];
    let mut train_ids = vec![facility.train_ids[start_index]];
    let mut skipped = 0;
    for (idx, pair) in triggers.windows(2).enumerate() {
        if pair[1] - pair[0] == 2 {
            skipped += 1;
        }
        if let Some(train_id) = facility.train_ids.get(start_index + idx + 1 + skipped) {
            train_ids.push(*train_id);
            trigger_numbers.push(pair[1]);
        }
    }
    if trigger_numbers.len() != train_ids.len() {
        return Err(CorrelationError::MatchingFailed(
            trigger_numbers.len(),
            train_ids.len(),
        ));
    }
    let dropped = triggers.len() - trigger_numbers.len();
    if dropped > 0 {
        log::info!("{dropped} trigger(s) lie beyond the last train ID and were dropped");
    }

    Ok(Correlation {
        trigger_numbers,
        train_ids,
        skipped,
        start_index,
    })
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    fn facility(first_id: i64, n: usize) -> FacilityTiming {
        FacilityTiming {
            train_ids: (0..n as i64).map(|i| first_id + i).collect(),
            timestamps: (0..n).map(|i| i as f64 * 100.0).collect(),
        }
    }

    fn detector(triggers: &[i64], first_ts: f64) -> DetectorTiming {
        DetectorTiming {
            trigger_numbers: triggers.to_vec(),
            timestamps: triggers
                .iter()
                .map(|t| first_ts + (*t - triggers[0]) as f64 * 100.0)
                .collect(),
        }
    }

    #[test]
    fn test_missing_elements() {
        assert_eq!(missing_elements(&[5, 6, 8, 9]), vec![7]);
        assert_eq!(missing_elements(&[5, 6, 7]), Vec::<i64>::new());
        assert_eq!(missing_elements(&[]), Vec::<i64>::new());
        assert_eq!(missing_elements(&[1, 4]), vec![2, 3]);
    }

    #[test]
    fn test_find_nearest() {
        assert_eq!(find_nearest(&[0.0, 10.0, 20.0], 12.0), Some(1));
        assert_eq!(find_nearest(&[0.0, 10.0, 20.0], 15.0), Some(1));
        assert_eq!(find_nearest(&[0.0, 10.0, 20.0], 99.0), Some(2));
        assert_eq!(find_nearest(&[], 1.0), None);
        assert_eq!(find_nearest(&[0.0, f64::NAN, 100.0], 1.0), Some(0));
        assert_eq!(find_nearest(&[f64::NAN, 50.0], 1.0), Some(1));
        assert_eq!(find_nearest(&[f64::NAN], 1.0), None);
    }

    #[test]
    fn test_nan_timestamp_keeps_alignment() {
        let facility = FacilityTiming {
            train_ids: (10..=14).collect(),
            timestamps: vec![0.0, f64::NAN, 200.0, 300.0, 400.0],
        };
        let detector = DetectorTiming {
            trigger_numbers: vec![0, 1],
            timestamps: vec![1.0, 101.0],
        };
        let corr = correlate(&facility, &detector).unwrap();
        assert_eq!(corr.start_index, 0);
        assert_eq!(corr.train_ids, vec![10, 11]);
    }

    #[test]
    fn test_larger_gap_is_not_a_skip() {
        let corr = correlate(&facility(0, 10), &detector(&[0, 1, 4], 0.0)).unwrap();
        assert_eq!(corr.skipped, 0);
        assert_eq!(corr.trigger_numbers, vec![0, 1, 4]);
        assert_eq!(corr.train_ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_single_skip() {
        let facility = facility(1000, 10);
        let detector = detector(&[0, 1, 2, 4, 5], 210.0);
        let corr = correlate(&facility, &detector).unwrap();
        assert_eq!(corr.start_index, 2);
        assert_eq!(corr.skipped, 1);
        assert_eq!(corr.trigger_numbers, vec![0, 1, 2, 4, 5]);
        assert_eq!(corr.train_ids, vec![1002, 1003, 1004, 1006, 1007]);
    }

    #[test]
    fn test_no_skip() {
        let corr = correlate(&facility(50, 5), &detector(&[10, 11, 12], 0.0)).unwrap();
        assert_eq!(corr.skipped, 0);
        assert_eq!(corr.train_ids, vec![50, 51, 52]);
    }

    #[test]
    fn test_tail_is_dropped() {
        let corr = correlate(&facility(0, 4), &detector(&[0, 1, 2, 3, 4, 5], 100.0)).unwrap();
        assert_eq!(corr.trigger_numbers, vec![0, 1, 2]);
        assert_eq!(corr.train_ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_preconditions() {
        let mut bad = facility(0, 5);
        bad.timestamps.pop();
        assert_eq!(
            correlate(&bad, &detector(&[0, 1], 0.0)),
            Err(CorrelationError::FacilityLengthMismatch(5, 4))
        );

        let mut dup = facility(0, 5);
        dup.train_ids[3] = 1;
        assert_eq!(
            correlate(&dup, &detector(&[0, 1], 0.0)),
            Err(CorrelationError::Duplicates("train ID"))
        );

        let det = DetectorTiming {
            trigger_numbers: vec![0, 1, 1],
            timestamps: vec![0.0, 1.0, 2.0],
        };
        assert_eq!(
            correlate(&facility(0, 5), &det),
            Err(CorrelationError::Duplicates("trigger number"))
        );

        let mut short = detector(&[0, 1, 2], 0.0);
        short.timestamps.pop();
        assert_eq!(
            correlate(&facility(0, 5), &short),
            Err(CorrelationError::DetectorLengthMismatch(3, 2))
        );

        let empty = FacilityTiming::default();
        assert_eq!(
            correlate(&empty, &detector(&[0, 1], 0.0)),
            Err(CorrelationError::Empty("train ID"))
        );
        assert_eq!(
            correlate(&facility(0, 5), &DetectorTiming::default()),
            Err(CorrelationError::Empty("trigger number"))
        );

        let mut same_ts = facility(0, 5);
        same_ts.timestamps[4] = 100.0;
        assert_eq!(
            correlate(&same_ts, &detector(&[0, 1], 0.0)),
            Err(CorrelationError::Duplicates("facility timestamp"))
        );

        let det = DetectorTiming {
            trigger_numbers: vec![0, 1, 2],
            timestamps: vec![0.0, 100.0, 100.0],
        };
        assert_eq!(
            correlate(&facility(0, 5), &det),
            Err(CorrelationError::Duplicates("detector timestamp"))
        );

        let gap = FacilityTiming {
            train_ids: vec![1, 2, 4, 5],
            timestamps: vec![0.0, 100.0, 200.0, 300.0],
        };
        assert_eq!(
            correlate(&gap, &detector(&[0, 1], 0.0)),
            Err(CorrelationError::NotContinuous(vec![3]))
        );
        // the gap before the alignment index does not matter
        let corr = correlate(&gap, &detector(&[0, 1], 200.0)).unwrap();
        assert_eq!(corr.train_ids, vec![4, 5]);
    }

    #[test]
    fn test_shift() {
        let corr = correlate(&facility(100, 5), &detector(&[0, 1], 0.0)).unwrap();
        assert_eq!(corr.clone().shifted(f64::NAN).train_ids, vec![100, 101]);
        assert_eq!(corr.clone().shifted(-3.0).train_ids, vec![97, 98]);
        let shifted = corr.shifted(2.0);
        assert_eq!(shifted.pairs().collect::<Vec<_>>(), vec![(0, 102), (1, 103)]);
    }
}
