//! Run averages of traces and images.
//!
//! A run can hold far more pulses than fit in memory. The pulse ID interval is cut into
//! sections, each section is averaged on its own and the section means are combined
//! weighted by their pulse counts. The result equals the plain mean over all pulses.
use ndarray::ArrayD;

use super::error::AggregateError;

/// Default section length for 1-D traces
pub const TRACE_SECTION_LENGTH: i64 = 1000;
/// Default section length for 2-D images
pub const IMAGE_SECTION_LENGTH: i64 = 100;

/// Anything that can deliver per-pulse values addressed by pulse ID
pub trait PulseSource {
    /// Pulse IDs covered by the source as a half-open interval
    fn pulse_id_interval(&self) -> Result<(i64, i64), AggregateError>;

    /// Values of all pulses with `section.0 <= id < section.1`, in pulse order
    fn values_of_interval(&self, section: (i64, i64)) -> Result<Vec<ArrayD<f64>>, AggregateError>;
}

/// Mean of one section and the number of pulses it was built from
#[derive(Debug, Clone, PartialEq)]
pub struct SectionAverage {
    pub mean: ArrayD<f64>,
    pub weight: usize,
}

/// Cut `interval` into contiguous sections of `section_length` pulses.
///
/// The last section ends exactly at `interval.1`. An empty interval gives one empty section.
pub fn section_id_intervals(
    interval: (i64, i64),
    section_length: i64,
) -> Result<Vec<(i64, i64)>, AggregateError> {
    let (start, end) = interval;
    if start > end {
        return Err(AggregateError::InvalidInterval(start, end));
    }
    if section_length <= 0 {
        return Err(AggregateError::InvalidSectionLength(section_length));
    }
    if start == end {
        return Ok(vec![(start, end)]);
    }
    let mut sections: Vec<(i64, i64)> = (start..end)
        .step_by(section_length as usize)
        .map(|s| (s, s + section_length))
        .collect();
    if let Some(last) = sections.last_mut() {
        last.1 = end;
    }
    Ok(sections)
}

/// Average the pulses of one section.
///
/// A pulse holding a non-finite value is discarded. If returns None the section has no
/// usable pulse.
pub fn section_average<S: PulseSource + ?Sized>(
    source: &S,
    section: (i64, i64),
) -> Result<Option<SectionAverage>, AggregateError> {
    let values = source.values_of_interval(section)?;
    let mut sum: Option<ArrayD<f64>> = None;
    let mut weight = 0;
    for value in values.iter() {
        if value.iter().any(|v| !v.is_finite()) {
            log::debug!("Discarding pulse with non-finite values in section {section:?}");
            continue;
        }
        match sum.as_mut() {
            None => sum = Some(value.clone()),
            Some(s) => {
                if s.shape() != value.shape() {
                    return Err(AggregateError::ShapeMismatch(
                        value.shape().to_vec(),
                        s.shape().to_vec(),
                    ));
                }
                *s += value;
            }
        }
        weight += 1;
    }
    Ok(sum.map(|s| SectionAverage {
        mean: s / weight as f64,
        weight,
    }))
}

/// Count weighted average of the section means over `interval`
pub fn interval_average<S: PulseSource + ?Sized>(
    source: &S,
    interval: (i64, i64),
    section_length: i64,
) -> Result<ArrayD<f64>, AggregateError> {
    let sections = section_id_intervals(interval, section_length)?;
    let mut total: Option<ArrayD<f64>> = None;
    let mut total_weight = 0;
    for section in sections {
        let average = match section_average(source, section)? {
            Some(a) => a,
            None => continue,
        };
        let weighted = average.mean * average.weight as f64;
        match total.as_mut() {
            None => total = Some(weighted),
            Some(t) => {
                if t.shape() != weighted.shape() {
                    return Err(AggregateError::ShapeMismatch(
                        weighted.shape().to_vec(),
                        t.shape().to_vec(),
                    ));
                }
                *t += &weighted;
            }
        }
        total_weight += average.weight;
    }
    log::info!("Averaged {total_weight} pulses in interval {interval:?}");
    match total {
        Some(t) if total_weight > 0 => Ok(t / total_weight as f64),
        _ => Err(AggregateError::NoPulses(interval.0, interval.1)),
    }
}

/// Average over every pulse of the source
pub fn run_average<S: PulseSource + ?Sized>(
    source: &S,
    section_length: i64,
) -> Result<ArrayD<f64>, AggregateError> {
    let interval = source.pulse_id_interval()?;
    interval_average(source, interval, section_length)
}
