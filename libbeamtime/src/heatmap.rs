use ndarray::{Array1, Array2, Axis};

use super::error::HeatmapError;

/// Indices of `delays` grouped by equal value, groups in increasing delay order
fn group_by_delay(delays: &[f64]) -> Vec<(f64, Vec<usize>)> {
    let mut order: Vec<usize> = (0..delays.len()).collect();
    order.sort_by(|a, b| delays[*a].total_cmp(&delays[*b]));
    let mut groups: Vec<(f64, Vec<usize>)> = Vec::new();
    for idx in order {
        match groups.last_mut() {
            Some((delay, members)) if *delay == delays[idx] => members.push(idx),
            _ => groups.push((delays[idx], vec![idx])),
        }
    }
    groups
}

fn check_traces(traces: &[Array1<f64>], delays: usize) -> Result<usize, HeatmapError> {
    let first = traces.first().ok_or(HeatmapError::NoTraces)?;
    if traces.len() != delays {
        return Err(HeatmapError::LengthMismatch(traces.len(), delays));
    }
    if traces.iter().any(|t| t.len() != first.len()) {
        return Err(HeatmapError::RaggedTraces);
    }
    Ok(first.len())
}

/// Number of trains for every unique delay, sorted by delay
pub fn trains_per_delay(
    delays: &[f64],
    trains: &[usize],
) -> Result<Vec<(f64, usize)>, HeatmapError> {
    if delays.len() != trains.len() {
        return Err(HeatmapError::LengthMismatch(trains.len(), delays.len()));
    }
    Ok(group_by_delay(delays)
        .into_iter()
        .map(|(delay, members)| (delay, members.iter().map(|i| trains[*i]).sum()))
        .collect())
}

/// Traces binned by delay. `image` is indexed `[sample, bin]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub bins: Vec<f64>,
    pub image: Array2<f64>,
    pub weights: Vec<usize>,
}

impl Heatmap {
    /// `binning` is (first bin centre, last bin centre, bin width). Bin `i` collects the
    /// delays in `[c - w/2, c + w/2)`; a bin without traces is a NaN column.
    pub fn new(
        traces: &[Array1<f64>],
        delays: &[f64],
        binning: (f64, f64, f64),
    ) -> Result<Self, HeatmapError> {
        let (first, last, width) = binning;
        if !(first < last) || !(width > 0.0) {
            return Err(HeatmapError::BadBinning);
        }
        let samples = check_traces(traces, delays.len())?;
        let n_bins = ((last - first) / width).round() as usize + 1;
        let bins: Vec<f64> = Array1::linspace(first, last, n_bins).to_vec();

        let mut image = Array2::from_elem((samples, n_bins), f64::NAN);
        let mut weights = vec![0; n_bins];
        for (i, center) in bins.iter().enumerate() {
            let lo = center - width / 2.0;
            let hi = center + width / 2.0;
            let mut sum = Array1::<f64>::zeros(samples);
            for (trace, delay) in traces.iter().zip(delays.iter()) {
                if *delay >= lo && *delay < hi {
                    sum += trace;
                    weights[i] += 1;
                }
            }
            if weights[i] > 0 {
                image.column_mut(i).assign(&(sum / weights[i] as f64));
            }
        }
        Ok(Self {
            bins,
            image,
            weights,
        })
    }

    /// Bin centres with the number of traces in each, also logged as a table
    pub fn frequency(&self) -> Vec<(f64, usize)> {
        let table: Vec<(f64, usize)> = self
            .bins
            .iter()
            .copied()
            .zip(self.weights.iter().copied())
            .collect();
        for (bin, weight) in table.iter() {
            log::info!("{bin:>12} {weight:>8}");
        }
        table
    }
}

/// Radial profiles of a pump-probe delay scan, averaged per unique delay
#[derive(Debug, Clone, PartialEq)]
pub struct DelayScan {
    pub delays: Vec<f64>,
    pub profiles: Vec<Array1<f64>>,
}

impl DelayScan {
    /// Every profile is normalised by the trains of its run before the runs of equal delay
    /// are averaged. Runs without trains are skipped.
    pub fn new(
        delays: &[f64],
        trains: &[usize],
        profiles: &[Array1<f64>],
    ) -> Result<Self, HeatmapError> {
        let length = check_traces(profiles, delays.len())?;
        if trains.len() != delays.len() {
            return Err(HeatmapError::LengthMismatch(trains.len(), delays.len()));
        }
        let mut scan = Self {
            delays: Vec::new(),
            profiles: Vec::new(),
        };
        for (delay, members) in group_by_delay(delays) {
            let mut sum = Array1::<f64>::zeros(length);
            let mut used = 0;
            for idx in members {
                if trains[idx] == 0 {
                    log::warn!("Skipping profile {idx} at delay {delay}: no trains");
                    continue;
                }
                sum += &(&profiles[idx] / trains[idx] as f64);
                used += 1;
            }
            if used == 0 {
                continue;
            }
            scan.delays.push(delay);
            scan.profiles.push(sum / used as f64);
        }
        log::info!("number of unique delays: {}", scan.delays.len());
        Ok(scan)
    }

    /// Profiles stacked as columns, indexed `[radius, delay]`
    pub fn image(&self) -> Array2<f64> {
        let length = self.profiles.first().map(|p| p.len()).unwrap_or(0);
        let mut image = Array2::zeros((length, self.profiles.len()));
        for (mut column, profile) in image.axis_iter_mut(Axis(1)).zip(self.profiles.iter()) {
            column.assign(profile);
        }
        image
    }

    /// Integral of every profile
    pub fn integrals(&self) -> Vec<f64> {
        self.profiles.iter().map(|p| p.sum()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_trains_per_delay() {
        let delays = [12.5, 10.0, 12.5, 11.0];
        let trains = [100, 50, 20, 7];
        assert_eq!(
            trains_per_delay(&delays, &trains).unwrap(),
            vec![(10.0, 50), (11.0, 7), (12.5, 120)]
        );
        assert_eq!(
            trains_per_delay(&delays, &trains[..2]),
            Err(HeatmapError::LengthMismatch(2, 4))
        );
    }

    #[test]
    fn test_heatmap_binning() {
        let traces = vec![array![1.0, 2.0], array![3.0, 4.0], array![10.0, 10.0]];
        let delays = [0.9, 1.4, 3.0];
        let heatmap = Heatmap::new(&traces, &delays, (1.0, 3.0, 1.0)).unwrap();
        assert_eq!(heatmap.bins, vec![1.0, 2.0, 3.0]);
        assert_eq!(heatmap.weights, vec![2, 0, 1]);
        assert_eq!(heatmap.image.column(0).to_vec(), vec![2.0, 3.0]);
        assert!(heatmap.image.column(1).iter().all(|v| v.is_nan()));
        assert_eq!(heatmap.image.column(2).to_vec(), vec![10.0, 10.0]);
        assert_eq!(heatmap.frequency()[2], (3.0, 1));
    }

    #[test]
    fn test_heatmap_usage_errors() {
        let traces = vec![array![1.0, 2.0], array![3.0]];
        assert_eq!(
            Heatmap::new(&traces, &[1.0, 2.0], (1.0, 0.0, 1.0)),
            Err(HeatmapError::BadBinning)
        );
        assert_eq!(
            Heatmap::new(&traces, &[1.0, 2.0], (0.0, 2.0, 1.0)),
            Err(HeatmapError::RaggedTraces)
        );
        assert_eq!(
            Heatmap::new(&traces, &[1.0], (0.0, 2.0, 1.0)),
            Err(HeatmapError::LengthMismatch(2, 1))
        );
        assert_eq!(Heatmap::new(&[], &[], (0.0, 2.0, 1.0)), Err(HeatmapError::NoTraces));
    }

    #[test]
    fn test_delay_scan() {
        let profiles = vec![
            array![10.0, 20.0],
            array![4.0, 4.0],
            array![30.0, 0.0],
            array![1.0, 1.0],
        ];
        let delays = [5.0, 1.0, 5.0, 3.0];
        let trains = [10, 2, 10, 0];
        let scan = DelayScan::new(&delays, &trains, &profiles).unwrap();
        assert_eq!(scan.delays, vec![1.0, 5.0]);
        assert_eq!(scan.profiles[0], array![2.0, 2.0]);
        assert_eq!(scan.profiles[1], array![2.0, 1.0]);
        assert_eq!(scan.image().dim(), (2, 2));
        assert_eq!(scan.image()[[0, 1]], 2.0);
        assert_eq!(scan.integrals(), vec![4.0, 3.0]);
    }
}
