use ndarray::{Array1, Array2};
use std::fmt::Display;
use std::str::FromStr;

use super::error::EventError;
use super::event::Attribute;

/// Number of pixels along one side of the TimePix sensor
pub const SENSOR_PIXELS: usize = 256;
/// Number of ToF bins used for ToF vs position histograms
pub const TOF_BINS: usize = 6000;

/// Unit used when showing times of flight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Milli,
    #[default]
    Micro,
    Nano,
}

impl TimeUnit {
    /// Factor converting seconds into this unit
    pub fn factor(&self) -> f64 {
        match self {
            Self::Seconds => 1.0,
            Self::Milli => 1.0e3,
            Self::Micro => 1.0e6,
            Self::Nano => 1.0e9,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Seconds => "s",
            Self::Milli => "ms",
            Self::Micro => "\u{03BC}s",
            Self::Nano => "ns",
        }
    }

    pub fn convert(&self, seconds: &Array1<f64>) -> Array1<f64> {
        seconds * self.factor()
    }
}

impl Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for TimeUnit {
    type Err = EventError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s" | "seconds" | "none" => Ok(Self::Seconds),
            "ms" | "milli" => Ok(Self::Milli),
            "us" | "micro" | "\u{03BC}s" => Ok(Self::Micro),
            "ns" | "nano" => Ok(Self::Nano),
            _ => Err(EventError::UnknownAttribute(s.to_string())),
        }
    }
}

/// Index of the bin holding `value` for uniform bins over `range`.
///
/// Bins are half open except the last one, which includes the upper edge.
fn uniform_bin(value: f64, range: (f64, f64), bins: usize) -> Option<usize> {
    if !(value >= range.0 && value <= range.1) {
        return None;
    }
    let width = (range.1 - range.0) / bins as f64;
    let index = ((value - range.0) / width).floor() as usize;
    Some(index.min(bins - 1))
}

/// Index of the bin holding `value` for arbitrary increasing edges
fn edge_bin(value: f64, edges: &Array1<f64>) -> Option<usize> {
    let n = edges.len();
    if n < 2 || !(value >= edges[0] && value <= edges[n - 1]) {
        return None;
    }
    let upper = edges
        .as_slice()
        .map(|e| e.partition_point(|edge| *edge <= value))
        .unwrap_or_else(|| edges.iter().take_while(|edge| **edge <= value).count());
    Some((upper - 1).min(n - 2))
}

/// Counts of values in uniform bins
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    pub counts: Vec<u64>,
    pub range: (f64, f64),
    pub bin_width: f64,
}

impl Histogram1D {
    /// Histogram `values` into `bins` bins. Without a range the data extent is used.
    pub fn new(values: &Array1<f64>, bins: usize, range: Option<(f64, f64)>) -> Self {
        let bins = bins.max(1);
        let range = range.unwrap_or_else(|| {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if !min.is_finite() || !max.is_finite() {
                (0.0, 1.0)
            } else if min == max {
                (min - 0.5, max + 0.5)
            } else {
                (min, max)
            }
        });
        let mut counts = vec![0; bins];
        for value in values.iter() {
            if let Some(i) = uniform_bin(*value, range, bins) {
                counts[i] += 1;
            }
        }
        Self {
            counts,
            range,
            bin_width: (range.1 - range.0) / bins as f64,
        }
    }

    pub fn bin_centers(&self) -> Vec<f64> {
        (0..self.counts.len())
            .map(|i| self.range.0 + (i as f64 + 0.5) * self.bin_width)
            .collect()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Bin centres and counts in one go, as used for line plots of spectra
pub fn hist_to_xy(values: &Array1<f64>, bins: usize) -> (Vec<f64>, Vec<u64>) {
    let hist = Histogram1D::new(values, bins, None);
    (hist.bin_centers(), hist.counts)
}

/// ToF spectrum with the axis converted to `unit`
pub fn tof_spectrum(tof: &Array1<f64>, bins: usize, unit: TimeUnit) -> Histogram1D {
    Histogram1D::new(&unit.convert(tof), bins, None)
}

/// Counts of (x, y) pairs. `counts[[i, j]]` holds x bin `i` and y bin `j`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    pub counts: Array2<f64>,
    pub x_edges: Array1<f64>,
    pub y_edges: Array1<f64>,
}

impl Histogram2D {
    pub fn new(
        x: &Array1<f64>,
        y: &Array1<f64>,
        x_edges: Array1<f64>,
        y_edges: Array1<f64>,
    ) -> Result<Self, EventError> {
        if x.len() != y.len() {
            return Err(EventError::LengthMismatch(Attribute::Y, y.len(), x.len()));
        }
        let mut counts = Array2::zeros((
            x_edges.len().saturating_sub(1),
            y_edges.len().saturating_sub(1),
        ));
        for (xv, yv) in x.iter().zip(y.iter()) {
            if let (Some(i), Some(j)) = (edge_bin(*xv, &x_edges), edge_bin(*yv, &y_edges)) {
                counts[[i, j]] += 1.0;
            }
        }
        Ok(Self {
            counts,
            x_edges,
            y_edges,
        })
    }

    pub fn total(&self) -> f64 {
        self.counts.sum()
    }
}

/// Pixel edges 0, 1, .., 256 of the sensor
pub fn pixel_edges() -> Array1<f64> {
    Array1::linspace(0.0, SENSOR_PIXELS as f64, SENSOR_PIXELS + 1)
}

/// ToF (in `unit`) against one position coordinate
pub fn tof_vs_position(
    tof: &Array1<f64>,
    position: &Array1<f64>,
    unit: TimeUnit,
) -> Result<Histogram2D, EventError> {
    let converted = unit.convert(tof);
    let hist = Histogram1D::new(&converted, TOF_BINS, None);
    let mut tof_edges = Array1::linspace(hist.range.0, hist.range.1, TOF_BINS + 1);
    tof_edges[TOF_BINS] = hist.range.1;
    Histogram2D::new(&converted, position, tof_edges, pixel_edges())
}

/// VMI image of the sensor. Indexed `[y, x]` so rows follow the y coordinate.
pub fn vmi_image(x: &Array1<f64>, y: &Array1<f64>) -> Result<Array2<f64>, EventError> {
    let hist = Histogram2D::new(x, y, pixel_edges(), pixel_edges())?;
    Ok(hist.counts.reversed_axes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_time_unit() {
        let tof = array![1.0, 2.5];
        assert_eq!(TimeUnit::Milli.convert(&tof), array![1000.0, 2500.0]);
        assert_eq!(TimeUnit::Nano.factor(), 1.0e9);
        assert_eq!("milli".parse::<TimeUnit>().unwrap(), TimeUnit::Milli);
        assert_eq!(TimeUnit::Micro.to_string(), "\u{03BC}s");
        assert!("minutes".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn test_histogram_1d() {
        let values = array![0.0, 0.5, 1.0, 1.5, 2.0, 4.0];
        let hist = Histogram1D::new(&values, 4, None);
        assert_eq!(hist.range, (0.0, 4.0));
        assert_eq!(hist.counts, vec![2, 2, 1, 1]);
        assert_eq!(hist.bin_centers(), vec![0.5, 1.5, 2.5, 3.5]);

        let (x, y) = hist_to_xy(&values, 2);
        assert_eq!(x, vec![1.0, 3.0]);
        assert_eq!(y, vec![4, 2]);

        let clipped = Histogram1D::new(&values, 2, Some((0.0, 1.0)));
        assert_eq!(clipped.counts, vec![1, 2]);
        assert_eq!(clipped.total(), 3);
    }

    #[test]
    fn test_vmi_image() {
        let x = array![10.0, 10.5, 255.9, 256.0, 300.0];
        let y = array![20.0, 20.2, 0.0, 1.0, 5.0];
        let image = vmi_image(&x, &y).unwrap();
        assert_eq!(image.dim(), (256, 256));
        assert_eq!(image[[20, 10]], 2.0);
        assert_eq!(image[[0, 255]], 1.0);
        // x = 256 falls into the last (closed) bin, x = 300 is outside
        assert_eq!(image[[1, 255]], 1.0);
        assert_eq!(image.sum(), 4.0);

        assert!(vmi_image(&array![1.0], &array![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_tof_vs_position() {
        let tof = array![1.0e-6, 2.0e-6, 3.0e-6];
        let pos = array![10.0, 20.0, 30.0];
        let hist = tof_vs_position(&tof, &pos, TimeUnit::Micro).unwrap();
        assert_eq!(hist.counts.dim(), (TOF_BINS, SENSOR_PIXELS));
        assert_eq!(hist.total(), 3.0);
        assert_eq!(hist.counts[[0, 10]], 1.0);
        assert_eq!(hist.counts[[TOF_BINS - 1, 30]], 1.0);
    }
}
