use ndarray::{Array1, Array2, Axis};

/// Profiles and simple statistics of a camera image (indexed `[y, x]`)
#[derive(Debug, Clone, PartialEq)]
pub struct ImageProfile {
    pub shape: (usize, usize),
    pub x_profile: Array1<f64>,
    pub y_profile: Array1<f64>,
    pub max_value: f64,
    pub number_of_max_pixel: usize,
    pub x_mean: f64,
    pub y_mean: f64,
    pub x_sigma: f64,
    pub y_sigma: f64,
}

/// First and second moment of a profile, NaN for an empty profile
fn moments(profile: &Array1<f64>) -> (f64, f64) {
    let n = profile.sum();
    if n == 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let mean = profile
        .iter()
        .enumerate()
        .map(|(i, v)| i as f64 * v)
        .sum::<f64>()
        / n;
    let variance = profile
        .iter()
        .enumerate()
        .map(|(i, v)| v * (i as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}

impl ImageProfile {
    /// If returns None the image has no pixels
    pub fn new(image: &Array2<f64>) -> Option<Self> {
        if image.is_empty() {
            return None;
        }
        let x_profile = image.sum_axis(Axis(0));
        let y_profile = image.sum_axis(Axis(1));
        let max_value = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let number_of_max_pixel = image.iter().filter(|v| **v == max_value).count();
        let (x_mean, x_sigma) = moments(&x_profile);
        let (y_mean, y_sigma) = moments(&y_profile);
        Some(Self {
            shape: image.dim(),
            x_profile,
            y_profile,
            max_value,
            number_of_max_pixel,
            x_mean,
            y_mean,
            x_sigma,
            y_sigma,
        })
    }

    /// Log the scalar properties
    pub fn describe(&self) {
        log::info!("shape : {:?}", self.shape);
        log::info!("max_value : {}", self.max_value);
        log::info!("number_of_max_pixel : {}", self.number_of_max_pixel);
        log::info!("x_mean : {:.2} (sigma {:.2})", self.x_mean, self.x_sigma);
        log::info!("y_mean : {:.2} (sigma {:.2})", self.y_mean, self.y_sigma);
    }
}
