use ndarray::Array1;

/// Constant fraction discriminator.
///
/// The signal minus its scaled copy advanced by `delay` samples (edge value repeated) is
/// compared against `threshold`. Returns the index before every crossing, so each peak
/// gives a start and a stop index.
pub fn cfd(signal: &Array1<f64>, fraction: f64, delay: usize, threshold: f64) -> Vec<usize> {
    let n = signal.len();
    if n < 2 {
        return vec![];
    }
    let above: Vec<bool> = (0..n)
        .map(|i| {
            let delayed = fraction * signal[(i + delay).min(n - 1)];
            signal[i] - delayed > threshold
        })
        .collect();
    above
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0] != pair[1])
        .map(|(i, _)| i)
        .collect()
}
