use ndarray::{s, Array1, Array2, Axis};

/// Reprojection of a cartesian image onto (radius, angle) bins around a centre
pub trait PolarTransform {
    /// Returns the polar image indexed `[radius, angle]`. `center` is (x, y) in pixels
    /// and the image is indexed `[y, x]`.
    fn to_polar(&self, image: &Array2<f64>, center: (f64, f64)) -> Array2<f64>;
}

/// Polar reprojection picking the nearest cartesian pixel for every polar bin.
///
/// Radius steps are one pixel and reach the farthest image corner. Angle column `j`
/// covers `j * angle_step` degrees.
#[derive(Debug, Clone, Copy)]
pub struct NearestNeighborPolar {
    pub angle_step: f64,
}

impl Default for NearestNeighborPolar {
    fn default() -> Self {
        Self { angle_step: 1.0 }
    }
}

impl NearestNeighborPolar {
    pub fn number_of_angles(&self) -> usize {
        (360.0 / self.angle_step).round().max(1.0) as usize
    }
}

impl PolarTransform for NearestNeighborPolar {
    fn to_polar(&self, image: &Array2<f64>, center: (f64, f64)) -> Array2<f64> {
        let (ny, nx) = image.dim();
        let (cx, cy) = center;
        let corners = [(0.0, 0.0), (nx as f64, 0.0), (0.0, ny as f64), (nx as f64, ny as f64)];
        let max_radius = corners
            .iter()
            .map(|(x, y)| ((x - cx).powi(2) + (y - cy).powi(2)).sqrt())
            .fold(0.0, f64::max);
        let n_radii = max_radius.ceil() as usize;
        let n_angles = self.number_of_angles();

        let mut polar = Array2::zeros((n_radii, n_angles));
        for ((r, a), value) in polar.indexed_iter_mut() {
            let theta = (a as f64 * self.angle_step).to_radians();
            let x = (cx + r as f64 * theta.cos()).round();
            let y = (cy + r as f64 * theta.sin()).round();
            if x >= 0.0 && y >= 0.0 && (x as usize) < nx && (y as usize) < ny {
                *value = image[[y as usize, x as usize]];
            }
        }
        polar
    }
}

/// Angle and radius limits of a radial average. Angles are in degrees and may start below
/// zero to wrap around 0°.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sector {
    pub angles: Option<(i64, i64)>,
    pub radii: Option<(usize, usize)>,
}

/// Sum over all angles for every radius
pub fn radial_sum(polar: &Array2<f64>) -> Array1<f64> {
    polar.sum_axis(Axis(1))
}

/// Mean over the angles of `sector` for every radius of `sector`.
///
/// Returns the radii (in pixels) together with the profile.
pub fn radial_average(polar: &Array2<f64>, sector: &Sector) -> (Vec<usize>, Array1<f64>) {
    let (n_radii, n_angles) = polar.dim();
    let (r_start, r_end) = sector.radii.unwrap_or((0, n_radii));
    let r_end = r_end.min(n_radii);
    let r_start = r_start.min(r_end);
    let (a_start, a_end) = sector.angles.unwrap_or((0, n_angles as i64));
    // A sector covers at most one full turn
    let a_start = a_start.max(-(n_angles as i64));
    let a_end = (a_end.max(0) as usize).min(n_angles);

    let rows = polar.slice(s![r_start..r_end, ..]);
    let mut sum = Array1::zeros(r_end - r_start);
    let mut columns = 0;
    if a_start >= 0 {
        let a_start = (a_start as usize).min(a_end);
        sum += &rows.slice(s![.., a_start..a_end]).sum_axis(Axis(1));
        columns += a_end - a_start;
    } else {
        // Wrap: [360 + start, 360) and [0, end)
        let wrapped = (n_angles - a_start.unsigned_abs() as usize).max(a_end);
        sum += &rows.slice(s![.., wrapped..]).sum_axis(Axis(1));
        sum += &rows.slice(s![.., ..a_end]).sum_axis(Axis(1));
        columns += n_angles - wrapped + a_end;
    }
    let profile = if columns == 0 {
        Array1::from_elem(r_end - r_start, f64::NAN)
    } else {
        sum / columns as f64
    };
    ((r_start..r_end).collect(), profile)
}
