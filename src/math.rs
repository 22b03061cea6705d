//! Angle conversions shared by the controller and the sensor adapters

use nalgebra::Vector3;

pub const DEG_TO_RAD: f64 = core::f64::consts::PI / 180.0;
pub const RAD_TO_DEG: f64 = 180.0 / core::f64::consts::PI;

/// Fold an angle in degrees into [-180, 180]
///
/// Orientation sensors report headings in 0..360 and can overshoot by a
/// turn; the controller expects signed angles around zero.
///
/// # Example
/// ```
/// use tvc_attitude::wrap_degrees;
///
/// assert_eq!(wrap_degrees(190.0), -170.0);
/// assert_eq!(wrap_degrees(-190.0), 170.0);
/// assert_eq!(wrap_degrees(45.0), 45.0);
/// ```
pub fn wrap_degrees(degrees: f64) -> f64 {
    if !degrees.is_finite() || (-180.0..=180.0).contains(&degrees) {
        return degrees;
    }
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid maps +180 onto -180; keep the sign of the input there
    if wrapped == -180.0 && degrees > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Extension trait for angle vectors
pub trait Vector3Ext {
    fn deg_to_rad(&self) -> Vector3<f64>;

    fn rad_to_deg(&self) -> Vector3<f64>;

    /// [`wrap_degrees`] applied component-wise
    fn wrap_degrees(&self) -> Vector3<f64>;
}

impl Vector3Ext for Vector3<f64> {
    fn deg_to_rad(&self) -> Vector3<f64> {
        *self * DEG_TO_RAD
    }

    fn rad_to_deg(&self) -> Vector3<f64> {
        *self * RAD_TO_DEG
    }

    fn wrap_degrees(&self) -> Vector3<f64> {
        self.map(wrap_degrees)
    }
}
