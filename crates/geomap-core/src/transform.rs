use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::geometry::Point;

/// Determinants below this magnitude are treated as singular.
const SINGULAR_EPSILON: f64 = 1e-12;

/// A 2D affine transform applied to screen-space points.
///
/// Coefficients follow the `[a b c d e f]` convention:
/// `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine2D {
    pub coeffs: [f64; 6],
}

impl Default for Affine2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine2D {
    pub const IDENTITY: Affine2D = Affine2D {
        coeffs: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
    };

    pub fn new(coeffs: [f64; 6]) -> Self {
        Self { coeffs }
    }

    pub fn translate(dx: f64, dy: f64) -> Self {
        Self::new([1.0, 0.0, 0.0, 1.0, dx, dy])
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new([sx, 0.0, 0.0, sy, 0.0, 0.0])
    }

    /// Rotation about the origin. Positive angles turn clockwise on screen
    /// because the screen Y axis points down.
    pub fn rotate(radians: f64) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self::new([cos, sin, -sin, cos, 0.0, 0.0])
    }

    /// Rotation about an arbitrary pivot, typically the canvas centre.
    pub fn rotate_about(radians: f64, pivot: Point) -> Self {
        Self::translate(-pivot.x, -pivot.y)
            .then(&Self::rotate(radians))
            .then(&Self::translate(pivot.x, pivot.y))
    }

    /// Compose: apply `self` first, then `next`.
    pub fn then(&self, next: &Affine2D) -> Affine2D {
        let [a1, b1, c1, d1, e1, f1] = self.coeffs;
        let [a2, b2, c2, d2, e2, f2] = next.coeffs;
        Affine2D::new([
            a2 * a1 + c2 * b1,
            b2 * a1 + d2 * b1,
            a2 * c1 + c2 * d1,
            b2 * c1 + d2 * d1,
            a2 * e1 + c2 * f1 + e2,
            b2 * e1 + d2 * f1 + f2,
        ])
    }

    pub fn apply(&self, p: Point) -> Point {
        let [a, b, c, d, e, f] = self.coeffs;
        Point::new(a * p.x + c * p.y + e, b * p.x + d * p.y + f)
    }

    pub fn determinant(&self) -> f64 {
        let [a, b, c, d, _, _] = self.coeffs;
        a * d - b * c
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det.is_finite() && det.abs() > SINGULAR_EPSILON
    }

    pub fn inverse(&self) -> Result<Affine2D, TransformError> {
        let determinant = self.determinant();
        if !self.is_invertible() {
            return Err(TransformError::NonInvertible { determinant });
        }
        let [a, b, c, d, e, f] = self.coeffs;
        let inv_det = 1.0 / determinant;
        Ok(Affine2D::new([
            d * inv_det,
            -b * inv_det,
            -c * inv_det,
            a * inv_det,
            (c * f - d * e) * inv_det,
            (b * e - a * f) * inv_det,
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn test_translate_then_scale() {
        let t = Affine2D::translate(10.0, 20.0).then(&Affine2D::scale(2.0, 3.0));
        let p = t.apply(Point::new(1.0, 1.0));
        assert!(close(p, Point::new(22.0, 63.0)));
    }

    #[test]
    fn test_rotate_about_keeps_pivot() {
        let pivot = Point::new(50.0, 25.0);
        let t = Affine2D::rotate_about(std::f64::consts::FRAC_PI_2, pivot);
        assert!(close(t.apply(pivot), pivot));
        assert!(close(t.apply(Point::new(60.0, 25.0)), Point::new(50.0, 35.0)));
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = Affine2D::rotate_about(0.7, Point::new(3.0, -4.0)).then(&Affine2D::scale(2.0, 0.5));
        let inv = t.inverse().unwrap();
        let p = Point::new(12.5, -7.25);
        assert!(close(inv.apply(t.apply(p)), p));
    }

    #[test]
    fn test_singular_inverse_fails() {
        let t = Affine2D::scale(0.0, 1.0);
        assert!(!t.is_invertible());
        assert!(matches!(
            t.inverse(),
            Err(TransformError::NonInvertible { .. })
        ));
    }

    #[test]
    fn test_identity() {
        assert!(Affine2D::default().is_identity());
        assert!(!Affine2D::translate(1.0, 0.0).is_identity());
    }
}
