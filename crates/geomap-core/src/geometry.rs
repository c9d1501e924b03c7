use serde::{Deserialize, Serialize};

/// A 2D point in world coordinates (map units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// An axis-aligned bounding box in world coordinates.
///
/// The null envelope ([`Envelope::NULL`]) has inverted infinite bounds. It is
/// the identity of [`Envelope::expand_to_include`], contains nothing, and
/// reports zero width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::NULL
    }
}

impl Envelope {
    pub const NULL: Envelope = Envelope {
        min_x: f64::INFINITY,
        min_y: f64::INFINITY,
        max_x: f64::NEG_INFINITY,
        max_y: f64::NEG_INFINITY,
    };

    /// Build an envelope from two corners in any order.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    pub fn from_points(points: &[Point]) -> Self {
        let mut env = Self::NULL;
        for p in points {
            env.expand_to_include_point(p);
        }
        env
    }

    /// Envelope of the given size centred on `centre`.
    pub fn centred_at(centre: Point, width: f64, height: f64) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Self {
            min_x: centre.x - half_w,
            min_y: centre.y - half_h,
            max_x: centre.x + half_w,
            max_y: centre.y + half_h,
        }
    }

    pub fn is_null(&self) -> bool {
        !(self.min_x <= self.max_x && self.min_y <= self.max_y)
    }

    pub fn width(&self) -> f64 {
        if self.is_null() {
            0.0
        } else {
            self.max_x - self.min_x
        }
    }

    pub fn height(&self) -> f64 {
        if self.is_null() {
            0.0
        } else {
            self.max_y - self.min_y
        }
    }

    /// True when the envelope is null or collapses to a single point.
    pub fn is_degenerate(&self) -> bool {
        self.is_null() || (self.width() <= 0.0 && self.height() <= 0.0)
    }

    pub fn centre(&self) -> Point {
        Point::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    pub fn contains(&self, other: &Envelope) -> bool {
        !self.is_null()
            && !other.is_null()
            && other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        !self.is_null()
            && !other.is_null()
            && self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn intersection(&self, other: &Envelope) -> Envelope {
        if !self.intersects(other) {
            return Envelope::NULL;
        }
        Envelope {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        }
    }

    pub fn union(&self, other: &Envelope) -> Envelope {
        let mut env = *self;
        env.expand_to_include(other);
        env
    }

    pub fn expand_to_include(&mut self, other: &Envelope) {
        if other.is_null() {
            return;
        }
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    pub fn expand_to_include_point(&mut self, p: &Point) {
        self.min_x = self.min_x.min(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_x = self.max_x.max(p.x);
        self.max_y = self.max_y.max(p.y);
    }

    /// Grow symmetrically by `dx` on the left and right and `dy` on the top
    /// and bottom. Negative deltas that would invert the box collapse it to
    /// its centre instead.
    pub fn expand_by(&mut self, dx: f64, dy: f64) {
        if self.is_null() {
            return;
        }
        let centre = self.centre();
        let width = (self.width() + 2.0 * dx).max(0.0);
        let height = (self.height() + 2.0 * dy).max(0.0);
        *self = Envelope::centred_at(centre, width, height);
    }

    /// Translate so the envelope is centred on `p`, keeping its size.
    pub fn set_centre(&mut self, p: Point) {
        if self.is_null() {
            return;
        }
        let (width, height) = (self.width(), self.height());
        *self = Envelope::centred_at(p, width, height);
    }

    /// Scale width and height by `percent / 100` about the current centre.
    pub fn zoom(&mut self, percent: f64) {
        self.scale_about_centre(percent / 100.0);
    }

    /// Scale width and height by `factor` about the current centre.
    pub fn scale_about_centre(&mut self, factor: f64) {
        if self.is_null() {
            return;
        }
        let centre = self.centre();
        let (width, height) = (self.width() * factor, self.height() * factor);
        *self = Envelope::centred_at(centre, width, height);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_translate() {
        assert_eq!(Point::new(1.0, 2.0).translate(3.0, -4.0), Point::new(4.0, -2.0));
    }

    #[test]
    fn test_null_envelope() {
        let env = Envelope::NULL;
        assert!(env.is_null());
        assert!(env.is_degenerate());
        assert_eq!(env.width(), 0.0);
        assert_eq!(env.height(), 0.0);
        assert!(!env.contains_point(&Point::new(0.0, 0.0)));
        assert!(Envelope::from_points(&[]).is_null());
    }

    #[test]
    fn test_expand_to_include_from_null() {
        let mut env = Envelope::NULL;
        env.expand_to_include(&Envelope::new(0.0, 0.0, 10.0, 5.0));
        env.expand_to_include(&Envelope::new(-5.0, 2.0, 3.0, 20.0));
        env.expand_to_include(&Envelope::NULL);
        assert_eq!(env, Envelope::new(-5.0, 0.0, 10.0, 20.0));
    }

    #[test]
    fn test_expand_by_is_symmetric() {
        let mut env = Envelope::new(0.0, 0.0, 10.0, 20.0);
        env.expand_by(1.0, 2.0);
        assert_eq!(env, Envelope::new(-1.0, -2.0, 11.0, 22.0));
        assert_eq!(env.centre(), Point::new(5.0, 10.0));
    }

    #[test]
    fn test_set_centre_keeps_size() {
        let mut env = Envelope::new(0.0, 0.0, 10.0, 4.0);
        env.set_centre(Point::new(100.0, -50.0));
        assert!((env.width() - 10.0).abs() < 1e-12);
        assert!((env.height() - 4.0).abs() < 1e-12);
        assert_eq!(env.centre(), Point::new(100.0, -50.0));
    }

    #[test]
    fn test_zoom_percent() {
        let mut env = Envelope::new(0.0, 0.0, 10.0, 10.0);
        env.zoom(200.0);
        assert_eq!(env, Envelope::new(-5.0, -5.0, 15.0, 15.0));
        env.zoom(25.0);
        assert_eq!(env, Envelope::new(2.5, 2.5, 7.5, 7.5));
    }

    #[test]
    fn test_intersection() {
        let a = Envelope::new(0.0, 0.0, 10.0, 10.0);
        let b = Envelope::new(5.0, 5.0, 15.0, 15.0);
        let c = Envelope::new(20.0, 20.0, 30.0, 30.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.intersection(&b), Envelope::new(5.0, 5.0, 10.0, 10.0));
        assert!(a.intersection(&c).is_null());
    }

    #[test]
    fn test_degenerate_line_is_not_degenerate() {
        let line = Envelope::new(0.0, 5.0, 10.0, 5.0);
        assert!(!line.is_degenerate());
        let dot = Envelope::new(3.0, 3.0, 3.0, 3.0);
        assert!(dot.is_degenerate());
        assert!(!dot.is_null());
    }
}
