use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::{Envelope, Point};

/// An entry in the R-tree spatial index, referencing a feature by its index.
#[derive(Debug, Clone)]
pub struct SpatialEntry {
    /// Index into the owning layer's feature vector.
    pub feature_index: usize,
    /// World envelope of the feature.
    pub envelope: Envelope,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.envelope.min_x, self.envelope.min_y],
            [self.envelope.max_x, self.envelope.max_y],
        )
    }
}

/// Spatial index used to cull features against the viewport envelope.
#[derive(Debug)]
pub struct SpatialIndex {
    tree: RTree<SpatialEntry>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Build the index from feature envelopes. Null envelopes are skipped.
    pub fn build(entries: Vec<SpatialEntry>) -> Self {
        let entries = entries.into_iter().filter(|e| !e.envelope.is_null()).collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn insert(&mut self, entry: SpatialEntry) {
        if !entry.envelope.is_null() {
            self.tree.insert(entry);
        }
    }

    /// Entries whose envelope contains the given point, boundary included.
    pub fn query_point(&self, point: &Point) -> Vec<&SpatialEntry> {
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([point.x, point.y]))
            .collect()
    }

    /// Entries intersecting the given world envelope.
    pub fn query_envelope(&self, envelope: &Envelope) -> Vec<&SpatialEntry> {
        if envelope.is_null() {
            return Vec::new();
        }
        let aabb = AABB::from_corners(
            [envelope.min_x, envelope.min_y],
            [envelope.max_x, envelope.max_y],
        );
        self.tree.locate_in_envelope_intersecting(&aabb).collect()
    }

    /// Union of all indexed envelopes.
    pub fn extent(&self) -> Envelope {
        if self.tree.size() == 0 {
            return Envelope::NULL;
        }
        let aabb = self.tree.root().envelope();
        let (lower, upper) = (aabb.lower(), aabb.upper());
        Envelope::new(lower[0], lower[1], upper[0], upper[1])
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> SpatialIndex {
        SpatialIndex::build(vec![
            SpatialEntry {
                feature_index: 0,
                envelope: Envelope::new(0.0, 0.0, 10.0, 10.0),
            },
            SpatialEntry {
                feature_index: 1,
                envelope: Envelope::new(20.0, 20.0, 30.0, 30.0),
            },
            SpatialEntry {
                feature_index: 2,
                envelope: Envelope::NULL,
            },
        ])
    }

    #[test]
    fn test_spatial_query() {
        let index = index();
        assert_eq!(index.len(), 2);

        let results = index.query_point(&Point::new(25.0, 25.0));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].feature_index, 1);

        let results = index.query_envelope(&Envelope::new(-5.0, -5.0, 15.0, 15.0));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].feature_index, 0);
        assert!(index.query_envelope(&Envelope::NULL).is_empty());
    }

    #[test]
    fn test_extent() {
        assert_eq!(index().extent(), Envelope::new(0.0, 0.0, 30.0, 30.0));
        assert!(SpatialIndex::new().extent().is_null());
    }
}
