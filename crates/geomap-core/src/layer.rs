use std::fmt;
use std::time::Instant;

use image::RgbaImage;

use crate::error::{ConfigError, LayerError, RenderError};
use crate::geometry::Envelope;
use crate::viewport::{ViewKey, Viewport};

/// Stable handle of a layer inside a [`LayerTree`]. Never reused.
pub type LayerId = u32;

/// Capability every drawable layer provides.
pub trait LayerSource: Send {
    /// Produce a raster covering the full viewport in image space.
    fn render(&mut self, viewport: &Viewport) -> Result<RgbaImage, RenderError>;

    /// World extent of the layer's data; [`Envelope::NULL`] when empty.
    fn extent(&self) -> Envelope;
}

/// Leaf layers draw; groups only structure the tree.
pub enum LayerKind {
    Leaf(Box<dyn LayerSource>),
    Group(Vec<LayerId>),
}

impl fmt::Debug for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Leaf(_) => f.write_str("Leaf"),
            LayerKind::Group(children) => f.debug_tuple("Group").field(children).finish(),
        }
    }
}

/// Raster owned by a layer together with the view it was produced for.
#[derive(Debug)]
struct CachedImage {
    image: RgbaImage,
    key: ViewKey,
}

/// How far a reorder reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    /// The flattened order of every layer in the tree.
    Tree,
    /// Only the direct siblings of the layer; they keep their slots in the
    /// global order and swap ranks among themselves.
    Siblings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    ToFront,
    ToBack,
    Forward,
    Backward,
}

/// A node of the layer tree.
#[derive(Debug)]
pub struct Layer {
    id: LayerId,
    name: String,
    visible: bool,
    opacity: f64,
    min_visible_zoom: f64,
    max_visible_zoom: f64,
    render_order: u32,
    last_render_duration_ms: f64,
    parent: Option<LayerId>,
    cached: Option<CachedImage>,
    kind: LayerKind,
}

impl Layer {
    fn new(id: LayerId, name: &str, kind: LayerKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            visible: true,
            opacity: 1.0,
            min_visible_zoom: 0.0,
            max_visible_zoom: f64::MAX,
            render_order: 0,
            last_render_duration_ms: 0.0,
            parent: None,
            cached: None,
            kind,
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f64) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(ConfigError::InvalidOpacity(opacity));
        }
        self.opacity = opacity;
        Ok(())
    }

    pub fn min_visible_zoom(&self) -> f64 {
        self.min_visible_zoom
    }

    pub fn max_visible_zoom(&self) -> f64 {
        self.max_visible_zoom
    }

    /// Restrict drawing to zooms in `[min, max)`.
    pub fn set_visible_zoom_range(&mut self, min: f64, max: f64) -> Result<(), ConfigError> {
        if !(min >= 0.0 && max > min) {
            return Err(ConfigError::InvalidVisibilityRange { min, max });
        }
        self.min_visible_zoom = min;
        self.max_visible_zoom = max;
        Ok(())
    }

    pub fn is_visible_at(&self, zoom: f64) -> bool {
        zoom >= self.min_visible_zoom && zoom < self.max_visible_zoom
    }

    /// Rank in the paint sequence; lowest is painted first.
    pub fn render_order(&self) -> u32 {
        self.render_order
    }

    pub fn last_render_duration_ms(&self) -> f64 {
        self.last_render_duration_ms
    }

    pub fn parent(&self) -> Option<LayerId> {
        self.parent
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, LayerKind::Group(_))
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn children(&self) -> &[LayerId] {
        match &self.kind {
            LayerKind::Group(children) => children,
            LayerKind::Leaf(_) => &[],
        }
    }

    pub fn cached_image(&self) -> Option<&RgbaImage> {
        self.cached.as_ref().map(|c| &c.image)
    }

    /// Whether the cached raster was produced for this exact view. The key
    /// is compared rather than the generation, which is only meaningful
    /// within one viewport.
    pub fn has_current_cache(&self, viewport: &Viewport) -> bool {
        self.cached
            .as_ref()
            .is_some_and(|c| c.key == viewport.view_key())
    }

    /// Release the owned raster, if any.
    pub fn clear_cache(&mut self) {
        self.cached = None;
    }

    /// Produce the layer's raster for `viewport`, reusing the cache when it
    /// was produced for the same view.
    ///
    /// Groups and layers outside their zoom range yield `None`; this is the
    /// only zoom-range check on the render path.
    pub fn render(&mut self, viewport: &Viewport) -> Result<Option<&RgbaImage>, RenderError> {
        if !self.is_visible_at(viewport.zoom()) {
            return Ok(None);
        }
        if self.is_group() {
            return Ok(None);
        }
        if !self.has_current_cache(viewport) {
            let LayerKind::Leaf(source) = &mut self.kind else {
                return Ok(None);
            };
            let started = Instant::now();
            let result = source.render(viewport);
            self.last_render_duration_ms = started.elapsed().as_secs_f64() * 1000.0;
            let image = result?;
            let (width, height) = viewport.size();
            if image.dimensions() != (width, height) {
                return Err(RenderError::SizeMismatch {
                    width,
                    height,
                    got_width: image.width(),
                    got_height: image.height(),
                });
            }
            log::debug!(
                "Layer '{}' rendered in {:.2} ms",
                self.name,
                self.last_render_duration_ms
            );
            self.cached = Some(CachedImage {
                image,
                key: viewport.view_key(),
            });
        }
        Ok(self.cached.as_ref().map(|c| &c.image))
    }
}

/// Arena holding the layer tree.
///
/// Layers are addressed by [`LayerId`]. Render orders are dense and unique
/// across every node in the tree: after any insertion, removal, or reorder
/// they read `0..len()`.
#[derive(Debug, Default)]
pub struct LayerTree {
    slots: Vec<Option<Layer>>,
    roots: Vec<LayerId>,
}

impl LayerTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Construction ─────────────────────────────────────────────────

    /// Add a drawable layer at the top level. It is painted last.
    pub fn add_leaf(&mut self, name: &str, source: impl LayerSource + 'static) -> LayerId {
        self.insert(name, LayerKind::Leaf(Box::new(source)))
    }

    /// Add an empty group at the top level.
    pub fn add_group(&mut self, name: &str) -> LayerId {
        self.insert(name, LayerKind::Group(Vec::new()))
    }

    fn insert(&mut self, name: &str, kind: LayerKind) -> LayerId {
        let id = self.slots.len() as LayerId;
        let mut layer = Layer::new(id, name, kind);
        layer.render_order = self.len() as u32;
        self.slots.push(Some(layer));
        self.roots.push(id);
        id
    }

    /// Re-parent `id` under `group`, or to the top level when `group` is
    /// `None`. Render orders are unchanged.
    pub fn move_to_group(&mut self, id: LayerId, group: Option<LayerId>) -> Result<(), LayerError> {
        self.layer(id)?;
        if let Some(target) = group {
            if !self.layer(target)?.is_group() {
                return Err(LayerError::NotAGroup(target));
            }
            if self.is_ancestor_or_self(id, target) {
                return Err(LayerError::CyclicGroup { layer: id, target });
            }
        }
        self.detach(id);
        match group {
            Some(target) => {
                if let Some(LayerKind::Group(children)) = self.kind_mut(target) {
                    children.push(id);
                }
            }
            None => self.roots.push(id),
        }
        if let Some(layer) = self.slot_mut(id) {
            layer.parent = group;
        }
        Ok(())
    }

    /// Remove a layer and its whole subtree, then compact render orders.
    pub fn remove(&mut self, id: LayerId) -> Result<(), LayerError> {
        self.layer(id)?;
        self.detach(id);
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(layer) = self.slots.get_mut(next as usize).and_then(Option::take) {
                pending.extend_from_slice(layer.children());
            }
        }
        let ordered = self.ordered_ids();
        self.renumber(&ordered);
        Ok(())
    }

    /// Swap the drawing source of a leaf. The old cache is dropped.
    pub fn replace_source(
        &mut self,
        id: LayerId,
        source: impl LayerSource + 'static,
    ) -> Result<(), LayerError> {
        let layer = self.layer_mut(id)?;
        match &mut layer.kind {
            LayerKind::Leaf(current) => *current = Box::new(source),
            LayerKind::Group(_) => return Err(LayerError::NotALeaf(id)),
        }
        layer.clear_cache();
        Ok(())
    }

    // ── Lookup ───────────────────────────────────────────────────────

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.slot_mut(id)
    }

    pub fn layer(&self, id: LayerId) -> Result<&Layer, LayerError> {
        self.get(id).ok_or(LayerError::UnknownLayer(id))
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer, LayerError> {
        self.slot_mut(id).ok_or(LayerError::UnknownLayer(id))
    }

    pub fn find_by_name(&self, name: &str) -> Option<LayerId> {
        self.iter().find(|l| l.name == name).map(|l| l.id)
    }

    pub fn roots(&self) -> &[LayerId] {
        &self.roots
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    // ── Visibility & extent ──────────────────────────────────────────

    pub fn set_visible(&mut self, id: LayerId, visible: bool) -> Result<(), LayerError> {
        self.layer_mut(id)?.set_visible(visible);
        Ok(())
    }

    pub fn toggle_visibility(&mut self, id: LayerId) -> Result<(), LayerError> {
        let layer = self.layer_mut(id)?;
        layer.visible = !layer.visible;
        Ok(())
    }

    pub fn set_all_visible(&mut self, visible: bool) {
        for layer in self.slots.iter_mut().flatten() {
            layer.visible = visible;
        }
    }

    /// Extent of a layer; for a group, the union of its children.
    pub fn extent(&self, id: LayerId) -> Result<Envelope, LayerError> {
        let layer = self.layer(id)?;
        match &layer.kind {
            LayerKind::Leaf(source) => Ok(source.extent()),
            LayerKind::Group(children) => {
                let mut env = Envelope::NULL;
                for child in children {
                    env.expand_to_include(&self.extent(*child)?);
                }
                Ok(env)
            }
        }
    }

    /// Union of the extents of all visible leaves.
    pub fn visible_extent(&self) -> Envelope {
        let mut env = Envelope::NULL;
        for id in self.flatten_visible() {
            if let Some(Layer {
                kind: LayerKind::Leaf(source),
                ..
            }) = self.get(id)
            {
                env.expand_to_include(&source.extent());
            }
        }
        env
    }

    /// Visible leaves in paint order, lowest render order first.
    ///
    /// Invisible nodes hide their whole subtree. Equal render orders keep
    /// their tree traversal order.
    pub fn flatten_visible(&self) -> Vec<LayerId> {
        let mut leaves = Vec::new();
        let mut stack: Vec<LayerId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(layer) = self.get(id) else { continue };
            if !layer.visible {
                continue;
            }
            match &layer.kind {
                LayerKind::Leaf(_) => leaves.push(id),
                LayerKind::Group(children) => stack.extend(children.iter().rev()),
            }
        }
        leaves.sort_by_key(|id| self.get(*id).map_or(u32::MAX, |l| l.render_order));
        leaves
    }

    // ── Caches ───────────────────────────────────────────────────────

    /// Drop the cached raster of a layer and of its descendants.
    pub fn invalidate(&mut self, id: LayerId) -> Result<(), LayerError> {
        let mut pending = vec![id];
        self.layer(id)?;
        while let Some(next) = pending.pop() {
            if let Some(layer) = self.slot_mut(next) {
                layer.clear_cache();
                pending.extend_from_slice(layer.children());
            }
        }
        Ok(())
    }

    pub fn clear_all_caches(&mut self) {
        for layer in self.slots.iter_mut().flatten() {
            layer.clear_cache();
        }
    }

    // ── Render order ─────────────────────────────────────────────────

    /// Every live layer sorted by render order.
    pub fn ordered_ids(&self) -> Vec<LayerId> {
        let mut ids: Vec<LayerId> = self.iter().map(|l| l.id).collect();
        ids.sort_by_key(|id| self.get(*id).map_or(u32::MAX, |l| l.render_order));
        ids
    }

    /// Move the layer to rank 0 of its scope: painted first.
    pub fn bring_to_front(&mut self, id: LayerId, scope: OrderScope) -> Result<(), LayerError> {
        self.reorder(id, scope, Move::ToFront)
    }

    /// Move the layer to the last rank of its scope: painted last.
    pub fn send_to_back(&mut self, id: LayerId, scope: OrderScope) -> Result<(), LayerError> {
        self.reorder(id, scope, Move::ToBack)
    }

    /// Move the layer one rank toward the front.
    pub fn bring_forward(&mut self, id: LayerId, scope: OrderScope) -> Result<(), LayerError> {
        self.reorder(id, scope, Move::Forward)
    }

    /// Move the layer one rank toward the back.
    pub fn send_backward(&mut self, id: LayerId, scope: OrderScope) -> Result<(), LayerError> {
        self.reorder(id, scope, Move::Backward)
    }

    fn reorder(&mut self, id: LayerId, scope: OrderScope, op: Move) -> Result<(), LayerError> {
        let parent = self.layer(id)?.parent;
        match scope {
            OrderScope::Tree => {
                let mut ordered = self.ordered_ids();
                shift(&mut ordered, id, op);
                self.renumber(&ordered);
            }
            OrderScope::Siblings => {
                let siblings = match parent {
                    Some(group) => self.layer(group)?.children().to_vec(),
                    None => self.roots.clone(),
                };
                let mut ordered: Vec<LayerId> = siblings;
                ordered.sort_by_key(|s| self.get(*s).map_or(u32::MAX, |l| l.render_order));
                let mut ranks: Vec<u32> = ordered
                    .iter()
                    .filter_map(|s| self.get(*s).map(|l| l.render_order))
                    .collect();
                ranks.sort_unstable();
                shift(&mut ordered, id, op);
                for (sibling, rank) in ordered.iter().zip(ranks) {
                    if let Some(layer) = self.slot_mut(*sibling) {
                        layer.render_order = rank;
                    }
                }
                let compacted = self.ordered_ids();
                self.renumber(&compacted);
            }
        }
        Ok(())
    }

    fn renumber(&mut self, ordered: &[LayerId]) {
        for (rank, id) in ordered.iter().enumerate() {
            if let Some(layer) = self.slot_mut(*id) {
                layer.render_order = rank as u32;
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn slot_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.slots.get_mut(id as usize).and_then(Option::as_mut)
    }

    fn kind_mut(&mut self, id: LayerId) -> Option<&mut LayerKind> {
        self.slot_mut(id).map(|l| &mut l.kind)
    }

    /// Unlink `id` from its parent's children or from the roots.
    fn detach(&mut self, id: LayerId) {
        let parent = self.get(id).and_then(|l| l.parent);
        match parent {
            Some(group) => {
                if let Some(LayerKind::Group(children)) = self.kind_mut(group) {
                    children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }
    }

    fn is_ancestor_or_self(&self, ancestor: LayerId, mut node: LayerId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.get(node).and_then(|l| l.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }
}

fn shift(ordered: &mut Vec<LayerId>, id: LayerId, op: Move) {
    let Some(pos) = ordered.iter().position(|o| *o == id) else {
        return;
    };
    let last = ordered.len() - 1;
    let target = match op {
        Move::ToFront => 0,
        Move::ToBack => last,
        Move::Forward => pos.saturating_sub(1),
        Move::Backward => (pos + 1).min(last),
    };
    let item = ordered.remove(pos);
    ordered.insert(target, item);
}
