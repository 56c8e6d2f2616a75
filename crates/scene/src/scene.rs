use glam::Affine3A;
use parkour_common::{SurfaceId, Transform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::geometry::Geometry;

/// Parent chains deeper than this are treated as corrupt.
const MAX_PARENT_DEPTH: usize = 256;

/// An event record produced by every mutation to the scene.
///
/// Collision caches consume these to invalidate only what changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SceneEvent {
    /// Surface was added with the given local transform.
    Added { id: SurfaceId, transform: Transform },
    /// Surface was removed.
    Removed { id: SurfaceId },
    /// Surface local transform was updated.
    TransformUpdated {
        id: SurfaceId,
        old: Transform,
        new: Transform,
    },
    /// Surface geometry was attached, replaced or cleared.
    GeometryReplaced { id: SurfaceId },
    /// Surface moved under a different parent (or to the root).
    Reparented {
        id: SurfaceId,
        parent: Option<SurfaceId>,
    },
}

/// Errors from scene mutations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SceneError {
    #[error("surface {0} not found")]
    UnknownSurface(SurfaceId),
    #[error("parenting {child} under {parent} would create a cycle")]
    ParentCycle { child: SurfaceId, parent: SurfaceId },
}

/// Per-surface data stored in the scene.
#[derive(Debug, Clone)]
pub struct SurfaceNode {
    pub name: String,
    /// Shared so several surfaces can instance one mesh.
    pub geometry: Option<Arc<Geometry>>,
    /// Transform relative to the parent (or the world at the root).
    pub transform: Transform,
    pub parent: Option<SurfaceId>,
}

/// The set of level surfaces.
///
/// Uses BTreeMap for deterministic iteration order across all platforms.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    surfaces: BTreeMap<SurfaceId, SurfaceNode>,
    /// Append-only event log of all mutations.
    event_log: Vec<SceneEvent>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of surfaces in the scene.
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[SceneEvent] {
        &self.event_log
    }

    pub fn surfaces(&self) -> &BTreeMap<SurfaceId, SurfaceNode> {
        &self.surfaces
    }

    /// Add a root surface. Returns its id.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        geometry: Option<Arc<Geometry>>,
        transform: Transform,
    ) -> SurfaceId {
        let id = SurfaceId::new();
        self.add_with_id(id, name, geometry, transform);
        id
    }

    /// Add a root surface under a caller-chosen id, replacing any surface
    /// already stored there. A replaced surface that had a parent also logs
    /// `Reparented` to the root.
    pub fn add_with_id(
        &mut self,
        id: SurfaceId,
        name: impl Into<String>,
        geometry: Option<Arc<Geometry>>,
        transform: Transform,
    ) {
        let replaced = self.surfaces.insert(
            id,
            SurfaceNode {
                name: name.into(),
                geometry,
                transform,
                parent: None,
            },
        );
        self.event_log.push(SceneEvent::Added { id, transform });
        if replaced.is_some_and(|old| old.parent.is_some()) {
            self.event_log
                .push(SceneEvent::Reparented { id, parent: None });
        }
    }

    /// Remove a surface. Its children are re-rooted in place, keeping their
    /// local transforms, and each logs a `Reparented` event.
    pub fn remove(&mut self, id: SurfaceId) -> Option<SurfaceNode> {
        let node = self.surfaces.remove(&id)?;
        for (child_id, child) in self.surfaces.iter_mut() {
            if child.parent == Some(id) {
                child.parent = None;
                self.event_log.push(SceneEvent::Reparented {
                    id: *child_id,
                    parent: None,
                });
            }
        }
        tracing::debug!(id = %id.short(), name = %node.name, "surface removed");
        self.event_log.push(SceneEvent::Removed { id });
        Some(node)
    }

    pub fn get(&self, id: SurfaceId) -> Option<&SurfaceNode> {
        self.surfaces.get(&id)
    }

    /// Update a surface's local transform and log the change.
    pub fn set_transform(&mut self, id: SurfaceId, new: Transform) -> Result<(), SceneError> {
        let node = self
            .surfaces
            .get_mut(&id)
            .ok_or(SceneError::UnknownSurface(id))?;
        let old = node.transform;
        node.transform = new;
        self.event_log
            .push(SceneEvent::TransformUpdated { id, old, new });
        Ok(())
    }

    /// Attach, replace or clear a surface's geometry.
    pub fn set_geometry(
        &mut self,
        id: SurfaceId,
        geometry: Option<Arc<Geometry>>,
    ) -> Result<(), SceneError> {
        let node = self
            .surfaces
            .get_mut(&id)
            .ok_or(SceneError::UnknownSurface(id))?;
        node.geometry = geometry;
        self.event_log.push(SceneEvent::GeometryReplaced { id });
        Ok(())
    }

    /// Move a surface under `parent`, or to the root with `None`.
    pub fn set_parent(
        &mut self,
        id: SurfaceId,
        parent: Option<SurfaceId>,
    ) -> Result<(), SceneError> {
        if !self.surfaces.contains_key(&id) {
            return Err(SceneError::UnknownSurface(id));
        }
        if let Some(p) = parent {
            if !self.surfaces.contains_key(&p) {
                return Err(SceneError::UnknownSurface(p));
            }
            if p == id || self.ancestors(p).any(|a| a == id) {
                tracing::warn!(child = %id.short(), parent = %p.short(), "rejected parent cycle");
                return Err(SceneError::ParentCycle {
                    child: id,
                    parent: p,
                });
            }
        }
        if let Some(node) = self.surfaces.get_mut(&id) {
            node.parent = parent;
        }
        self.event_log.push(SceneEvent::Reparented { id, parent });
        Ok(())
    }

    /// Walk the parent chain upwards, excluding `id` itself.
    pub fn ancestors(&self, id: SurfaceId) -> impl Iterator<Item = SurfaceId> + '_ {
        let mut current = self.surfaces.get(&id).and_then(|n| n.parent);
        std::iter::from_fn(move || {
            let next = current?;
            current = self.surfaces.get(&next).and_then(|n| n.parent);
            Some(next)
        })
        .take(MAX_PARENT_DEPTH)
    }

    /// Whether `ancestor` appears in the parent chain of `id`.
    pub fn is_descendant_of(&self, id: SurfaceId, ancestor: SurfaceId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Compose the parent chain into a local-to-world matrix.
    pub fn world_matrix(&self, id: SurfaceId) -> Option<Affine3A> {
        let node = self.surfaces.get(&id)?;
        let mut matrix = node.transform.to_affine();
        for ancestor in self.ancestors(id) {
            let parent = self.surfaces.get(&ancestor)?;
            matrix = parent.transform.to_affine() * matrix;
        }
        Some(matrix)
    }
}
