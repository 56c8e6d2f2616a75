use glam::Vec3;
use parkour_common::SurfaceId;
use parkour_scene::SceneEvent;
use parry3d::shape::TriMesh;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::config::BvhConfig;
use crate::entry::{BvhEntry, GeometryHash, build_trimesh};
use crate::error::BuildError;
use crate::query::{Ray, RayHit, SphereCast, SphereHit};
use crate::refresh::RefreshTimer;
use crate::source::SurfaceSource;
use crate::stats::RegistryStats;

/// Slack added to world bounds before culling, so grazing queries reach
/// the library.
const BOUNDS_MARGIN: f32 = 1e-3;

#[derive(Debug, Clone, Default)]
struct Counters {
    structures_built: u64,
    structures_shared: u64,
    cache_hits: u64,
    failed_builds: u64,
    refreshes: u64,
}

/// Registry of acceleration structures over static surfaces.
///
/// Queries scan every entry, skip those whose world bounds the query cannot
/// reach, test the rest in local space, and keep the closest hit. Entries
/// are iterated in `SurfaceId` order, so ties resolve the same way on
/// every run.
#[derive(Debug)]
pub struct BvhManager {
    config: BvhConfig,
    entries: BTreeMap<SurfaceId, BvhEntry>,
    /// Structures reusable by any surface with the same geometry. Held
    /// weakly, so a structure lives exactly as long as something uses it.
    shared: HashMap<GeometryHash, Weak<TriMesh>>,
    refresh: RefreshTimer,
    counters: Counters,
}

impl Default for BvhManager {
    fn default() -> Self {
        Self::new(BvhConfig::default())
    }
}

impl BvhManager {
    pub fn new(config: BvhConfig) -> Self {
        let refresh = RefreshTimer::new(config.refresh_interval());
        Self {
            config,
            entries: BTreeMap::new(),
            shared: HashMap::new(),
            refresh,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &BvhConfig {
        &self.config
    }

    /// Build (or return the cached) entry for a surface.
    ///
    /// Failures are logged and reported as `None`; callers treat that as
    /// "nothing to collide with".
    pub fn build<S>(&mut self, source: &S, id: SurfaceId) -> Option<&BvhEntry>
    where
        S: SurfaceSource + ?Sized,
    {
        match self.try_build(source, id) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(surface = %id.short(), %err, "skipping BVH build");
                None
            }
        }
    }

    /// Build (or return the cached) entry for a surface, reporting why a
    /// build failed.
    pub fn try_build<S>(&mut self, source: &S, id: SurfaceId) -> Result<&BvhEntry, BuildError>
    where
        S: SurfaceSource + ?Sized,
    {
        let share = self.config.share_geometry;
        match self.entries.entry(id) {
            Entry::Occupied(slot) => {
                self.counters.cache_hits += 1;
                tracing::trace!(surface = %id.short(), "BVH cache hit");
                Ok(&*slot.into_mut())
            }
            Entry::Vacant(slot) => {
                let _span = tracing::debug_span!("bvh_build", surface = %id.short()).entered();
                match construct(share, &mut self.shared, &mut self.counters, source, id) {
                    Ok(entry) => {
                        tracing::debug!(triangles = entry.triangle_count(), "BVH registered");
                        Ok(&*slot.insert(entry))
                    }
                    Err(err) => {
                        self.counters.failed_builds += 1;
                        Err(err)
                    }
                }
            }
        }
    }

    /// Build every surface the source lists that carries geometry.
    /// Returns how many are registered afterwards.
    pub fn build_all<S>(&mut self, source: &S) -> usize
    where
        S: SurfaceSource + ?Sized,
    {
        let _span = tracing::info_span!("bvh_build_all").entered();
        let mut registered = 0;
        for id in source.surface_ids() {
            if source.geometry(id).is_none() {
                continue;
            }
            if self.build(source, id).is_some() {
                registered += 1;
            }
        }
        tracing::debug!(registered, total = self.entries.len(), "build_all complete");
        registered
    }

    /// Drop a surface's entry. Returns whether it was registered.
    pub fn remove(&mut self, id: SurfaceId) -> bool {
        let Some(entry) = self.entries.remove(&id) else {
            return false;
        };
        drop(entry);
        prune_shared(&mut self.shared);
        tracing::debug!(surface = %id.short(), "BVH removed");
        true
    }

    /// Discard and rebuild a surface's entry, e.g. after its geometry changed.
    pub fn rebuild<S>(&mut self, source: &S, id: SurfaceId) -> Option<&BvhEntry>
    where
        S: SurfaceSource + ?Sized,
    {
        self.remove(id);
        self.build(source, id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.shared.clear();
        self.refresh.reset();
    }

    pub fn contains(&self, id: SurfaceId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: SurfaceId) -> Option<&BvhEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered surfaces in id order.
    pub fn surfaces(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.entries.keys().copied()
    }

    /// Recompute one surface's cached transforms from the source.
    pub fn update_transform<S>(&mut self, source: &S, id: SurfaceId) -> bool
    where
        S: SurfaceSource + ?Sized,
    {
        match self.entries.get_mut(&id) {
            Some(entry) => refresh_entry(source, id, entry),
            None => false,
        }
    }

    /// Recompute every cached transform. Returns how many entries changed.
    pub fn refresh_transforms<S>(&mut self, source: &S) -> usize
    where
        S: SurfaceSource + ?Sized,
    {
        let _span = tracing::debug_span!("bvh_refresh").entered();
        let mut refreshed = 0;
        for (id, entry) in self.entries.iter_mut() {
            if refresh_entry(source, *id, entry) {
                refreshed += 1;
            }
        }
        self.counters.refreshes += 1;
        tracing::trace!(refreshed, total = self.entries.len(), "transforms refreshed");
        refreshed
    }

    /// Advance the refresh timer by one frame's delta, refreshing every
    /// cached transform when the interval elapses.
    pub fn tick<S>(&mut self, source: &S, dt: Duration) -> bool
    where
        S: SurfaceSource + ?Sized,
    {
        if !self.refresh.advance(dt) {
            return false;
        }
        self.refresh_transforms(source);
        true
    }

    /// Time until the next timed refresh.
    pub fn next_refresh_in(&self) -> Duration {
        self.refresh.remaining()
    }

    /// Update the registry from scene mutations instead of waiting for the
    /// timer. Returns how many entries were touched.
    pub fn apply_events<S>(&mut self, source: &S, events: &[SceneEvent]) -> usize
    where
        S: SurfaceSource + ?Sized,
    {
        let mut touched = 0;
        for event in events {
            match event {
                // Re-adding under a registered id replaces the surface wholesale.
                SceneEvent::Added { id, .. } => {
                    if self.contains(*id) {
                        self.rebuild(source, *id);
                        touched += 1 + self.refresh_subtree(source, *id);
                    }
                }
                SceneEvent::Removed { id } => {
                    if self.remove(*id) {
                        touched += 1;
                    }
                }
                SceneEvent::TransformUpdated { id, .. } | SceneEvent::Reparented { id, .. } => {
                    touched += self.refresh_subtree(source, *id);
                }
                SceneEvent::GeometryReplaced { id } => {
                    if self.contains(*id) {
                        self.rebuild(source, *id);
                        touched += 1;
                    }
                }
            }
        }
        touched
    }

    /// Refresh `root` and every registered surface below it.
    fn refresh_subtree<S>(&mut self, source: &S, root: SurfaceId) -> usize
    where
        S: SurfaceSource + ?Sized,
    {
        let mut refreshed = 0;
        for (id, entry) in self.entries.iter_mut() {
            let moved = *id == root || source.is_descendant_of(*id, root);
            if moved && refresh_entry(source, *id, entry) {
                refreshed += 1;
            }
        }
        refreshed
    }

    /// Closest hit of a world ray across all registered surfaces, or `None`
    /// if nothing lies within `max_distance`.
    pub fn raycast(&self, ray: &Ray, max_distance: f32) -> Option<RayHit> {
        if !ray.is_valid() || !(max_distance > 0.0) {
            return None;
        }
        let mut best: Option<RayHit> = None;
        for (id, entry) in &self.entries {
            let limit = best.map_or(max_distance, |b| b.distance);
            let bounds = entry.world_bounds().expanded(BOUNDS_MARGIN);
            if bounds.ray_entry(ray.origin, ray.direction, limit).is_none() {
                continue;
            }
            let Some(hit) = entry.cast_ray(*id, ray, limit) else {
                continue;
            };
            if hit.distance <= max_distance && best.is_none_or(|b| hit.distance < b.distance) {
                best = Some(hit);
            }
        }
        best
    }

    /// Nearest hit on every surface the ray reaches, closest first.
    pub fn raycast_all(&self, ray: &Ray, max_distance: f32) -> Vec<RayHit> {
        if !ray.is_valid() || !(max_distance > 0.0) {
            return Vec::new();
        }
        let mut hits: Vec<RayHit> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry
                    .world_bounds()
                    .expanded(BOUNDS_MARGIN)
                    .ray_entry(ray.origin, ray.direction, max_distance)
                    .is_some()
            })
            .filter_map(|(id, entry)| entry.cast_ray(*id, ray, max_distance))
            .filter(|hit| hit.distance <= max_distance)
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    /// World Y of the nearest surface straight below `point`.
    pub fn ground_height(&self, point: Vec3, max_distance: f32) -> Option<f32> {
        self.raycast(&Ray::down(point), max_distance)
            .map(|hit| hit.point.y)
    }

    /// First surface a swept sphere touches, across all registered surfaces.
    pub fn sphere_cast(&self, cast: &SphereCast) -> Option<SphereHit> {
        if !cast.is_valid() {
            return None;
        }
        let mut best: Option<SphereHit> = None;
        for (id, entry) in &self.entries {
            let limit = best.map_or(cast.max_distance, |b| b.distance);
            let bounds = entry.world_bounds().expanded(cast.radius + BOUNDS_MARGIN);
            if bounds.ray_entry(cast.origin, cast.direction, limit).is_none() {
                continue;
            }
            let bounded = SphereCast {
                max_distance: limit,
                ..*cast
            };
            let Some(hit) = entry.cast_sphere(*id, &bounded) else {
                continue;
            };
            if hit.distance <= cast.max_distance && best.is_none_or(|b| hit.distance < b.distance)
            {
                best = Some(hit);
            }
        }
        best
    }

    /// Surfaces a static sphere currently touches, in id order.
    pub fn overlapping(&self, center: Vec3, radius: f32) -> Vec<SurfaceId> {
        if !center.is_finite() || !(radius > 0.0) {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|(_, entry)| {
                entry
                    .world_bounds()
                    .expanded(BOUNDS_MARGIN)
                    .intersects_sphere(center, radius)
            })
            .filter(|(id, entry)| entry.intersects_sphere(**id, center, radius))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let structures: HashSet<*const TriMesh> = self
            .entries
            .values()
            .map(|entry| Arc::as_ptr(entry.shape()))
            .collect();
        RegistryStats {
            entries: self.entries.len(),
            structures: structures.len(),
            triangles: self.entries.values().map(|e| e.triangle_count()).sum(),
            structures_built: self.counters.structures_built,
            structures_shared: self.counters.structures_shared,
            cache_hits: self.counters.cache_hits,
            failed_builds: self.counters.failed_builds,
            refreshes: self.counters.refreshes,
        }
    }
}

/// Read, validate and wrap one surface's geometry, reusing a shared
/// structure when the geometry has been seen before.
fn construct<S>(
    share: bool,
    shared: &mut HashMap<GeometryHash, Weak<TriMesh>>,
    counters: &mut Counters,
    source: &S,
    id: SurfaceId,
) -> Result<BvhEntry, BuildError>
where
    S: SurfaceSource + ?Sized,
{
    let world = source
        .world_matrix(id)
        .ok_or(BuildError::UnknownSurface(id))?;
    let geometry = source.geometry(id).ok_or(BuildError::MissingGeometry(id))?;
    geometry
        .validate()
        .map_err(|source| BuildError::InvalidGeometry { id, source })?;

    let hash = GeometryHash::of(geometry);
    let reusable = shared.get(&hash).and_then(Weak::upgrade);
    if reusable.is_none() {
        shared.remove(&hash);
    }
    let shape = match reusable {
        Some(shape) if share => {
            counters.structures_shared += 1;
            tracing::trace!(%hash, "reusing shared structure");
            shape
        }
        _ => {
            let shape = Arc::new(build_trimesh(id, geometry)?);
            counters.structures_built += 1;
            if share {
                shared.insert(hash, Arc::downgrade(&shape));
            }
            shape
        }
    };

    let entry = BvhEntry::new(id, shape, geometry, hash, world);
    if entry.is_err() {
        prune_shared(shared);
    }
    entry
}

/// Forget shared structures nothing holds any more.
fn prune_shared(shared: &mut HashMap<GeometryHash, Weak<TriMesh>>) {
    shared.retain(|hash, shape| {
        let live = shape.strong_count() > 0;
        if !live {
            tracing::trace!(%hash, "released shared structure");
        }
        live
    });
}

fn refresh_entry<S>(source: &S, id: SurfaceId, entry: &mut BvhEntry) -> bool
where
    S: SurfaceSource + ?Sized,
{
    let Some(world) = source.world_matrix(id) else {
        tracing::debug!(surface = %id.short(), "surface left the scene; keeping last transform");
        return false;
    };
    if world == *entry.world_matrix() {
        return false;
    }
    match entry.set_world(id, world) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(surface = %id.short(), %err, "keeping last transform");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parkour_common::Transform;
    use parkour_scene::{Geometry, Scene};

    fn floor(scene: &mut Scene, y: f32) -> SurfaceId {
        scene.add(
            format!("floor@{y}"),
            Some(Arc::new(Geometry::plane(20.0, 20.0))),
            Transform::from_position(Vec3::new(0.0, y, 0.0)),
        )
    }

    fn crate_box(scene: &mut Scene, position: Vec3) -> SurfaceId {
        scene.add(
            "crate",
            Some(Arc::new(Geometry::cuboid(Vec3::splat(0.5)))),
            Transform::from_position(position),
        )
    }

    // Off both triangle diagonals of the plane and box tops.
    const PROBE_X: f32 = 1.0;
    const PROBE_Z: f32 = -2.0;

    fn above(y: f32) -> Vec3 {
        Vec3::new(PROBE_X, y, PROBE_Z)
    }

    #[test]
    fn build_twice_returns_cached_entry() {
        let mut scene = Scene::new();
        let id = floor(&mut scene, 0.0);
        let mut bvh = BvhManager::default();

        let first = bvh.build(&scene, id).map(|e| e as *const BvhEntry);
        let second = bvh.build(&scene, id).map(|e| e as *const BvhEntry);
        assert!(first.is_some());
        assert_eq!(first, second);

        let stats = bvh.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.structures_built, 1);
        assert_eq!(stats.cache_hits, 1);
    }

    #[test]
    fn removed_surface_is_ignored() {
        let mut scene = Scene::new();
        let low = floor(&mut scene, 0.0);
        let high = floor(&mut scene, 5.0);
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);

        assert_eq!(bvh.raycast(&Ray::down(above(10.0)), 100.0).unwrap().surface, high);
        assert!(bvh.remove(high));
        assert!(!bvh.remove(high));
        assert_eq!(bvh.raycast(&Ray::down(above(10.0)), 100.0).unwrap().surface, low);
        assert!(bvh.remove(low));
        assert!(bvh.raycast(&Ray::down(above(10.0)), 100.0).is_none());
    }

    #[test]
    fn raycast_picks_globally_closest() {
        let mut scene = Scene::new();
        let ids: Vec<SurfaceId> = [-3.0, 2.0, 0.0, 7.0]
            .into_iter()
            .map(|y| floor(&mut scene, y))
            .collect();
        let mut bvh = BvhManager::default();
        assert_eq!(bvh.build_all(&scene), 4);

        // From y=4 looking down, y=2 is closest; y=7 is behind the ray.
        let hit = bvh.raycast(&Ray::down(above(4.0)), 100.0).unwrap();
        assert_eq!(hit.surface, ids[1]);
        assert!((hit.distance - 2.0).abs() < 1e-4);
        assert!((hit.normal - Vec3::Y).length() < 1e-4);

        let all = bvh.raycast_all(&Ray::down(above(4.0)), 100.0);
        let order: Vec<SurfaceId> = all.iter().map(|h| h.surface).collect();
        assert_eq!(order, vec![ids[1], ids[2], ids[0]]);
    }

    #[test]
    fn raycast_respects_max_distance() {
        let mut scene = Scene::new();
        floor(&mut scene, 0.0);
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);

        assert!(bvh.raycast(&Ray::down(above(10.0)), 9.0).is_none());
        assert!(bvh.raycast(&Ray::down(above(10.0)), 10.5).is_some());
        assert!(bvh.raycast_all(&Ray::down(above(10.0)), 9.0).is_empty());
    }

    #[test]
    fn raycast_rejects_degenerate_queries() {
        let mut scene = Scene::new();
        floor(&mut scene, 0.0);
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);

        assert!(bvh.raycast(&Ray::new(above(1.0), Vec3::ZERO), 10.0).is_none());
        assert!(bvh.raycast(&Ray::down(above(1.0)), 0.0).is_none());
        assert!(bvh.raycast(&Ray::down(above(1.0)), f32::NAN).is_none());
    }

    #[test]
    fn ground_height_returns_world_y() {
        let mut scene = Scene::new();
        floor(&mut scene, -1.5);
        crate_box(&mut scene, Vec3::new(PROBE_X + 0.2, 0.0, PROBE_Z));
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);

        // Box top at y=0.5 sits above the floor.
        let h = bvh.ground_height(above(3.0), 50.0).unwrap();
        assert!((h - 0.5).abs() < 1e-4);

        // Off to the side only the floor is below.
        let h = bvh.ground_height(Vec3::new(6.0, 3.0, 4.0), 50.0).unwrap();
        assert!((h + 1.5).abs() < 1e-4);

        // Out of range and off the edge of the level.
        assert!(bvh.ground_height(above(3.0), 1.0).is_none());
        assert!(bvh.ground_height(Vec3::new(50.0, 3.0, 50.0), 50.0).is_none());
    }

    #[test]
    fn rotated_and_scaled_surfaces_hit_in_world_space() {
        let mut scene = Scene::new();
        // A 2x2 plane stood up into a wall at x=5 facing the origin, stretched 3x.
        let wall = scene.add(
            "wall",
            Some(Arc::new(Geometry::plane(2.0, 2.0))),
            Transform {
                position: Vec3::new(5.0, 0.0, 0.0),
                rotation: glam::Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
                scale: Vec3::splat(3.0),
            },
        );
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);

        let hit = bvh
            .raycast(&Ray::new(Vec3::new(0.0, 2.0, 0.5), Vec3::X), 100.0)
            .unwrap();
        assert_eq!(hit.surface, wall);
        assert!((hit.point.x - 5.0).abs() < 1e-4);
        assert!((hit.distance - 5.0).abs() < 1e-4);
        assert!((hit.normal - Vec3::NEG_X).length() < 1e-4);

        // y=2 is inside the scaled wall (half-height 3) but y=4 is above it.
        assert!(bvh
            .raycast(&Ray::new(Vec3::new(0.0, 4.0, 0.5), Vec3::X), 100.0)
            .is_none());
    }

    #[test]
    fn missing_geometry_is_skipped() {
        let mut scene = Scene::new();
        let empty = scene.add("group", None, Transform::default());
        let mut bvh = BvhManager::default();

        assert!(bvh.build(&scene, empty).is_none());
        assert!(!bvh.contains(empty));
        assert_eq!(bvh.stats().failed_builds, 1);
        assert_eq!(
            bvh.try_build(&scene, empty).unwrap_err(),
            BuildError::MissingGeometry(empty)
        );
        // build_all skips geometry-less nodes without counting a failure.
        assert_eq!(bvh.build_all(&scene), 0);
        assert_eq!(bvh.stats().failed_builds, 2);
    }

    #[test]
    fn unknown_and_invalid_surfaces_fail() {
        let mut scene = Scene::new();
        let bad = scene.add(
            "bad",
            Some(Arc::new(Geometry::new(vec![[0.0; 3]; 3], Some(vec![[0, 1, 9]])))),
            Transform::default(),
        );
        let ghost = SurfaceId::new();
        let mut bvh = BvhManager::default();

        assert_eq!(
            bvh.try_build(&scene, ghost).unwrap_err(),
            BuildError::UnknownSurface(ghost)
        );
        assert!(matches!(
            bvh.try_build(&scene, bad),
            Err(BuildError::InvalidGeometry { id, .. }) if id == bad
        ));
        assert!(bvh.is_empty());
    }

    #[test]
    fn singular_transform_fails_without_leaking_shared_structure() {
        let mut scene = Scene::new();
        let flat = scene.add(
            "flat",
            Some(Arc::new(Geometry::cuboid(Vec3::ONE))),
            Transform {
                scale: Vec3::new(1.0, 0.0, 1.0),
                ..Transform::default()
            },
        );
        let mut bvh = BvhManager::default();
        assert_eq!(
            bvh.try_build(&scene, flat).unwrap_err(),
            BuildError::SingularTransform(flat)
        );
        assert!(bvh.shared.is_empty());
    }

    #[test]
    fn identical_geometry_shares_one_structure() {
        let mut scene = Scene::new();
        let a = crate_box(&mut scene, Vec3::new(0.0, 0.0, 0.0));
        let b = crate_box(&mut scene, Vec3::new(3.0, 0.0, 0.0));
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);

        let stats = bvh.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.structures, 1);
        assert_eq!(stats.structures_built, 1);
        assert_eq!(stats.structures_shared, 1);
        assert_eq!(stats.triangles, 24);

        bvh.remove(a);
        assert_eq!(bvh.shared.len(), 1);
        bvh.remove(b);
        assert!(bvh.shared.is_empty());
    }

    #[test]
    fn sharing_can_be_disabled() {
        let mut scene = Scene::new();
        crate_box(&mut scene, Vec3::ZERO);
        crate_box(&mut scene, Vec3::X * 3.0);
        let mut bvh = BvhManager::new(BvhConfig {
            share_geometry: false,
            ..BvhConfig::default()
        });
        bvh.build_all(&scene);

        let stats = bvh.stats();
        assert_eq!(stats.structures, 2);
        assert_eq!(stats.structures_built, 2);
        assert!(bvh.shared.is_empty());
    }

    #[test]
    fn tick_refreshes_only_after_interval() {
        let mut scene = Scene::new();
        let id = floor(&mut scene, 0.0);
        let mut bvh = BvhManager::new(BvhConfig {
            refresh_interval_ms: 100,
            ..BvhConfig::default()
        });
        bvh.build_all(&scene);

        scene
            .set_transform(id, Transform::from_position(Vec3::new(0.0, 3.0, 0.0)))
            .unwrap();

        assert!(!bvh.tick(&scene, Duration::from_millis(60)));
        let stale = bvh.ground_height(above(10.0), 50.0).unwrap();
        assert!(stale.abs() < 1e-4);

        assert!(bvh.tick(&scene, Duration::from_millis(60)));
        let fresh = bvh.ground_height(above(10.0), 50.0).unwrap();
        assert!((fresh - 3.0).abs() < 1e-4);
        assert_eq!(bvh.stats().refreshes, 1);
    }

    #[test]
    fn update_transform_targets_one_surface() {
        let mut scene = Scene::new();
        let id = floor(&mut scene, 0.0);
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);

        scene
            .set_transform(id, Transform::from_position(Vec3::new(0.0, -2.0, 0.0)))
            .unwrap();
        assert!(bvh.update_transform(&scene, id));
        assert!(!bvh.update_transform(&scene, id));
        assert!(!bvh.update_transform(&scene, SurfaceId::new()));
        let h = bvh.ground_height(above(10.0), 50.0).unwrap();
        assert!((h + 2.0).abs() < 1e-4);
    }

    #[test]
    fn refresh_keeps_entries_for_vanished_surfaces() {
        let mut scene = Scene::new();
        let id = floor(&mut scene, 0.0);
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);

        scene.remove(id);
        assert_eq!(bvh.refresh_transforms(&scene), 0);
        // Removal is explicit: the entry still answers queries.
        assert!(bvh.contains(id));
        assert!(bvh.ground_height(above(10.0), 50.0).is_some());
    }

    #[test]
    fn events_drive_removal_moves_and_rebuilds() {
        let mut scene = Scene::new();
        let parent = scene.add("platform", None, Transform::default());
        let child = crate_box(&mut scene, Vec3::ZERO);
        scene.set_parent(child, Some(parent)).unwrap();
        let lone = floor(&mut scene, -5.0);
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);
        scene.drain_events();

        // Moving the parent moves the registered child.
        scene
            .set_transform(parent, Transform::from_position(Vec3::new(0.0, 2.0, 0.0)))
            .unwrap();
        let events = scene.drain_events();
        assert_eq!(bvh.apply_events(&scene, &events), 1);
        let h = bvh.ground_height(Vec3::new(0.1, 10.0, -0.3), 50.0).unwrap();
        assert!((h - 2.5).abs() < 1e-4);

        // Swapping in bigger geometry rebuilds the entry.
        scene
            .set_geometry(child, Some(Arc::new(Geometry::cuboid(Vec3::splat(2.0)))))
            .unwrap();
        let events = scene.drain_events();
        assert_eq!(bvh.apply_events(&scene, &events), 1);
        let h = bvh.ground_height(Vec3::new(1.5, 10.0, -1.2), 50.0).unwrap();
        assert!((h - 4.0).abs() < 1e-4);

        scene.remove(lone);
        let events = scene.drain_events();
        assert_eq!(bvh.apply_events(&scene, &events), 1);
        assert!(!bvh.contains(lone));
    }

    #[test]
    fn re_adding_registered_id_rebuilds_entry() {
        let mut scene = Scene::new();
        let root = scene.add("root", None, Transform::default());
        let id = SurfaceId::new();
        scene.add_with_id(
            id,
            "floor",
            Some(Arc::new(Geometry::plane(20.0, 20.0))),
            Transform::default(),
        );
        scene.set_parent(id, Some(root)).unwrap();
        scene
            .set_transform(root, Transform::from_position(Vec3::new(0.0, -4.0, 0.0)))
            .unwrap();
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);
        scene.drain_events();
        let h = bvh.ground_height(above(10.0), 50.0).unwrap();
        assert!((h + 4.0).abs() < 1e-4);

        // Same id, new geometry and transform, and no longer parented.
        scene.add_with_id(
            id,
            "crate",
            Some(Arc::new(Geometry::cuboid(Vec3::splat(0.5)))),
            Transform::from_position(Vec3::new(PROBE_X + 0.2, 3.0, PROBE_Z)),
        );
        let events = scene.drain_events();
        assert!(bvh.apply_events(&scene, &events) >= 1);
        let h = bvh.ground_height(above(10.0), 50.0).unwrap();
        assert!((h - 3.5).abs() < 1e-4);
        assert_eq!(bvh.get(id).unwrap().triangle_count(), 12);

        // Adding an id the registry never saw is left to an explicit build.
        let fresh = floor(&mut scene, 1.0);
        let events = scene.drain_events();
        assert_eq!(bvh.apply_events(&scene, &events), 0);
        assert!(!bvh.contains(fresh));
    }

    #[test]
    fn shared_structure_outlived_by_a_clone_is_released() {
        let mut scene = Scene::new();
        let a = crate_box(&mut scene, Vec3::ZERO);
        let b = crate_box(&mut scene, Vec3::X * 3.0);
        let mut bvh = BvhManager::default();
        bvh.build(&scene, a);

        let held = bvh.get(a).cloned().unwrap();
        let structure = Arc::downgrade(held.shape());
        assert!(bvh.remove(a));
        // The clone still holds the structure, so it stays reusable.
        assert_eq!(bvh.shared.len(), 1);
        drop(held);
        assert!(structure.upgrade().is_none());

        // A dead slot is never revived: the next build constructs afresh.
        bvh.build(&scene, b);
        assert_eq!(bvh.stats().structures_built, 2);
        assert_eq!(bvh.stats().structures_shared, 0);
        assert_eq!(bvh.shared.len(), 1);
        bvh.remove(b);
        assert!(bvh.shared.is_empty());
    }

    #[test]
    fn sphere_cast_picks_nearest_wall() {
        let mut scene = Scene::new();
        let near = crate_box(&mut scene, Vec3::new(4.0, 0.0, 0.0));
        crate_box(&mut scene, Vec3::new(8.0, 0.0, 0.0));
        crate_box(&mut scene, Vec3::new(-4.0, 0.0, 0.0));
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);

        let cast = SphereCast::new(Vec3::new(0.0, 0.1, 0.2), Vec3::X, 0.5, 20.0);
        let hit = bvh.sphere_cast(&cast).unwrap();
        assert_eq!(hit.surface, near);
        // Box face at x=3.5, sphere radius 0.5.
        assert!((hit.distance - 3.0).abs() < 1e-2);
        assert!(hit.normal.x < -0.9);

        let short = SphereCast::new(Vec3::new(0.0, 0.1, 0.2), Vec3::X, 0.5, 2.0);
        assert!(bvh.sphere_cast(&short).is_none());
    }

    #[test]
    fn sphere_starting_in_contact_reports_zero() {
        let mut scene = Scene::new();
        crate_box(&mut scene, Vec3::ZERO);
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);

        let cast = SphereCast::new(Vec3::new(0.8, 0.1, 0.2), Vec3::X, 0.5, 5.0);
        let hit = bvh.sphere_cast(&cast).unwrap();
        assert!(hit.distance.abs() < 1e-4);
    }

    #[test]
    fn overlapping_lists_touched_surfaces() {
        let mut scene = Scene::new();
        let a = crate_box(&mut scene, Vec3::ZERO);
        let b = crate_box(&mut scene, Vec3::new(1.5, 0.0, 0.0));
        crate_box(&mut scene, Vec3::new(10.0, 0.0, 0.0));
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);

        let mut touched = bvh.overlapping(Vec3::new(0.75, 0.1, 0.2), 0.4);
        touched.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(touched, expected);
        assert!(bvh.overlapping(Vec3::new(5.0, 0.0, 0.0), 0.4).is_empty());
        assert!(bvh.overlapping(Vec3::ZERO, 0.0).is_empty());
    }

    #[test]
    fn clear_empties_registry() {
        let mut scene = Scene::new();
        crate_box(&mut scene, Vec3::ZERO);
        let mut bvh = BvhManager::default();
        bvh.build_all(&scene);
        bvh.clear();
        assert!(bvh.is_empty());
        assert_eq!(bvh.stats().structures, 0);
        assert!(bvh.raycast(&Ray::down(Vec3::Y * 5.0), 10.0).is_none());
    }
}
