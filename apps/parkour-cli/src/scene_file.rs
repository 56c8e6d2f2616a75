use anyhow::{Context, bail};
use glam::Vec3;
use parkour_common::{SurfaceId, Transform};
use parkour_scene::{Geometry, Scene};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// On-disk level description: a flat list of surfaces, optionally parented
/// by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneFile {
    #[serde(default)]
    pub surfaces: Vec<SurfaceDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceDef {
    pub name: String,
    /// Omitted for pure grouping nodes.
    #[serde(default)]
    pub shape: Option<ShapeDef>,
    #[serde(default)]
    pub transform: Transform,
    /// Name of an earlier surface to attach to.
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeDef {
    Cuboid {
        half_extents: Vec3,
    },
    Plane {
        width: f32,
        depth: f32,
    },
    Mesh {
        positions: Vec<[f32; 3]>,
        #[serde(default)]
        indices: Option<Vec<[u32; 3]>>,
    },
}

impl ShapeDef {
    fn to_geometry(&self) -> Geometry {
        match self {
            ShapeDef::Cuboid { half_extents } => Geometry::cuboid(*half_extents),
            ShapeDef::Plane { width, depth } => Geometry::plane(*width, *depth),
            ShapeDef::Mesh { positions, indices } => {
                Geometry::new(positions.clone(), indices.clone())
            }
        }
    }
}

/// A loaded scene plus the ids assigned to each named surface.
pub struct LoadedScene {
    pub scene: Scene,
    pub names: BTreeMap<String, SurfaceId>,
}

impl LoadedScene {
    /// Name of a surface, or its short id when unnamed.
    pub fn label(&self, id: SurfaceId) -> String {
        self.scene
            .get(id)
            .map(|node| node.name.clone())
            .unwrap_or_else(|| id.short())
    }
}

impl SceneFile {
    /// Read a scene file; `.json` is parsed as JSON, anything else as YAML.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scene file {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let file = if is_json {
            serde_json::from_str(&text)
                .with_context(|| format!("parsing JSON scene {}", path.display()))?
        } else {
            serde_yaml::from_str(&text)
                .with_context(|| format!("parsing YAML scene {}", path.display()))?
        };
        Ok(file)
    }

    /// Instantiate the surfaces. Parents must appear before their children.
    pub fn build(&self) -> anyhow::Result<LoadedScene> {
        let mut scene = Scene::new();
        let mut names = BTreeMap::new();
        for def in &self.surfaces {
            if names.contains_key(&def.name) {
                bail!("duplicate surface name {:?}", def.name);
            }
            let geometry = def
                .shape
                .as_ref()
                .map(|shape| Arc::new(shape.to_geometry()));
            let id = scene.add(def.name.clone(), geometry, def.transform);
            if let Some(parent_name) = &def.parent {
                let Some(&parent) = names.get(parent_name) else {
                    bail!(
                        "surface {:?} names unknown parent {:?}",
                        def.name,
                        parent_name
                    );
                };
                scene.set_parent(id, Some(parent))?;
            }
            names.insert(def.name.clone(), id);
        }
        tracing::debug!(surfaces = scene.surface_count(), "scene built");
        Ok(LoadedScene { scene, names })
    }
}
