use std::sync::Arc;

use mbrt_math::{Interval, Ray};

use crate::error::{RenderError, Result};
use crate::hit::Hit;

/// Per-hit callbacks the engine invokes during traversal.
///
/// Both receive the ray in the object space of the instance being tested.
/// Implementations must be pure functions of their inputs: they run
/// concurrently for independent rays.
pub trait HitCallbacks: Send + Sync {
    /// Intersect custom primitive `prim_id` of instance `instance_id`.
    fn intersect(&self, _ray: &Ray, _instance_id: u32, _prim_id: u32, _ray_t: Interval) -> Option<Hit> {
        None
    }

    /// Accept (`true`) or ignore a candidate hit.
    fn filter(&self, _ray: &Ray, _hit: &Hit) -> bool {
        true
    }
}

/// Callbacks indexed by `(geometry type, ray type)`.
#[derive(Clone)]
pub struct FuncTable {
    geom_types: u32,
    ray_types: u32,
    entries: Vec<Option<Arc<dyn HitCallbacks>>>,
}

impl FuncTable {
    pub fn new(geom_types: u32, ray_types: u32) -> Self {
        Self {
            geom_types,
            ray_types,
            entries: vec![None; (geom_types * ray_types) as usize],
        }
    }

    fn slot(&self, geom_type: u32, ray_type: u32) -> Option<usize> {
        (geom_type < self.geom_types && ray_type < self.ray_types)
            .then(|| (self.geom_types * ray_type + geom_type) as usize)
    }

    pub fn set(&mut self, geom_type: u32, ray_type: u32, callbacks: Arc<dyn HitCallbacks>) -> Result<()> {
        let slot = self
            .slot(geom_type, ray_type)
            .ok_or(RenderError::FuncTableSlot { geom_type, ray_type })?;
        self.entries[slot] = Some(callbacks);
        Ok(())
    }

    pub fn get(&self, geom_type: u32, ray_type: u32) -> Option<&dyn HitCallbacks> {
        self.entries.get(self.slot(geom_type, ray_type)?)?.as_deref()
    }
}

impl std::fmt::Debug for FuncTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuncTable")
            .field("geom_types", &self.geom_types)
            .field("ray_types", &self.ray_types)
            .field("filled", &self.entries.iter().filter(|e| e.is_some()).count())
            .finish()
    }
}
