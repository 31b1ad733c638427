use rand::Rng;

use super::{Scene, SceneDescriptor};

/// Index of a descriptor inside its layer's [`SceneCatalog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(pub usize);

/// Ordered registry of the scenes a layer rotates through.
///
/// Entries are never removed, so a [`SceneId`] stays valid for the lifetime of
/// the catalog. The same name may be registered more than once; each copy is
/// picked independently.
#[derive(Debug, Default)]
pub struct SceneCatalog {
    scenes: Vec<SceneDescriptor>,
    empty: Option<SceneId>,
}

impl SceneCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with the built-in [`super::EmptyScene`] as its
    /// reserved empty entry.
    pub fn with_empty() -> Self {
        let mut catalog = Self::new();
        catalog.register_empty(SceneDescriptor::empty());
        catalog
    }

    /// Appends a descriptor and returns its id.
    pub fn register(&mut self, descriptor: SceneDescriptor) -> SceneId {
        let id = SceneId(self.scenes.len());
        self.scenes.push(descriptor);
        id
    }

    /// Registers a descriptor and reserves it as the layer's empty scene. The
    /// entry still takes part in random rotation.
    pub fn register_empty(&mut self, descriptor: SceneDescriptor) -> SceneId {
        let id = self.register(descriptor);
        self.empty = Some(id);
        id
    }

    /// Draws a scene uniformly at random.
    ///
    /// With `exclude`, the draw is uniform over every other entry; a catalog
    /// holding only the excluded entry returns it anyway.
    pub fn pick_random<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        exclude: Option<SceneId>,
    ) -> Option<SceneId> {
        let len = self.scenes.len();
        match exclude {
            _ if len == 0 => None,
            Some(excluded) if excluded.0 < len && len > 1 => {
                let index = rng.gen_range(0..len - 1);
                Some(SceneId(if index >= excluded.0 { index + 1 } else { index }))
            }
            _ => Some(SceneId(rng.gen_range(0..len))),
        }
    }

    /// Returns the reserved empty scene, if one was registered.
    pub fn empty_scene(&self) -> Option<SceneId> {
        self.empty
    }

    /// First entry registered under `name`.
    pub fn find(&self, name: &str) -> Option<SceneId> {
        self.scenes
            .iter()
            .position(|descriptor| descriptor.name == name)
            .map(SceneId)
    }

    /// Returns the descriptor behind `id`.
    pub fn get(&self, id: SceneId) -> Option<&SceneDescriptor> {
        self.scenes.get(id.0)
    }

    /// Returns the name registered for `id`.
    pub fn name(&self, id: SceneId) -> Option<&str> {
        self.get(id).map(|descriptor| descriptor.name.as_str())
    }

    /// Returns every registered name in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenes.iter().map(|descriptor| descriptor.name.as_str())
    }

    pub(crate) fn scene_mut(&mut self, id: SceneId) -> Option<&mut (dyn Scene + 'static)> {
        self.scenes
            .get_mut(id.0)
            .map(|descriptor| descriptor.scene.as_mut())
    }

    /// Returns `true` if `id` belongs to this catalog.
    pub fn contains(&self, id: SceneId) -> bool {
        id.0 < self.scenes.len()
    }

    /// Returns the number of registered entries, duplicates included.
    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}
