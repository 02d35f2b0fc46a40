//! Scoped ownership of engine handles

use super::{Handle, PhysicsWorld};

/// Owns a world and every handle created while building a scene.
///
/// Dropping the arena destroys the handles in reverse creation order, then
/// drops the world itself.
pub struct SceneArena<W: PhysicsWorld> {
    world: W,
    handles: Vec<Handle>,
}

impl<W: PhysicsWorld> SceneArena<W> {
    pub fn new(world: W) -> Self {
        Self {
            world,
            handles: Vec::new(),
        }
    }

    /// Record a freshly created handle and hand it back
    pub fn track<H: Into<Handle> + Copy>(&mut self, handle: H) -> H {
        self.handles.push(handle.into());
        handle
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn tracked(&self) -> usize {
        self.handles.len()
    }

    /// Destroy every tracked handle now, keeping the (empty) world
    pub fn release(&mut self) {
        while let Some(handle) = self.handles.pop() {
            self.world.destroy(handle);
        }
    }
}

impl<W: PhysicsWorld> Drop for SceneArena<W> {
    fn drop(&mut self) {
        let count = self.handles.len();
        self.release();
        if count > 0 {
            log::debug!("scene arena released {} handles", count);
        }
    }
}
