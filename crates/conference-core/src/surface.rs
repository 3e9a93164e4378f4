//! Set of rendering surfaces the presentation layer must mount

use indexmap::IndexSet;

use crate::types::SurfaceId;

/// Logical rendering surfaces of one session
///
/// Display order is the local preview, then the screen-share preview, then
/// remote tiles in the order they were mounted.
#[derive(Debug, Default, Clone)]
pub struct SurfaceSet {
    local: bool,
    screen: bool,
    remote: IndexSet<SurfaceId>,
}

impl SurfaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount the local preview; returns `false` if already mounted
    pub fn mount_local(&mut self) -> bool {
        !std::mem::replace(&mut self.local, true)
    }

    pub fn mount_screen(&mut self) -> bool {
        !std::mem::replace(&mut self.screen, true)
    }

    /// Unmount the screen-share preview; returns `false` if it was not mounted
    pub fn unmount_screen(&mut self) -> bool {
        std::mem::replace(&mut self.screen, false)
    }

    /// Mount a remote tile; returns `false` if already mounted
    pub fn mount_remote(&mut self, surface: SurfaceId) -> bool {
        self.remote.insert(surface)
    }

    pub fn unmount_remote(&mut self, surface: &SurfaceId) -> bool {
        self.remote.shift_remove(surface)
    }

    pub fn contains(&self, surface: &SurfaceId) -> bool {
        if *surface == SurfaceId::local() {
            return self.local;
        }
        if *surface == SurfaceId::screen_share() {
            return self.screen;
        }
        self.remote.contains(surface)
    }

    /// Surfaces in display order
    pub fn ordered(&self) -> Vec<SurfaceId> {
        let mut surfaces = Vec::with_capacity(self.remote.len() + 2);
        if self.local {
            surfaces.push(SurfaceId::local());
        }
        if self.screen {
            surfaces.push(SurfaceId::screen_share());
        }
        surfaces.extend(self.remote.iter().cloned());
        surfaces
    }

    pub fn len(&self) -> usize {
        self.local as usize + self.screen as usize + self.remote.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unmount everything, returning the surfaces in display order
    pub fn clear(&mut self) -> Vec<SurfaceId> {
        let surfaces = self.ordered();
        self.local = false;
        self.screen = false;
        self.remote.clear();
        surfaces
    }
}
