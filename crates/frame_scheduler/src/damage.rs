use std::collections::BTreeMap;

use frame_protocol::SurfaceId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildDamage {
    pub damaged: bool,
    pub expected: bool,
}

/// Which surfaces produced damage this frame and which ones are still expected.
#[derive(Debug, Clone, Default)]
pub struct SurfaceDamageState {
    root_surface: Option<SurfaceId>,
    root_surface_damaged: bool,
    expect_damage_from_root_surface: bool,
    expecting_root_surface_damage_because_of_resize: bool,
    children: BTreeMap<SurfaceId, ChildDamage>,
}

impl SurfaceDamageState {
    pub fn root_surface(&self) -> Option<SurfaceId> {
        self.root_surface
    }

    pub fn set_root_surface(&mut self, id: SurfaceId) {
        self.root_surface = Some(id);
        self.expect_damage_from_root_surface = false;
        self.expecting_root_surface_damage_because_of_resize = false;
        self.children.remove(&id);
    }

    /// Records damage for `id`. Returns true when it was the root surface.
    pub fn mark_damaged(&mut self, id: SurfaceId) -> bool {
        if self.root_surface == Some(id) {
            self.root_surface_damaged = true;
            self.expecting_root_surface_damage_because_of_resize = false;
            return true;
        }
        self.children.entry(id).or_default().damaged = true;
        false
    }

    /// Root damage that already arrived this frame still counts.
    pub fn expect_resize_damage(&mut self) {
        self.expecting_root_surface_damage_because_of_resize = true;
        self.expect_damage_from_root_surface = true;
    }

    pub fn root_surface_damaged(&self) -> bool {
        self.root_surface_damaged
    }

    pub fn expecting_resize_damage(&self) -> bool {
        self.expecting_root_surface_damage_because_of_resize
    }

    pub fn root_ready_to_draw(&self) -> bool {
        !self.expect_damage_from_root_surface || self.root_surface_damaged
    }

    pub fn all_expected_children_damaged(&self) -> bool {
        self.children
            .values()
            .all(|child| !child.expected || child.damaged)
    }

    pub fn child(&self, id: SurfaceId) -> Option<ChildDamage> {
        self.children.get(&id).copied()
    }

    /// Called after a successful draw: this frame's damaged children become
    /// the set expected for the next frame.
    pub fn finish_frame(&mut self) {
        self.children.retain(|_, child| child.damaged);
        for child in self.children.values_mut() {
            *child = ChildDamage {
                damaged: false,
                expected: true,
            };
        }
        self.expect_damage_from_root_surface = self.root_surface_damaged;
        self.root_surface_damaged = false;
    }

    /// Going idle: nothing is expected anymore.
    pub fn reset_expectations(&mut self) {
        self.children.clear();
        self.expect_damage_from_root_surface = false;
    }
}
