//! Ray-based agent picking, click/drag discrimination, and hover
//! tracking against the CPU position snapshot.
//!
//! Picking never touches the GPU: every agent is tested as a sphere of
//! fixed radius around its snapshot position, and the closest hit along
//! the ray wins. A click is only a click if the pointer traveled less
//! than the drag threshold since pointer-down.

use glam::{Vec2, Vec3};

use crate::agent::{AgentId, PLAYER};
use crate::camera::{Camera, Ray};
use crate::readback::Snapshot;

/// Radius of the pick sphere around each agent.
pub const PICK_RADIUS: f32 = 0.6;
/// Pointer travel (pixels) beyond which a press is a drag, not a click.
pub const DRAG_THRESHOLD_PX: f32 = 5.0;

/// What a completed click resolved to. The scene applies the action;
/// the picker only decides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PickAction {
    /// An agent was clicked and becomes selected.
    Select(AgentId),
    /// The selected agent was clicked again, or selection was cleared.
    Deselect,
    /// Empty ground inside the world was clicked: walk the player here.
    MoveTo(Vec2),
    /// Drag, miss outside the world, or a ray that hits nothing.
    None,
}

/// Hover result: agent plus its screen-space UI anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoverAnchor {
    pub agent: AgentId,
    pub screen: Vec2,
}

#[derive(Debug)]
pub struct Picker {
    world_half: f32,
    selected: Option<AgentId>,
    hovered: Option<AgentId>,
    pointer_down: Option<Vec2>,
}

impl Picker {
    pub fn new(world_half: f32) -> Self {
        Self {
            world_half,
            selected: None,
            hovered: None,
            pointer_down: None,
        }
    }

    pub fn set_world_half(&mut self, world_half: f32) {
        self.world_half = world_half;
    }

    #[inline]
    pub fn selected(&self) -> Option<AgentId> {
        self.selected
    }

    #[inline]
    pub fn hovered(&self) -> Option<AgentId> {
        self.hovered
    }

    /// Closest ray-sphere hit over all agents.
    pub fn pick(&self, ray: Ray, snapshot: &Snapshot) -> Option<AgentId> {
        let mut best: Option<(AgentId, f32)> = None;
        for (i, pos) in snapshot.positions().iter().enumerate() {
            if let Some(t) = ray_sphere(ray, *pos, PICK_RADIUS) {
                if best.map_or(true, |(_, bt)| t < bt) {
                    best = Some((AgentId(i as u32), t));
                }
            }
        }
        best.map(|(id, _)| id)
    }

    /// Record where the pointer went down, for drag discrimination.
    pub fn pointer_down(&mut self, pixel: Vec2) {
        self.pointer_down = Some(pixel);
    }

    /// Resolve a pointer release into an action.
    pub fn pointer_up(&mut self, pixel: Vec2, ray: Ray, snapshot: &Snapshot) -> PickAction {
        let Some(down) = self.pointer_down.take() else {
            return PickAction::None;
        };
        if down.distance(pixel) > DRAG_THRESHOLD_PX {
            return PickAction::None;
        }

        if let Some(hit) = self.pick(ray, snapshot) {
            if Some(hit) == self.selected {
                self.selected = None;
                return PickAction::Deselect;
            }
            if hit == PLAYER {
                // Clicking yourself is not a selection.
                return PickAction::None;
            }
            self.selected = Some(hit);
            return PickAction::Select(hit);
        }

        // Empty ground: walk there if it is inside the world.
        match ground_point(ray) {
            Some(p) if p.x.abs() <= self.world_half && p.y.abs() <= self.world_half => {
                PickAction::MoveTo(p)
            }
            _ => PickAction::None,
        }
    }

    /// Update hover state and produce a screen anchor for the hovered
    /// agent. The currently selected agent never produces an anchor, so
    /// the UI does not show two panels for one agent.
    pub fn hover(
        &mut self,
        ray: Ray,
        snapshot: &Snapshot,
        camera: &Camera,
        viewport: (f32, f32),
    ) -> Option<HoverAnchor> {
        self.hovered = self.pick(ray, snapshot);
        let agent = self.hovered?;
        if Some(agent) == self.selected {
            return None;
        }
        let screen = camera.project(snapshot.position(agent)?, viewport)?;
        Some(HoverAnchor { agent, screen })
    }

    /// Clear the current selection.
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }
}

/// Ray-sphere intersection; returns the nearest positive `t`.
pub fn ray_sphere(ray: Ray, center: Vec3, radius: f32) -> Option<f32> {
    let oc = ray.origin - center;
    let b = oc.dot(ray.dir);
    let c = oc.length_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sqrt_disc = disc.sqrt();
    let t = -b - sqrt_disc;
    if t > 0.0 {
        return Some(t);
    }
    let t = -b + sqrt_disc;
    (t > 0.0).then_some(t)
}

/// Intersection of a ray with the ground plane y = 0, as (x, z).
pub fn ground_point(ray: Ray) -> Option<Vec2> {
    if ray.dir.y.abs() < 1e-6 {
        return None;
    }
    let t = -ray.origin.y / ray.dir.y;
    (t > 0.0).then(|| {
        let hit = ray.origin + ray.dir * t;
        Vec2::new(hit.x, hit.z)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down_ray(x: f32, z: f32) -> Ray {
        Ray {
            origin: Vec3::new(x, 10.0, z),
            dir: Vec3::new(0.0, -1.0, 0.0),
        }
    }

    fn snap() -> Snapshot {
        Snapshot::from_positions(vec![
            Vec3::ZERO,
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::new(-5.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 5.0),
        ])
    }

    #[test]
    fn test_ray_through_center_hits() {
        let picker = Picker::new(25.0);
        assert_eq!(picker.pick(down_ray(0.0, 5.0), &snap()), Some(AgentId(3)));
    }

    #[test]
    fn test_ray_missing_everything() {
        let picker = Picker::new(25.0);
        assert_eq!(picker.pick(down_ray(12.0, 12.0), &snap()), None);
    }

    #[test]
    fn test_closest_hit_wins() {
        let stacked = Snapshot::from_positions(vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 5.0, 0.0),
        ]);
        let picker = Picker::new(25.0);
        // Ray from above passes through both; the higher one is closer.
        assert_eq!(picker.pick(down_ray(0.0, 0.0), &stacked), Some(AgentId(1)));
    }

    #[test]
    fn test_click_selects_then_deselects() {
        let mut picker = Picker::new(25.0);
        let snap = snap();
        let px = Vec2::new(100.0, 100.0);

        picker.pointer_down(px);
        assert_eq!(
            picker.pointer_up(px, down_ray(5.0, 0.0), &snap),
            PickAction::Select(AgentId(1))
        );
        assert_eq!(picker.selected(), Some(AgentId(1)));

        picker.pointer_down(px);
        assert_eq!(
            picker.pointer_up(px, down_ray(5.0, 0.0), &snap),
            PickAction::Deselect
        );
        assert_eq!(picker.selected(), None);
    }

    #[test]
    fn test_drag_is_not_a_click() {
        let mut picker = Picker::new(25.0);
        picker.pointer_down(Vec2::new(100.0, 100.0));
        let action = picker.pointer_up(Vec2::new(140.0, 100.0), down_ray(5.0, 0.0), &snap());
        assert_eq!(action, PickAction::None);
        assert_eq!(picker.selected(), None);
    }

    #[test]
    fn test_ground_click_inside_world_moves_player() {
        let mut picker = Picker::new(25.0);
        let px = Vec2::new(10.0, 10.0);
        picker.pointer_down(px);
        let action = picker.pointer_up(px, down_ray(12.0, 12.0), &snap());
        assert_eq!(action, PickAction::MoveTo(Vec2::new(12.0, 12.0)));
    }

    #[test]
    fn test_ground_click_outside_world_rejected() {
        let mut picker = Picker::new(25.0);
        let px = Vec2::new(10.0, 10.0);
        picker.pointer_down(px);
        let action = picker.pointer_up(px, down_ray(30.0, 0.0), &snap());
        assert_eq!(action, PickAction::None);
    }

    #[test]
    fn test_hover_suppressed_for_selected() {
        let mut picker = Picker::new(25.0);
        let snap = snap();
        let camera = Camera::new();
        let viewport = (800.0, 600.0);

        let hover = picker.hover(down_ray(5.0, 0.0), &snap, &camera, viewport);
        assert_eq!(hover.map(|h| h.agent), Some(AgentId(1)));

        picker.pointer_down(Vec2::ZERO);
        picker.pointer_up(Vec2::ZERO, down_ray(5.0, 0.0), &snap);
        assert_eq!(picker.selected(), Some(AgentId(1)));

        assert!(picker.hover(down_ray(5.0, 0.0), &snap, &camera, viewport).is_none());
        // Hover state itself still tracks the agent.
        assert_eq!(picker.hovered(), Some(AgentId(1)));
    }
}
