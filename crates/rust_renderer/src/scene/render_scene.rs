//! Renderable scene
//!
//! Groups everything the render engine reads once per frame.

use crate::foundation::math::Vec3;
use crate::render::primitives::Camera;
use crate::render::systems::lighting::Light;

use super::SceneGraph;

/// Default ambient term applied by the forward shaders
const DEFAULT_AMBIENT: f32 = 0.03;

/// Scene graph, lights and active camera
#[derive(Debug)]
pub struct Scene {
    graph: SceneGraph,
    lights: Vec<Light>,
    camera: Option<Camera>,
    ambient: Vec3,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Empty scene with no camera
    pub fn new() -> Self {
        Self {
            graph: SceneGraph::new(),
            lights: Vec::new(),
            camera: None,
            ambient: Vec3::repeat(DEFAULT_AMBIENT),
        }
    }

    /// Transform hierarchy
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Transform hierarchy, mutable
    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    /// Add a light; returns its index
    pub fn add_light(&mut self, light: Light) -> usize {
        self.lights.push(light);
        self.lights.len() - 1
    }

    /// All lights in insertion order
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// All lights, mutable
    pub fn lights_mut(&mut self) -> &mut Vec<Light> {
        &mut self.lights
    }

    /// Remove every light
    pub fn clear_lights(&mut self) {
        self.lights.clear();
    }

    /// Make `camera` the active camera
    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = Some(camera);
    }

    /// Drop the active camera
    pub fn clear_camera(&mut self) -> Option<Camera> {
        self.camera.take()
    }

    /// Active camera
    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    /// Active camera, mutable
    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        self.camera.as_mut()
    }

    /// Set the ambient light colour
    pub fn set_ambient(&mut self, ambient: Vec3) {
        self.ambient = ambient;
    }

    /// Ambient light colour
    pub fn ambient(&self) -> Vec3 {
        self.ambient
    }

    /// First directional light; it drives the shadow pass
    pub fn directional_light(&self) -> Option<&Light> {
        self.lights.iter().find(|light| light.is_directional())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_light_is_first_of_its_kind() {
        let mut scene = Scene::new();
        scene.add_light(Light::point(Vec3::zeros(), Vec3::repeat(1.0), 1.0, 10.0));
        assert!(scene.directional_light().is_none());

        scene.add_light(Light::directional(Vec3::new(0.0, -1.0, 0.0), Vec3::repeat(1.0), 1.0));
        scene.add_light(Light::directional(Vec3::new(1.0, 0.0, 0.0), Vec3::repeat(1.0), 1.0));
        let sun = scene.directional_light().unwrap();
        assert_eq!(sun.direction, Vec3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_camera_can_be_replaced_and_cleared() {
        let mut scene = Scene::new();
        assert!(scene.camera().is_none());
        scene.set_camera(Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, 1.0, 0.1, 100.0));
        assert!(scene.camera().is_some());
        assert!(scene.clear_camera().is_some());
        assert!(scene.camera().is_none());
    }
}
