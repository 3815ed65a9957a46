//! Forward shading pass
//!
//! Owns the four forward programs (Phong or PBR, single or instanced) and
//! the material binding shared by both draw paths. Frame-wide uniforms are
//! uploaded once per program switch; material uniforms and textures on
//! every bind.

use crate::foundation::math::{Mat4, Vec3};
use crate::render::api::{DrawCall, GpuBackend, ProgramHandle, TextureHandle, UniformValue};
use crate::render::resources::materials::{Material, SHADOW_MAP_SLOT};
use crate::render::resources::{shaders, GpuMesh};
use crate::render::systems::lighting::PackedLights;
use crate::render::{RenderError, RenderResult};

/// Shadow map state sampled by the main pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowUniforms {
    /// World to light clip space
    pub light_space: Mat4,
    /// Depth texture written by the shadow pass
    pub depth_map: TextureHandle,
    /// Depth comparison bias
    pub bias: f32,
}

/// Values shared by every draw of a frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameUniforms {
    /// Camera `projection * view`
    pub view_projection: Mat4,
    /// Camera position in world space
    pub camera_position: Vec3,
    /// Ambient light color
    pub ambient: Vec3,
    /// Scene lights in uniform layout
    pub lights: PackedLights,
    /// Shadow map, when the shadow pass ran this frame
    pub shadow: Option<ShadowUniforms>,
}

impl FrameUniforms {
    fn upload(&self, backend: &mut dyn GpuBackend) {
        let vec3s = |v: &[Vec3]| UniformValue::Vec3Array(v.iter().map(|c| [c.x, c.y, c.z]).collect());

        backend.set_uniform("u_camera_position", self.camera_position.into());
        backend.set_uniform("u_ambient", self.ambient.into());
        backend.set_uniform("u_light_count", (self.lights.count as i32).into());
        backend.set_uniform("u_light_positions", vec3s(&self.lights.positions));
        backend.set_uniform("u_light_directions", vec3s(&self.lights.directions));
        backend.set_uniform("u_light_colors", vec3s(&self.lights.colors));
        backend.set_uniform("u_light_params", UniformValue::FloatArray(self.lights.params.clone()));

        match &self.shadow {
            Some(shadow) => {
                backend.set_uniform("u_shadows_active", true.into());
                backend.set_uniform("u_light_space", (&shadow.light_space).into());
                backend.set_uniform("u_shadow_bias", shadow.bias.into());
                backend.bind_texture(SHADOW_MAP_SLOT, Some(shadow.depth_map));
            }
            None => {
                backend.set_uniform("u_shadows_active", false.into());
                backend.set_uniform("u_light_space", (&Mat4::identity()).into());
                backend.bind_texture(SHADOW_MAP_SLOT, None);
            }
        }
    }
}

fn program_index(pbr: bool, instanced: bool) -> usize {
    usize::from(pbr) * 2 + usize::from(instanced)
}

/// Forward programs and material binding
#[derive(Debug)]
pub struct ForwardPass {
    programs: Vec<ProgramHandle>,
    bound: Option<usize>,
}

impl ForwardPass {
    /// Compile the forward programs
    pub fn new(backend: &mut dyn GpuBackend) -> RenderResult<Self> {
        let mut programs = Vec::with_capacity(4);
        for (pbr, instanced) in [(false, false), (false, true), (true, false), (true, true)] {
            match backend.create_program(&shaders::forward(pbr, instanced)) {
                Ok(program) => programs.push(program),
                Err(e) => {
                    for program in programs {
                        backend.destroy_program(program);
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self { programs, bound: None })
    }

    /// Forget the current program so the next bind re-uploads frame uniforms
    pub fn begin_frame(&mut self) {
        self.bound = None;
    }

    /// Select the program for `material` and bind its parameters
    pub fn bind_material(
        &mut self,
        backend: &mut dyn GpuBackend,
        frame: &FrameUniforms,
        material: &Material,
        instanced: bool,
    ) -> RenderResult<()> {
        let index = program_index(material.shading.is_pbr(), instanced);
        if self.bound != Some(index) {
            let program = self
                .programs
                .get(index)
                .copied()
                .ok_or_else(|| RenderError::Backend("forward programs have been destroyed".to_string()))?;
            backend.bind_program(program);
            frame.upload(backend);
            self.bound = Some(index);
        }

        for (name, value) in material.uniforms() {
            backend.set_uniform(name, value);
        }
        for (slot, flag, texture) in material.textures.slots() {
            backend.bind_texture(slot, texture);
            backend.set_uniform(flag, texture.is_some().into());
        }
        Ok(())
    }

    /// Draw one mesh with its own model matrix
    pub fn draw_single(
        &mut self,
        backend: &mut dyn GpuBackend,
        frame: &FrameUniforms,
        gpu: &GpuMesh,
        material: &Material,
        model: &Mat4,
    ) -> RenderResult<DrawCall> {
        self.bind_material(backend, frame, material, false)?;

        let mvp = frame.view_projection * model;
        backend.set_uniform("u_model", model.into());
        backend.set_uniform("u_mvp", (&mvp).into());

        gpu.bind(backend);
        backend.bind_instance_buffer(None);
        let call = gpu.draw_call(1);
        backend.draw(&call)?;
        log::trace!("Forward draw of {} primitives", call.primitive_count());
        Ok(call)
    }

    /// Free the programs
    pub fn destroy(&mut self, backend: &mut dyn GpuBackend) {
        for program in self.programs.drain(..) {
            backend.destroy_program(program);
        }
        self.bound = None;
    }
}
