//! Rendering backends the bakers drive.
//!
//! A backend owns textures and linked programs. Every render targets a single
//! (face, mip) of a cubemap and every readback blocks until the pixels are on
//! the host, so passes never overlap.

use half::f16;

use crate::{
    cube::CubeFace,
    error::Result,
    program::{Program, ProgramKind},
    radiance::RadianceImage,
};

pub mod cpu;
pub mod gpu;

pub use cpu::CpuBackend;
pub use gpu::GpuBackend;

/// What a render pass reads from.
pub enum Source<'a, B: RenderBackend + ?Sized> {
    Panorama(&'a B::Panorama),
    Cubemap(&'a B::Cubemap),
}

pub trait RenderBackend {
    type Panorama;
    type Cubemap;
    type ProgramHandle;

    fn link_program(&mut self, kind: ProgramKind) -> Result<Program<Self::ProgramHandle>>;

    fn upload_panorama(&mut self, image: &RadianceImage) -> Result<Self::Panorama>;

    /// Allocates a cubemap whose mip `m` is `max(resolution >> m, 1)` texels wide.
    fn create_cubemap(&mut self, label: &str, resolution: u32, mip_levels: u32) -> Result<Self::Cubemap>;

    /// Runs `program` over every texel of `(face, mip)` of `target`. The face
    /// is handed to the program through its `face` uniform.
    fn render_face(
        &mut self,
        program: &mut Program<Self::ProgramHandle>,
        source: Source<'_, Self>,
        target: &mut Self::Cubemap,
        face: CubeFace,
        mip: u32,
    ) -> Result<()>;

    /// Fills mips `1..` of every face by 2x2 box filtering the level above.
    fn generate_mipmaps(&mut self, cubemap: &mut Self::Cubemap) -> Result<()>;

    /// Blocking readback of `(face, mip)` as tightly packed RGBA half floats,
    /// rows in texture order.
    fn read_pixels(&mut self, cubemap: &Self::Cubemap, face: CubeFace, mip: u32) -> Result<Vec<f16>>;
}
