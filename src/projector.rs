use log::info;

use crate::{
    backend::{RenderBackend, Source},
    cube::CubeFace,
    error::Result,
    mip::full_mip_count,
    program::ProgramKind,
    radiance::RadianceImage,
    texture::{validate_chain, CubemapTexture},
};

/// Renders `image` onto the six faces of a `resolution` cubemap and fills its
/// whole mip chain, `floor(log2(resolution)) + 1` levels.
pub fn project_panorama<B: RenderBackend>(
    backend: &mut B,
    image: &RadianceImage,
    resolution: u32,
) -> Result<CubemapTexture<B::Cubemap>> {
    let mip_levels = full_mip_count(resolution);
    validate_chain(resolution, mip_levels)?;

    let mut program = backend.link_program(ProgramKind::EquirectangularToCubemap)?;
    let panorama = backend.upload_panorama(image)?;
    let mut texture = backend.create_cubemap("Environment", resolution, mip_levels)?;

    for face in CubeFace::ALL {
        backend.render_face(&mut program, Source::Panorama(&panorama), &mut texture, face, 0)?;
    }
    backend.generate_mipmaps(&mut texture)?;

    info!(
        "Projected {}x{} panorama to a {}x{} cubemap with {} mips",
        image.width(),
        image.height(),
        resolution,
        resolution,
        mip_levels
    );
    Ok(CubemapTexture {
        texture,
        resolution,
        mip_levels,
    })
}
