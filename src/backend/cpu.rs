//! Software rendition of the bake programs.
//!
//! Evaluates the same per-texel math as the WGSL programs, one texel at a
//! time, so bakes can run and be tested on machines without an adapter.

use std::f32::consts::PI;

use glam::{Vec3, Vec4};
use half::f16;
use log::debug;

use super::{RenderBackend, Source};
use crate::{
    cube::{equirect_uv, CubeFace},
    error::{IblError, Result},
    mip::nominal_resolution,
    program::{Program, ProgramKind},
    radiance::RadianceImage,
};

#[derive(Debug, Clone)]
pub struct CpuCubemap {
    label: String,
    resolution: u32,
    // levels[mip][face], each `nominal_resolution(resolution, mip)` squared
    levels: Vec<[Vec<Vec4>; 6]>,
}

impl CpuCubemap {
    fn mip_levels(&self) -> u32 {
        self.levels.len() as u32
    }

    fn level_size(&self, mip: u32) -> u32 {
        nominal_resolution(self.resolution, mip)
    }

    fn face_mut(&mut self, face: CubeFace, mip: u32) -> Result<&mut Vec<Vec4>> {
        let label = &self.label;
        self.levels
            .get_mut(mip as usize)
            .map(|level| &mut level[face.index()])
            .ok_or_else(|| IblError::Backend(format!("{label} has no mip {mip}")))
    }

    fn fetch(&self, face: CubeFace, mip: u32, x: i64, y: i64) -> Vec4 {
        let size = self.level_size(mip) as i64;
        let x = x.clamp(0, size - 1) as usize;
        let y = y.clamp(0, size - 1) as usize;
        self.levels[mip as usize][face.index()][y * size as usize + x]
    }

    fn sample_level(&self, face: CubeFace, mip: u32, u: f32, v: f32) -> Vec4 {
        let size = self.level_size(mip) as f32;
        let x = u * size - 0.5;
        let y = v * size - 0.5;
        let (x0, y0) = (x.floor(), y.floor());
        let (fx, fy) = (x - x0, y - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = self.fetch(face, mip, x0, y0).lerp(self.fetch(face, mip, x0 + 1, y0), fx);
        let bottom = self.fetch(face, mip, x0, y0 + 1).lerp(self.fetch(face, mip, x0 + 1, y0 + 1), fx);
        top.lerp(bottom, fy)
    }

    /// Trilinear lookup along `direction`, `lod` clamped to the chain.
    pub fn sample(&self, direction: Vec3, lod: f32) -> Vec4 {
        let (face, u, v) = CubeFace::locate(direction);
        let max_lod = (self.levels.len() - 1) as f32;
        let lod = if lod.is_nan() { 0. } else { lod.clamp(0., max_lod) };
        let lower = lod.floor();
        let t = lod - lower;

        let near = self.sample_level(face, lower as u32, u, v);
        if t == 0. || lower >= max_lod {
            return near;
        }
        near.lerp(self.sample_level(face, lower as u32 + 1, u, v), t)
    }
}

/// Backend that runs every program on the calling thread.
#[derive(Debug, Default)]
pub struct CpuBackend {}

impl CpuBackend {
    pub fn new() -> CpuBackend {
        CpuBackend {}
    }
}

impl RenderBackend for CpuBackend {
    type Panorama = RadianceImage;
    type Cubemap = CpuCubemap;
    type ProgramHandle = ();

    fn link_program(&mut self, kind: ProgramKind) -> Result<Program<()>> {
        Ok(Program::new(kind, ()))
    }

    fn upload_panorama(&mut self, image: &RadianceImage) -> Result<RadianceImage> {
        Ok(image.clone())
    }

    fn create_cubemap(&mut self, label: &str, resolution: u32, mip_levels: u32) -> Result<CpuCubemap> {
        if resolution == 0 || mip_levels == 0 {
            return Err(IblError::Backend(format!(
                "{label} needs a non-empty {resolution}x{resolution} texture with {mip_levels} mips"
            )));
        }
        let levels = (0..mip_levels)
            .map(|mip| {
                let size = nominal_resolution(resolution, mip) as usize;
                std::array::from_fn(|_| vec![Vec4::ZERO; size * size])
            })
            .collect();
        Ok(CpuCubemap {
            label: label.to_owned(),
            resolution,
            levels,
        })
    }

    fn render_face(
        &mut self,
        program: &mut Program<()>,
        source: Source<'_, Self>,
        target: &mut CpuCubemap,
        face: CubeFace,
        mip: u32,
    ) -> Result<()> {
        program.set_uint("face", face.index() as u32)?;
        let size = target.level_size(mip);
        debug!("Rendering {} into {} {:?} mip {}", program.kind().name(), target.label, face, mip);

        let shade: Box<dyn Fn(Vec3) -> Vec4 + '_> = match (program.kind(), source) {
            (ProgramKind::EquirectangularToCubemap, Source::Panorama(panorama)) => {
                Box::new(move |dir| {
                    let (u, v) = equirect_uv(dir);
                    panorama.sample(u, v).extend(1.)
                })
            }
            (ProgramKind::Irradiance, Source::Cubemap(environment)) => {
                let delta = program.float("sample_delta")?;
                if delta <= 0. {
                    return Err(IblError::Backend(format!("irradiance sample delta {delta} must be positive")));
                }
                Box::new(move |dir| irradiance(environment, dir, delta))
            }
            (ProgramKind::Prefilter, Source::Cubemap(environment)) => {
                let roughness = program.float("roughness")?;
                let source_resolution = program.float("source_resolution")?;
                let sample_count = program.uint("sample_count")?.max(1);
                Box::new(move |dir| prefilter(environment, dir, roughness, source_resolution, sample_count))
            }
            (kind, _) => {
                return Err(IblError::Backend(format!(
                    "program {} can't render from this source",
                    kind.name()
                )))
            }
        };

        let texels: Vec<Vec4> = (0..size)
            .flat_map(|y| (0..size).map(move |x| (x, y)))
            .map(|(x, y)| shade(face.texel_direction(x, y, size)))
            .collect();
        *target.face_mut(face, mip)? = texels;
        Ok(())
    }

    fn generate_mipmaps(&mut self, cubemap: &mut CpuCubemap) -> Result<()> {
        for mip in 1..cubemap.mip_levels() {
            let size = cubemap.level_size(mip) as i64;
            for face in CubeFace::ALL {
                let texels = (0..size)
                    .flat_map(|y| (0..size).map(move |x| (x, y)))
                    .map(|(x, y)| {
                        let sum = cubemap.fetch(face, mip - 1, 2 * x, 2 * y)
                            + cubemap.fetch(face, mip - 1, 2 * x + 1, 2 * y)
                            + cubemap.fetch(face, mip - 1, 2 * x, 2 * y + 1)
                            + cubemap.fetch(face, mip - 1, 2 * x + 1, 2 * y + 1);
                        sum * 0.25
                    })
                    .collect();
                *cubemap.face_mut(face, mip)? = texels;
            }
        }
        Ok(())
    }

    fn read_pixels(&mut self, cubemap: &CpuCubemap, face: CubeFace, mip: u32) -> Result<Vec<f16>> {
        let level = cubemap
            .levels
            .get(mip as usize)
            .ok_or_else(|| IblError::Backend(format!("{} has no mip {mip}", cubemap.label)))?;
        Ok(level[face.index()]
            .iter()
            .flat_map(|texel| texel.to_array())
            .map(f16::from_f32)
            .collect())
    }
}

/// Right and up vectors of an orthonormal frame around `n`.
fn tangent_frame(n: Vec3, up: Vec3, fallback: Vec3) -> (Vec3, Vec3) {
    let up = if n.dot(up).abs() < 0.999 { up } else { fallback };
    let right = up.cross(n).normalize();
    (right, n.cross(right))
}

/// Cosine weighted hemisphere average around `n`, midpoint rule over
/// (phi, theta).
fn irradiance(environment: &CpuCubemap, n: Vec3, delta: f32) -> Vec4 {
    let (right, up) = tangent_frame(n, Vec3::Y, Vec3::Z);
    let mut sum = Vec3::ZERO;
    let mut weight = 0.;

    let mut phi = 0.5 * delta;
    while phi < 2. * PI {
        let mut theta = 0.5 * delta;
        while theta < 0.5 * PI {
            let (sin_theta, cos_theta) = theta.sin_cos();
            let dir = right * (sin_theta * phi.cos()) + up * (sin_theta * phi.sin()) + n * cos_theta;
            let w = cos_theta * sin_theta;
            sum += environment.sample(dir, 0.).truncate() * w;
            weight += w;
            theta += delta;
        }
        phi += delta;
    }

    if weight <= 0. {
        return environment.sample(n, 0.);
    }
    (sum / weight).extend(1.)
}

pub(crate) fn hammersley(i: u32, count: u32) -> (f32, f32) {
    let radical_inverse = i.reverse_bits() as f32 / 4_294_967_296.;
    (i as f32 / count as f32, radical_inverse)
}

pub(crate) fn ggx_distribution(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let d = n_dot_h * n_dot_h * (a2 - 1.) + 1.;
    a2 / (PI * d * d)
}

fn importance_sample_ggx(xi: (f32, f32), n: Vec3, roughness: f32) -> Vec3 {
    let a = roughness * roughness;
    let phi = 2. * PI * xi.0;
    let cos_theta = ((1. - xi.1) / (1. + (a * a - 1.) * xi.1)).sqrt();
    let sin_theta = (1. - cos_theta * cos_theta).max(0.).sqrt();

    let (tangent, bitangent) = tangent_frame(n, Vec3::Z, Vec3::X);
    (tangent * (phi.cos() * sin_theta) + bitangent * (phi.sin() * sin_theta) + n * cos_theta).normalize()
}

/// GGX lobe convolution with view and normal along `n`. Each sample reads the
/// source mip whose texel footprint matches the sample's solid angle.
fn prefilter(
    environment: &CpuCubemap,
    n: Vec3,
    roughness: f32,
    source_resolution: f32,
    sample_count: u32,
) -> Vec4 {
    if roughness <= 0. {
        return environment.sample(n, 0.);
    }

    let sa_texel = 4. * PI / (6. * source_resolution * source_resolution);
    let mut sum = Vec3::ZERO;
    let mut weight = 0.;
    for i in 0..sample_count {
        let h = importance_sample_ggx(hammersley(i, sample_count), n, roughness);
        let v_dot_h = n.dot(h);
        let l = (2. * v_dot_h * h - n).normalize();
        let n_dot_l = n.dot(l);
        if n_dot_l <= 0. {
            continue;
        }

        // V == N, so the N.H / H.V factor of the pdf is 1
        let pdf = ggx_distribution(v_dot_h.max(0.), roughness) / 4. + 1e-4;
        let sa_sample = 1. / (sample_count as f32 * pdf + 1e-4);
        let lod = 0.5 * (sa_sample / sa_texel).log2();

        sum += environment.sample(l, lod).truncate() * n_dot_l;
        weight += n_dot_l;
    }

    if weight <= 0. {
        return environment.sample(n, 0.);
    }
    (sum / weight).extend(1.)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_environment(backend: &mut CpuBackend, value: f32, resolution: u32) -> CpuCubemap {
        let levels = crate::mip::full_mip_count(resolution);
        let mut cubemap = backend.create_cubemap("uniform", resolution, levels).unwrap();
        for level in &mut cubemap.levels {
            for face in level.iter_mut() {
                face.fill(Vec4::new(value, value, value, 1.));
            }
        }
        cubemap
    }

    #[test]
    fn hammersley_is_low_discrepancy() {
        assert_eq!(hammersley(0, 4), (0., 0.));
        assert_eq!(hammersley(1, 4), (0.25, 0.5));
        assert_eq!(hammersley(2, 4), (0.5, 0.25));
    }

    #[test]
    fn ggx_peaks_at_the_normal() {
        for roughness in [0.25, 0.5, 1.] {
            assert!(ggx_distribution(1., roughness) >= ggx_distribution(0.9, roughness));
        }
        // A fully rough lobe is uniform: 1 / PI
        assert!((ggx_distribution(0.3, 1.) - 1. / PI).abs() < 1e-6);
    }

    #[test]
    fn mipmaps_average_the_level_above() {
        let mut backend = CpuBackend::new();
        let mut cubemap = backend.create_cubemap("ramp", 4, 3).unwrap();
        for face in cubemap.levels[0].iter_mut() {
            for (i, texel) in face.iter_mut().enumerate() {
                *texel = Vec4::new(i as f32, 0., 0., 1.);
            }
        }
        backend.generate_mipmaps(&mut cubemap).unwrap();

        // Top-left 2x2 of a 4x4 ramp: 0, 1, 4, 5
        assert_eq!(cubemap.levels[1][0][0].x, 2.5);
        assert_eq!(cubemap.levels[2][0].len(), 1);
        assert_eq!(cubemap.levels[2][0][0].x, 7.5);
    }

    #[test]
    fn uniform_environment_stays_uniform() {
        let mut backend = CpuBackend::new();
        let environment = uniform_environment(&mut backend, 0.75, 16);

        let mut program = backend.link_program(ProgramKind::Irradiance).unwrap();
        program.set_float("sample_delta", 0.2).unwrap();
        let mut target = backend.create_cubemap("irradiance", 4, 1).unwrap();
        backend
            .render_face(&mut program, Source::Cubemap(&environment), &mut target, CubeFace::NegativeY, 0)
            .unwrap();
        for texel in &target.levels[0][CubeFace::NegativeY.index()] {
            assert!((texel.x - 0.75).abs() < 1e-4, "{texel:?}");
        }
        assert_eq!(program.uint("face").unwrap(), CubeFace::NegativeY.index() as u32);
    }

    #[test]
    fn projection_rejects_cubemap_source() {
        let mut backend = CpuBackend::new();
        let environment = uniform_environment(&mut backend, 1., 4);
        let mut program = backend.link_program(ProgramKind::EquirectangularToCubemap).unwrap();
        let mut target = backend.create_cubemap("target", 4, 1).unwrap();
        let err = backend
            .render_face(&mut program, Source::Cubemap(&environment), &mut target, CubeFace::PositiveX, 0)
            .unwrap_err();
        assert!(matches!(err, IblError::Backend(_)));
    }
}
