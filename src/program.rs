use std::collections::HashMap;

use crate::error::{IblError, Result};

/// Number of f32 slots in a program's parameter block; matches the
/// `Params` struct declared by every shader.
pub const UNIFORM_SLOTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    EquirectangularToCubemap,
    Irradiance,
    Prefilter,
    Downsample,
}

impl ProgramKind {
    pub fn name(self) -> &'static str {
        match self {
            ProgramKind::EquirectangularToCubemap => "equirectangular_to_cubemap",
            ProgramKind::Irradiance => "irradiance",
            ProgramKind::Prefilter => "prefilter",
            ProgramKind::Downsample => "downsample",
        }
    }

    /// Uniform names in declaration order of the shader's `Params` block.
    pub fn uniforms(self) -> &'static [&'static str] {
        match self {
            ProgramKind::EquirectangularToCubemap => &["face"],
            ProgramKind::Irradiance => &["face", "sample_delta"],
            ProgramKind::Prefilter => &["face", "roughness", "source_resolution", "sample_count"],
            ProgramKind::Downsample => &[],
        }
    }

    pub fn source(self) -> &'static str {
        match self {
            ProgramKind::EquirectangularToCubemap => include_str!("shaders/equirectangular_to_cubemap.wgsl"),
            ProgramKind::Irradiance => include_str!("shaders/irradiance.wgsl"),
            ProgramKind::Prefilter => include_str!("shaders/prefilter.wgsl"),
            ProgramKind::Downsample => include_str!("shaders/downsample.wgsl"),
        }
    }
}

/// A linked program: the backend's handle plus the uniform values that will
/// be bound on the next render.
///
/// The name to slot table is built once at link time; setting or reading a
/// name the program doesn't declare is an error.
#[derive(Debug)]
pub struct Program<H> {
    kind: ProgramKind,
    handle: H,
    slots: HashMap<&'static str, usize>,
    values: [f32; UNIFORM_SLOTS],
}

impl<H> Program<H> {
    pub fn new(kind: ProgramKind, handle: H) -> Program<H> {
        let slots = kind
            .uniforms()
            .iter()
            .enumerate()
            .map(|(slot, name)| (*name, slot))
            .collect();
        Program {
            kind,
            handle,
            slots,
            values: [0.; UNIFORM_SLOTS],
        }
    }

    pub fn kind(&self) -> ProgramKind {
        self.kind
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    fn slot(&self, name: &str) -> Result<usize> {
        self.slots
            .get(name)
            .copied()
            .ok_or_else(|| IblError::UnknownUniform {
                program: self.kind.name(),
                name: name.to_owned(),
            })
    }

    pub fn set_float(&mut self, name: &str, value: f32) -> Result<()> {
        let slot = self.slot(name)?;
        self.values[slot] = value;
        Ok(())
    }

    pub fn set_uint(&mut self, name: &str, value: u32) -> Result<()> {
        self.set_float(name, value as f32)
    }

    pub fn float(&self, name: &str) -> Result<f32> {
        Ok(self.values[self.slot(name)?])
    }

    pub fn uint(&self, name: &str) -> Result<u32> {
        Ok(self.float(name)?.max(0.) as u32)
    }

    /// Raw parameter block as uploaded to the uniform buffer.
    pub fn values(&self) -> &[f32; UNIFORM_SLOTS] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_program_fits_the_parameter_block() {
        for kind in [
            ProgramKind::EquirectangularToCubemap,
            ProgramKind::Irradiance,
            ProgramKind::Prefilter,
            ProgramKind::Downsample,
        ] {
            assert!(kind.uniforms().len() <= UNIFORM_SLOTS);
            for name in kind.uniforms() {
                assert!(kind.source().contains(name), "{} doesn't declare {name}", kind.name());
            }
        }
    }

    #[test]
    fn uniforms_land_in_declared_slots() {
        let mut program = Program::new(ProgramKind::Prefilter, ());
        program.set_uint("face", 3).unwrap();
        program.set_float("roughness", 0.25).unwrap();
        program.set_uint("source_resolution", 512).unwrap();
        assert_eq!(program.values(), &[3., 0.25, 512., 0.]);
        assert_eq!(program.uint("source_resolution").unwrap(), 512);
    }

    #[test]
    fn unknown_uniform_fails_loudly() {
        let mut program = Program::new(ProgramKind::EquirectangularToCubemap, ());
        let err = program.set_float("roughness", 1.).unwrap_err();
        assert!(matches!(
            err,
            IblError::UnknownUniform { program: "equirectangular_to_cubemap", ref name } if name == "roughness"
        ));
        assert!(program.float("sample_count").is_err());
    }
}
