use std::f32::consts::PI;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// One corner of a face quad: where it lands on the render target and which
/// world direction it looks at.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CubeVertex {
    pub position: Vec3,
    pub direction: Vec3,
}

const fn vertex(position: [f32; 3], direction: [f32; 3]) -> CubeVertex {
    CubeVertex {
        position: Vec3::from_array(position),
        direction: Vec3::from_array(direction),
    }
}

/// Four vertices per face in face order. Within a face the positions go
/// bottom-left, bottom-right, top-right, top-left, and the directions follow
/// the usual cubemap convention where the t axis points down. Reordering the
/// directions of a quad mirrors the projected face.
#[rustfmt::skip]
pub const CUBE_VERTICES: [CubeVertex; 24] = [
    // +X
    vertex([-1., -1., 0.], [ 1.,  1.,  1.]),
    vertex([ 1., -1., 0.], [ 1.,  1., -1.]),
    vertex([ 1.,  1., 0.], [ 1., -1., -1.]),
    vertex([-1.,  1., 0.], [ 1., -1.,  1.]),
    // -X
    vertex([-1., -1., 0.], [-1.,  1., -1.]),
    vertex([ 1., -1., 0.], [-1.,  1.,  1.]),
    vertex([ 1.,  1., 0.], [-1., -1.,  1.]),
    vertex([-1.,  1., 0.], [-1., -1., -1.]),
    // +Y
    vertex([-1., -1., 0.], [-1.,  1., -1.]),
    vertex([ 1., -1., 0.], [ 1.,  1., -1.]),
    vertex([ 1.,  1., 0.], [ 1.,  1.,  1.]),
    vertex([-1.,  1., 0.], [-1.,  1.,  1.]),
    // -Y
    vertex([-1., -1., 0.], [-1., -1.,  1.]),
    vertex([ 1., -1., 0.], [ 1., -1.,  1.]),
    vertex([ 1.,  1., 0.], [ 1., -1., -1.]),
    vertex([-1.,  1., 0.], [-1., -1., -1.]),
    // +Z
    vertex([-1., -1., 0.], [-1.,  1.,  1.]),
    vertex([ 1., -1., 0.], [ 1.,  1.,  1.]),
    vertex([ 1.,  1., 0.], [ 1., -1.,  1.]),
    vertex([-1.,  1., 0.], [-1., -1.,  1.]),
    // -Z
    vertex([-1., -1., 0.], [ 1.,  1., -1.]),
    vertex([ 1., -1., 0.], [-1.,  1., -1.]),
    vertex([ 1.,  1., 0.], [-1., -1., -1.]),
    vertex([-1.,  1., 0.], [ 1., -1., -1.]),
];

#[rustfmt::skip]
pub const CUBE_INDICES: [u32; 36] = [
     0,  1,  2,  2,  3,  0,
     4,  5,  6,  6,  7,  4,
     8,  9, 10, 10, 11,  8,
    12, 13, 14, 14, 15, 12,
    16, 17, 18, 18, 19, 16,
    20, 21, 22, 22, 23, 20,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn quad(self) -> &'static [CubeVertex] {
        let first = self.index() * 4;
        &CUBE_VERTICES[first..first + 4]
    }

    /// Indices of the two triangles that cover this face.
    pub fn indices(self) -> &'static [u32] {
        let first = self.index() * 6;
        &CUBE_INDICES[first..first + 6]
    }

    /// Unnormalized direction at face coordinates `(u, v)`, `(0, 0)` being the
    /// first vertex of the quad. Faces are parallelograms so interpolating the
    /// corners is exact.
    fn corner_lerp(self, u: f32, v: f32) -> Vec3 {
        let (origin, along_u, along_v) = self.edges();
        origin + along_u * u + along_v * v
    }

    /// First corner of the quad and its edges along u and v.
    fn edges(self) -> (Vec3, Vec3, Vec3) {
        let quad = self.quad();
        let origin = quad[0].direction;
        (origin, quad[1].direction - origin, quad[3].direction - origin)
    }

    pub fn direction(self, u: f32, v: f32) -> Vec3 {
        self.corner_lerp(u, v).normalize_or_zero()
    }

    /// Direction through the center of texel `(x, y)` of a `size`x`size` face.
    pub fn texel_direction(self, x: u32, y: u32, size: u32) -> Vec3 {
        let u = (x as f32 + 0.5) / size as f32;
        let v = (y as f32 + 0.5) / size as f32;
        self.direction(u, v)
    }

    pub fn normal(self) -> Vec3 {
        self.corner_lerp(0.5, 0.5)
    }

    /// Finds the face a direction hits and the face coordinates of the hit.
    pub fn locate(direction: Vec3) -> (CubeFace, f32, f32) {
        let face = CubeFace::ALL
            .into_iter()
            .max_by(|a, b| direction.dot(a.normal()).total_cmp(&direction.dot(b.normal())))
            .unwrap_or(CubeFace::PositiveX);

        let on_face = direction / direction.dot(face.normal());
        let (origin, along_u, along_v) = face.edges();
        let local = on_face - origin;
        // Edges of the quad are 2 units long
        let u = local.dot(along_u) / 4.;
        let v = local.dot(along_v) / 4.;
        (face, u.clamp(0., 1.), v.clamp(0., 1.))
    }
}

/// Latitude/longitude coordinates of a direction in an equirectangular
/// panorama stored bottom to top.
pub fn equirect_uv(direction: Vec3) -> (f32, f32) {
    let d = direction.normalize_or_zero();
    let u = d.z.atan2(d.x) / (2. * PI) + 0.5;
    let v = d.y.clamp(-1., 1.).asin() / PI + 0.5;
    (u, v)
}
