use std::ops::{Add, AddAssign, Index, IndexMut, Shl, Shr, Sub, SubAssign};

use num_traits::AsPrimitive;

/// An integer position, 18-24 bits per component after quantisation.
///
/// Also used for spherical positions in angular mode, where the
/// components are (radius, azimuth, laser index).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vec3(pub [i32; 3]);

impl Vec3 {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Vec3([x, y, z])
    }

    pub fn splat(v: i32) -> Self {
        Vec3([v, v, v])
    }

    pub fn min_by_component(self, other: Self) -> Self {
        Vec3([
            self.0[0].min(other.0[0]),
            self.0[1].min(other.0[1]),
            self.0[2].min(other.0[2]),
        ])
    }

    pub fn max_by_component(self, other: Self) -> Self {
        Vec3([
            self.0[0].max(other.0[0]),
            self.0[1].max(other.0[1]),
            self.0[2].max(other.0[2]),
        ])
    }

    pub fn min_component(self) -> i32 {
        self.0[0].min(self.0[1]).min(self.0[2])
    }

    pub fn max_component(self) -> i32 {
        self.0[0].max(self.0[1]).max(self.0[2])
    }

    /// Squared euclidean norm, in 64 bits to survive 24-bit components.
    pub fn norm2(self) -> i64 {
        let x = self.0[0] as i64;
        let y = self.0[1] as i64;
        let z = self.0[2] as i64;
        x * x + y * y + z * z
    }

}

impl Index<usize> for Vec3 {
    type Output = i32;

    fn index(&self, axis: usize) -> &i32 {
        &self.0[axis]
    }
}

impl IndexMut<usize> for Vec3 {
    fn index_mut(&mut self, axis: usize) -> &mut i32 {
        &mut self.0[axis]
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3([
            self.0[0] + rhs.0[0],
            self.0[1] + rhs.0[1],
            self.0[2] + rhs.0[2],
        ])
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3([
            self.0[0] - rhs.0[0],
            self.0[1] - rhs.0[1],
            self.0[2] - rhs.0[2],
        ])
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Vec3) {
        *self = *self - rhs;
    }
}

impl Shl<u32> for Vec3 {
    type Output = Vec3;

    fn shl(self, s: u32) -> Vec3 {
        Vec3([self.0[0] << s, self.0[1] << s, self.0[2] << s])
    }
}

impl Shr<u32> for Vec3 {
    type Output = Vec3;

    fn shr(self, s: u32) -> Vec3 {
        Vec3([self.0[0] >> s, self.0[1] >> s, self.0[2] >> s])
    }
}

/// Interleaves the low `bits` of each component, x major.
///
/// The octree coders order points by this key so that in-place child
/// partitions at every depth are contiguous ranges.
pub fn morton_code(p: Vec3, bits: u32) -> u64 {
    let mut key = 0u64;
    for b in (0..bits).rev() {
        for axis in 0..3 {
            key = key << 1 | (p.0[axis] as u64 >> b & 1);
        }
    }
    key
}

/// A reference frame: the decoded positions of a previous slice, plus the
/// spherical positions the predictive-tree decoder reported for it.
#[derive(Clone, Default)]
pub struct RefFrame {
    pub points: Vec<Vec3>,
    pub sph: Vec<Vec3>,
}

/// Converts a count of generic integer components into `i32` positions.
pub fn positions_from<T>(src: &[[T; 3]]) -> Vec<Vec3>
where
    T: AsPrimitive<i32>,
{
    src.iter()
        .map(|c| Vec3([c[0].as_(), c[1].as_(), c[2].as_()]))
        .collect()
}
