//! Six-neighbour occupancy patterns.
//!
//! The pattern of the face-adjacent nodes conditions occupancy coding.
//! Patterns are reduced to canonical classes before entering a context
//! key; the reductions here are the bitstream contract, not a heuristic.

use std::collections::HashMap;

use crate::point::Vec3;

/// Face-neighbour directions matching pattern bits 0..5.
pub(crate) const NEIGH_DIRS: [[i32; 3]; 6] = [
    [-1, 0, 0],
    [1, 0, 0],
    [0, -1, 0],
    [0, 1, 0],
    [0, 0, -1],
    [0, 0, 1],
];

/// Occupied-node index for one tree level, keyed by node position.
pub(crate) struct LevelMap {
    map: HashMap<Vec3, u32>,
}

impl LevelMap {
    pub fn build(positions: impl Iterator<Item = Vec3>) -> Self {
        LevelMap {
            map: positions.enumerate().map(|(i, p)| (p, i as u32)).collect(),
        }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        self.map.contains_key(&p)
    }

    /// Six-bit occupancy pattern around `pos`. Nodes outside the slice
    /// bounding box read as unoccupied.
    pub fn neigh_pattern(&self, pos: Vec3) -> u8 {
        let mut pattern = 0u8;
        for (bit, d) in NEIGH_DIRS.iter().enumerate() {
            let q = Vec3([pos[0] + d[0], pos[1] + d[1], pos[2] + d[2]]);
            if self.contains(q) {
                pattern |= 1 << bit;
            }
        }
        pattern
    }
}

/// Reduces a 6-bit pattern to one of 9 classes: empty, the axis of a
/// lone neighbour, opposed or adjacent pairs, then by count.
pub(crate) fn neigh_pattern_to_9(p: u8) -> u8 {
    match p.count_ones() {
        0 => 0,
        1 => 1 + lone_axis(p),
        2 => {
            if opposed_pair(p) {
                4
            } else {
                5
            }
        }
        3 => 6,
        4 | 5 => 7,
        _ => 8,
    }
}

/// Coarser 6-class reduction used by the sparse family.
pub(crate) fn neigh_pattern_to_6(p: u8) -> u8 {
    match p.count_ones() {
        0 => 0,
        1 => 1 + lone_axis(p),
        2 | 3 => 4,
        _ => 5,
    }
}

fn lone_axis(p: u8) -> u8 {
    // Bits 0-1 are x, 2-3 y, 4-5 z.
    (p.trailing_zeros() as u8) >> 1
}

fn opposed_pair(p: u8) -> bool {
    p == 0b11 || p == 0b1100 || p == 0b11_0000
}
