use rand::Rng;
use serde::Serialize;

use crate::errors::RewardError;
use crate::state::{OutcomeTable, DEGREES_PER_TURN};

/// Full turns the wheel makes before settling, inclusive range.
pub const MIN_FULL_ROTATIONS: u32 = 3;
pub const MAX_FULL_ROTATIONS: u32 = 5;

/// A selected segment and the rotation that lands the pointer on its centre.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WheelSpin {
    pub index: usize,
    pub reward: u64,
    pub rotation_degrees: f64,
}

impl OutcomeTable {
    /// Pick a segment uniformly at random.
    pub fn spin<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.gen_range(0..self.len())
    }
}

/// Pick a segment, then derive the presentation angle from it.
pub fn spin_wheel<R: Rng + ?Sized>(table: &OutcomeTable, rng: &mut R) -> WheelSpin {
    let index = table.spin(rng);
    let full_rotations = rng.gen_range(MIN_FULL_ROTATIONS..=MAX_FULL_ROTATIONS);
    WheelSpin {
        index,
        reward: table.rewards()[index],
        rotation_degrees: rotation_for(table, index, full_rotations),
    }
}

/// Total rotation in degrees for `full_rotations` turns ending at the middle
/// of segment `index`.
pub fn rotation_for(table: &OutcomeTable, index: usize, full_rotations: u32) -> f64 {
    let segment = table.segment_degrees();
    full_rotations as f64 * DEGREES_PER_TURN + index as f64 * segment + segment / 2.0
}

/// Segment under the pointer for a rotation produced by [`rotation_for`].
pub fn segment_at(table: &OutcomeTable, rotation_degrees: f64) -> Result<usize, RewardError> {
    let within_turn = rotation_degrees.rem_euclid(DEGREES_PER_TURN);
    let index = (within_turn / table.segment_degrees()).floor() as usize;
    table.reward(index).map(|_| index)
}
