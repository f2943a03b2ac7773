//! Per-frame shift records.
//!
//! A frame's final displacement is either rigid or piecewise-rigid; patch
//! entries record whether they came from a refined engine estimate or from
//! the clamped rigid fallback, so downstream analysis (and the tests) can
//! tell the two policies apart.

use serde::{Deserialize, Serialize};

use stackreg_core::{Real, Shift};

/// How a patch displacement was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchProvenance {
    /// Engine estimate, constrained to the deviation bound.
    Refined,
    /// Patch content was too flat to register; the frame's rigid
    /// displacement was used instead.
    ClampedFallback,
}

/// Displacement of one patch of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatchShift {
    pub shift: Shift,
    pub provenance: PatchProvenance,
}

/// Per-frame displacement field over the patch grid, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchField {
    pub rows: usize,
    pub cols: usize,
    pub entries: Vec<PatchShift>,
}

impl PatchField {
    /// Per-patch `dy` components in grid order.
    pub fn dys(&self) -> Vec<Real> {
        self.entries.iter().map(|p| p.shift.dy).collect()
    }

    /// Per-patch `dx` components in grid order.
    pub fn dxs(&self) -> Vec<Real> {
        self.entries.iter().map(|p| p.shift.dx).collect()
    }
}

/// The final displacement record for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameShift {
    Rigid(Shift),
    PiecewiseRigid { rigid: Shift, patches: PatchField },
}

impl FrameShift {
    /// The whole-frame rigid displacement, present in both variants.
    pub fn rigid(&self) -> Shift {
        match self {
            FrameShift::Rigid(shift) => *shift,
            FrameShift::PiecewiseRigid { rigid, .. } => *rigid,
        }
    }

    /// The patch field, when piecewise-rigid correction ran.
    pub fn patches(&self) -> Option<&PatchField> {
        match self {
            FrameShift::Rigid(_) => None,
            FrameShift::PiecewiseRigid { patches, .. } => Some(patches),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rigid_accessor_works_for_both_variants() {
        let rigid = FrameShift::Rigid(Shift::new(1.0, 2.0));
        assert_eq!(rigid.rigid(), Shift::new(1.0, 2.0));
        assert!(rigid.patches().is_none());

        let pw = FrameShift::PiecewiseRigid {
            rigid: Shift::new(0.5, -0.5),
            patches: PatchField {
                rows: 1,
                cols: 1,
                entries: vec![PatchShift {
                    shift: Shift::new(0.75, -0.25),
                    provenance: PatchProvenance::Refined,
                }],
            },
        };
        assert_eq!(pw.rigid(), Shift::new(0.5, -0.5));
        assert_eq!(pw.patches().unwrap().dys(), vec![0.75]);
        assert_eq!(pw.patches().unwrap().dxs(), vec![-0.25]);
    }
}
