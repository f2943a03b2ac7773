//! Shift-archive export.
//!
//! The archive is the persisted form of a run's shift history: rigid shifts
//! for every frame and, when piecewise-rigid ran, the per-frame per-patch
//! displacement grids. Keys for passes that did not run are `null`, never
//! zero-filled, so consumers can distinguish "not corrected piecewise" from
//! "corrected with zero local motion".

use serde::{Deserialize, Serialize};

use stackreg_core::Real;

use crate::shifts::FrameShift;

/// Key-value archive of a correction run's shift history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftArchive {
    /// Rigid `(dy, dx)` per frame, length T.
    pub shifts_rig: Vec<[Real; 2]>,
    /// Per-frame per-patch x displacements; `None` when piecewise-rigid was
    /// not run.
    pub x_shifts_els: Option<Vec<Vec<Real>>>,
    /// Per-frame per-patch y displacements; `None` when piecewise-rigid was
    /// not run.
    pub y_shifts_els: Option<Vec<Vec<Real>>>,
}

impl ShiftArchive {
    /// Build the archive from a run's frame-ordered shift records.
    pub fn from_shifts(shifts: &[FrameShift]) -> Self {
        let shifts_rig = shifts
            .iter()
            .map(|s| {
                let rigid = s.rigid();
                [rigid.dy, rigid.dx]
            })
            .collect();
        let x_shifts_els = shifts
            .iter()
            .map(|s| s.patches().map(|p| p.dxs()))
            .collect();
        let y_shifts_els = shifts
            .iter()
            .map(|s| s.patches().map(|p| p.dys()))
            .collect();
        Self {
            shifts_rig,
            x_shifts_els,
            y_shifts_els,
        }
    }

    /// Number of frames covered.
    pub fn len(&self) -> usize {
        self.shifts_rig.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shifts_rig.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shifts::{PatchField, PatchProvenance, PatchShift};
    use stackreg_core::Shift;

    fn rigid_record() -> Vec<FrameShift> {
        vec![
            FrameShift::Rigid(Shift::new(1.0, -1.0)),
            FrameShift::Rigid(Shift::new(0.5, 0.25)),
        ]
    }

    fn pw_record() -> Vec<FrameShift> {
        let field = PatchField {
            rows: 1,
            cols: 2,
            entries: vec![
                PatchShift {
                    shift: Shift::new(1.25, -0.75),
                    provenance: PatchProvenance::Refined,
                },
                PatchShift {
                    shift: Shift::new(1.0, -1.0),
                    provenance: PatchProvenance::ClampedFallback,
                },
            ],
        };
        vec![FrameShift::PiecewiseRigid {
            rigid: Shift::new(1.0, -1.0),
            patches: field,
        }]
    }

    #[test]
    fn rigid_only_archive_has_null_patch_keys() {
        let archive = ShiftArchive::from_shifts(&rigid_record());
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.shifts_rig[0], [1.0, -1.0]);
        assert!(archive.x_shifts_els.is_none());
        assert!(archive.y_shifts_els.is_none());

        let json = serde_json::to_value(&archive).unwrap();
        assert!(json["x_shifts_els"].is_null());
        assert!(json["y_shifts_els"].is_null());
    }

    #[test]
    fn piecewise_archive_carries_patch_grids() {
        let archive = ShiftArchive::from_shifts(&pw_record());
        assert_eq!(archive.x_shifts_els.as_ref().unwrap()[0], vec![-0.75, -1.0]);
        assert_eq!(archive.y_shifts_els.as_ref().unwrap()[0], vec![1.25, 1.0]);
    }

    #[test]
    fn archive_json_roundtrip() {
        let archive = ShiftArchive::from_shifts(&pw_record());
        let json = serde_json::to_string(&archive).unwrap();
        let de: ShiftArchive = serde_json::from_str(&json).unwrap();
        assert_eq!(de, archive);
    }
}
