//! EXIF orientation codes, their matrix form and the lossless transform each
//! one maps to.
//!
//! Matrices act on column vectors in screen coordinates (y pointing down), so
//! `ROT_90` is a clockwise quarter turn. Composing `a` then `b` is `b * a`.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::jpeg1::TransformCode;

/// Absolute tolerance when matching a composed matrix against the table.
pub const MATRIX_TOLERANCE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum Orientation {
    #[default]
    NotAvailable = 0,
    Normal = 1,
    HFlip = 2,
    Rot180 = 3,
    VFlip = 4,
    Transpose = 5,
    Rot90 = 6,
    Transverse = 7,
    Rot270 = 8,
}

impl Orientation {
    pub const ALL: [Orientation; 8] = [
        Orientation::Normal,
        Orientation::HFlip,
        Orientation::Rot180,
        Orientation::VFlip,
        Orientation::Transpose,
        Orientation::Rot90,
        Orientation::Transverse,
        Orientation::Rot270,
    ];

    /// Maps an EXIF value to a code; anything outside 1..=8 is unavailable.
    pub fn from_exif(value: u32) -> Self {
        u16::try_from(value)
            .ok()
            .and_then(|v| Orientation::try_from(v).ok())
            .unwrap_or(Orientation::NotAvailable)
    }

    pub fn exif_value(self) -> u16 {
        self.into()
    }

    /// Orientations whose display size is the encoded size transposed.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Orientation::Transpose | Orientation::Rot90 | Orientation::Transverse | Orientation::Rot270
        )
    }

    pub fn is_identity(self) -> bool {
        matches!(self, Orientation::NotAvailable | Orientation::Normal)
    }

    pub fn inverse(self) -> Self {
        match self {
            Orientation::Rot90 => Orientation::Rot270,
            Orientation::Rot270 => Orientation::Rot90,
            other => other,
        }
    }

    pub fn matrix(self) -> TransformMatrix {
        entry(self).matrix
    }

    pub fn transform_code(self) -> TransformCode {
        entry(self).code
    }

    /// Short lowercase name, as accepted on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Orientation::NotAvailable => "none",
            Orientation::Normal => "normal",
            Orientation::HFlip => "hflip",
            Orientation::Rot180 => "rot180",
            Orientation::VFlip => "vflip",
            Orientation::Transpose => "transpose",
            Orientation::Rot90 => "rot90",
            Orientation::Transverse => "transverse",
            Orientation::Rot270 => "rot270",
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Orientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Orientation::ALL
            .iter()
            .copied()
            .find(|o| o.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown orientation '{s}'"))
    }
}

/// 2x2 linear part plus translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformMatrix {
    pub m11: f64,
    pub m12: f64,
    pub m21: f64,
    pub m22: f64,
    pub dx: f64,
    pub dy: f64,
}

impl Default for TransformMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TransformMatrix {
    pub const IDENTITY: TransformMatrix = TransformMatrix::linear(1.0, 0.0, 0.0, 1.0);

    pub const fn linear(m11: f64, m12: f64, m21: f64, m22: f64) -> Self {
        Self {
            m11,
            m12,
            m21,
            m22,
            dx: 0.0,
            dy: 0.0,
        }
    }

    /// `self` followed by `next`.
    pub fn then(&self, next: &TransformMatrix) -> TransformMatrix {
        TransformMatrix {
            m11: next.m11 * self.m11 + next.m12 * self.m21,
            m12: next.m11 * self.m12 + next.m12 * self.m22,
            m21: next.m21 * self.m11 + next.m22 * self.m21,
            m22: next.m21 * self.m12 + next.m22 * self.m22,
            dx: next.m11 * self.dx + next.m12 * self.dy + next.dx,
            dy: next.m21 * self.dx + next.m22 * self.dy + next.dy,
        }
    }

    fn components(&self) -> [f64; 6] {
        [self.m11, self.m12, self.m21, self.m22, self.dx, self.dy]
    }

    pub fn approx_eq(&self, other: &TransformMatrix, tolerance: f64) -> bool {
        self.components()
            .iter()
            .zip(other.components())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    pub fn is_identity(&self) -> bool {
        self.approx_eq(&Self::IDENTITY, MATRIX_TOLERANCE)
    }
}

#[derive(Debug, Clone, Copy)]
struct OrientationEntry {
    orientation: Orientation,
    matrix: TransformMatrix,
    code: TransformCode,
}

const fn row(orientation: Orientation, matrix: TransformMatrix, code: TransformCode) -> OrientationEntry {
    OrientationEntry {
        orientation,
        matrix,
        code,
    }
}

const ORIENTATION_TABLE: [OrientationEntry; 9] = [
    row(Orientation::NotAvailable, TransformMatrix::IDENTITY, TransformCode::None),
    row(Orientation::Normal, TransformMatrix::IDENTITY, TransformCode::None),
    row(Orientation::HFlip, TransformMatrix::linear(-1.0, 0.0, 0.0, 1.0), TransformCode::FlipH),
    row(Orientation::Rot180, TransformMatrix::linear(-1.0, 0.0, 0.0, -1.0), TransformCode::Rot180),
    row(Orientation::VFlip, TransformMatrix::linear(1.0, 0.0, 0.0, -1.0), TransformCode::FlipV),
    row(Orientation::Transpose, TransformMatrix::linear(0.0, 1.0, 1.0, 0.0), TransformCode::Transpose),
    row(Orientation::Rot90, TransformMatrix::linear(0.0, -1.0, 1.0, 0.0), TransformCode::Rot90),
    row(Orientation::Transverse, TransformMatrix::linear(0.0, -1.0, -1.0, 0.0), TransformCode::Transverse),
    row(Orientation::Rot270, TransformMatrix::linear(0.0, 1.0, -1.0, 0.0), TransformCode::Rot270),
];

fn entry(orientation: Orientation) -> &'static OrientationEntry {
    // Rows are laid out by EXIF value.
    &ORIENTATION_TABLE[orientation.exif_value() as usize]
}

/// Orientation whose matrix matches `matrix` within [`MATRIX_TOLERANCE`].
pub fn find_orientation(matrix: &TransformMatrix) -> Option<Orientation> {
    ORIENTATION_TABLE
        .iter()
        .skip(1)
        .find(|e| e.matrix.approx_eq(matrix, MATRIX_TOLERANCE))
        .map(|e| e.orientation)
}

/// Transform code for a composed matrix, if it matches a table entry.
pub fn find_transform(matrix: &TransformMatrix) -> Option<TransformCode> {
    find_orientation(matrix).map(Orientation::transform_code)
}
