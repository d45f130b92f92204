use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance for the homogeneous row of a pose matrix.
const POSE_ROW_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("intrinsics: expected `f cx cy` on the first line, got {0:?}")]
    MalformedIntrinsics(String),
    #[error("intrinsics: focal length must be positive and finite, got {0}")]
    InvalidFocal(f32),
    #[error("intrinsics: principal point must be finite, got ({0}, {1})")]
    InvalidPrincipalPoint(f32, f32),
    #[error("intrinsics: image size must be non-zero, got {0}x{1}")]
    InvalidImageSize(u32, u32),
    #[error("pose: expected 16 values, got {0}")]
    PoseValueCount(usize),
    #[error("pose: value {0:?} is not a number")]
    PoseParse(String),
    #[error("pose: matrix contains non-finite values")]
    NonFinitePose,
    #[error("pose: last row must be [0 0 0 1], got {0:?}")]
    InvalidHomogeneousRow([f32; 4]),
}

/// Pinhole intrinsics expressed in pixels for an image of `width` x `height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub focal: f32,
    pub cx: f32,
    pub cy: f32,
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsics {
    pub fn validate(&self) -> Result<(), ContractError> {
        if !self.focal.is_finite() || self.focal <= 0.0 {
            return Err(ContractError::InvalidFocal(self.focal));
        }
        if !self.cx.is_finite() || !self.cy.is_finite() {
            return Err(ContractError::InvalidPrincipalPoint(self.cx, self.cy));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ContractError::InvalidImageSize(self.width, self.height));
        }
        Ok(())
    }

    /// Rescale to a different image resolution.
    pub fn scaled_to(&self, width: u32, height: u32) -> Self {
        let sx = width as f32 / self.width as f32;
        let sy = height as f32 / self.height as f32;
        Self {
            focal: self.focal * sy,
            cx: self.cx * sx,
            cy: self.cy * sy,
            width,
            height,
        }
    }

    /// Row-major 3x3 camera matrix `[[f, 0, cx], [0, f, cy], [0, 0, 1]]`.
    pub fn matrix(&self) -> [f32; 9] {
        [
            self.focal, 0.0, self.cx, //
            0.0, self.focal, self.cy, //
            0.0, 0.0, 1.0,
        ]
    }
}

/// Camera-to-world transform, row-major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub cam2world: [[f32; 4]; 4],
}

impl CameraPose {
    pub fn identity() -> Self {
        let mut cam2world = [[0.0; 4]; 4];
        for (i, row) in cam2world.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self { cam2world }
    }

    pub fn validate(&self) -> Result<(), ContractError> {
        if self.cam2world.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ContractError::NonFinitePose);
        }
        let last = self.cam2world[3];
        let expected = [0.0, 0.0, 0.0, 1.0];
        if last
            .iter()
            .zip(expected.iter())
            .any(|(a, b)| (a - b).abs() > POSE_ROW_TOLERANCE)
        {
            return Err(ContractError::InvalidHomogeneousRow(last));
        }
        Ok(())
    }

    /// Camera centre in world coordinates.
    pub fn position(&self) -> [f32; 3] {
        [
            self.cam2world[0][3],
            self.cam2world[1][3],
            self.cam2world[2][3],
        ]
    }

    pub fn flatten(&self) -> [f32; 16] {
        let mut out = [0.0; 16];
        for (i, v) in self.cam2world.iter().flatten().enumerate() {
            out[i] = *v;
        }
        out
    }
}

fn parse_floats(line: &str) -> Option<Vec<f32>> {
    line.split_whitespace()
        .map(|tok| tok.parse::<f32>().ok())
        .collect()
}

/// Parse an `intrinsics.txt` file.
///
/// Line 1 holds `f cx cy [_]`. Lines 2 and 3 (grid barycenter, scale) are
/// ignored. An optional line 4 holds `height width`, the resolution the
/// values were written for; without it they are taken to match `image_size`.
/// The result is rescaled to `image_size` (width, height).
pub fn parse_intrinsics(text: &str, image_size: (u32, u32)) -> Result<CameraIntrinsics, ContractError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let first = lines
        .next()
        .ok_or_else(|| ContractError::MalformedIntrinsics(String::new()))?;
    let values = parse_floats(first)
        .filter(|v| v.len() >= 3)
        .ok_or_else(|| ContractError::MalformedIntrinsics(first.to_string()))?;

    let (width, height) = image_size;
    let recorded = lines
        .nth(2)
        .and_then(parse_floats)
        .filter(|v| v.len() >= 2 && v[0] > 0.0 && v[1] > 0.0)
        .map(|v| (v[1] as u32, v[0] as u32));
    let (rec_w, rec_h) = recorded.unwrap_or((width, height));

    let intrinsics = CameraIntrinsics {
        focal: values[0],
        cx: values[1],
        cy: values[2],
        width: rec_w,
        height: rec_h,
    };
    intrinsics.validate()?;
    let scaled = if (rec_w, rec_h) == (width, height) {
        intrinsics
    } else {
        intrinsics.scaled_to(width, height)
    };
    scaled.validate()?;
    Ok(scaled)
}

/// Parse a pose file: 16 whitespace-separated values, row-major.
pub fn parse_pose(text: &str) -> Result<CameraPose, ContractError> {
    let mut values = Vec::with_capacity(16);
    for tok in text.split_whitespace() {
        let v = tok
            .parse::<f32>()
            .map_err(|_| ContractError::PoseParse(tok.to_string()))?;
        values.push(v);
    }
    if values.len() != 16 {
        return Err(ContractError::PoseValueCount(values.len()));
    }
    let mut cam2world = [[0.0; 4]; 4];
    for (i, v) in values.into_iter().enumerate() {
        cam2world[i / 4][i % 4] = v;
    }
    let pose = CameraPose { cam2world };
    pose.validate()?;
    Ok(pose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intrinsics_rescale_with_recorded_resolution() {
        let text = "131.25 64.0 64.0 0.\n0. 0. 0.\n1.\n128 128\n";
        let k = parse_intrinsics(text, (64, 64)).unwrap();
        assert!((k.focal - 65.625).abs() < 1e-4);
        assert!((k.cx - 32.0).abs() < 1e-4);
        assert!((k.cy - 32.0).abs() < 1e-4);
        assert_eq!((k.width, k.height), (64, 64));
    }

    #[test]
    fn intrinsics_without_resolution_match_image() {
        let k = parse_intrinsics("50 16 16\n", (32, 32)).unwrap();
        assert_eq!(k.focal, 50.0);
        assert_eq!((k.width, k.height), (32, 32));
    }

    #[test]
    fn pose_row_major_layout() {
        let pose = parse_pose("1 0 0 0.5\n0 1 0 -1\n0 0 1 2\n0 0 0 1\n").unwrap();
        assert_eq!(pose.position(), [0.5, -1.0, 2.0]);
        assert_eq!(pose.flatten()[3], 0.5);
    }

    #[test]
    fn identity_pose_is_valid() {
        assert!(CameraPose::identity().validate().is_ok());
    }
}
