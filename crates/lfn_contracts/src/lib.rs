//! Shared data contracts for light field datasets: camera intrinsics and
//! camera-to-world poses, their on-disk text formats, and validation.

pub mod camera;

pub use camera::{parse_intrinsics, parse_pose, CameraIntrinsics, CameraPose, ContractError};
