//! Core data model for volscope-rs.
//!
//! This crate holds the scene-side objects the volume pass reads from:
//! - [`TimeStamp`] modification tracking shared by every mutable object
//! - [`ColorTransferFunction`] and [`PiecewiseFunction`] for color/opacity mapping
//! - [`VolumeProperty`] with per-component transfer functions
//! - [`ImageData`] scalar grids and their index/world transforms
//! - [`Volume`], [`VolumeMapper`] and [`BlendMode`]
//! - [`VolumePassOptions`] configuration

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Sample counts and grid dimensions routinely cross between usize/u32/f64
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod error;
pub mod image_data;
pub mod options;
pub mod time_stamp;
pub mod transfer_function;
pub mod volume;
pub mod volume_property;

pub use error::{CoreError, Result};
pub use image_data::ImageData;
pub use options::{load_options, VolumePassOptions};
pub use time_stamp::TimeStamp;
pub use transfer_function::{ColorTransferFunction, PiecewiseFunction};
pub use volume::{BlendMode, Volume, VolumeHandle, VolumeMapper};
pub use volume_property::{ColorMode, InterpolationType, VolumeProperty, MAX_COMPONENTS};

// Re-export glam types for convenience
pub use glam::{DMat3, DMat4, DVec3};
