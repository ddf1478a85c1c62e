//! Image optimization for target reading devices.
//!
//! - [`profile`] holds the device catalogue and derives [`OptimizationSettings`]
//! - [`pipeline`] applies those settings to page images

mod error;
pub mod pipeline;
pub mod profile;

pub use error::ImageError;
pub use pipeline::{EncodedImage, ImageTransformPipeline, target_dimensions};
pub use profile::{
    DEVICE_PROFILES, DeviceProfile, OptimizationSettings, Orientation, OutputEncoding,
    get_device_profile, list_devices,
};
