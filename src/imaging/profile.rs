//! Target reading devices and the optimization settings derived from them.

use std::fmt;
use std::str::FromStr;

/// Preferred reading orientation of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
    Both,
}

impl Orientation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Portrait => "portrait",
            Self::Landscape => "landscape",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a reading device's display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Lookup key, e.g. `kindle-paperwhite3`.
    pub id: &'static str,
    pub name: &'static str,
    pub model: &'static str,
    /// Screen width in pixels.
    pub width: u32,
    /// Screen height in pixels.
    pub height: u32,
    pub dpi: u32,
    /// True for monochrome (e-ink) panels.
    pub grayscale: bool,
    pub panel_view: bool,
    pub orientation: Orientation,
}

macro_rules! device {
    ($id:literal, $name:literal, $model:literal, $w:literal x $h:literal @ $dpi:literal, $gray:literal, $panel:literal, $orient:ident) => {
        DeviceProfile {
            id: $id,
            name: $name,
            model: $model,
            width: $w,
            height: $h,
            dpi: $dpi,
            grayscale: $gray,
            panel_view: $panel,
            orientation: Orientation::$orient,
        }
    };
}

/// Every known device, in catalogue order.
pub const DEVICE_PROFILES: &[DeviceProfile] = &[
    device!("kindle1", "Kindle 1", "K1", 600 x 800 @ 167, true, false, Portrait),
    device!("kindle2", "Kindle 2", "K2", 600 x 800 @ 167, true, false, Portrait),
    device!("kindle-dx", "Kindle DX", "KDX", 824 x 1200 @ 150, true, false, Portrait),
    device!("kindle3", "Kindle Keyboard", "K3", 600 x 800 @ 167, true, false, Portrait),
    device!("kindle4", "Kindle 4", "K4", 600 x 800 @ 167, true, false, Portrait),
    device!("kindle-touch", "Kindle Touch", "KT", 600 x 800 @ 167, true, false, Portrait),
    device!("kindle-paperwhite", "Kindle Paperwhite 1/2", "KPW", 758 x 1024 @ 212, true, true, Portrait),
    device!("kindle-paperwhite3", "Kindle Paperwhite 3/4", "KPW3", 1072 x 1448 @ 300, true, true, Portrait),
    device!("kindle-voyage", "Kindle Voyage", "KV", 1072 x 1448 @ 300, true, true, Portrait),
    device!("kindle-oasis", "Kindle Oasis 1/2", "KO", 1072 x 1448 @ 300, true, true, Both),
    device!("kindle-oasis3", "Kindle Oasis 3", "KO3", 1264 x 1680 @ 300, true, true, Both),
    device!("kindle-basic", "Kindle Basic (10th gen)", "KB", 758 x 1024 @ 167, true, false, Portrait),
    device!("kindle-scribe", "Kindle Scribe", "KS", 1860 x 2480 @ 300, true, true, Both),
    device!("kindle-fire", "Kindle Fire", "KF", 600 x 1024 @ 169, false, true, Both),
    device!("kindle-fire-hd", "Kindle Fire HD 7", "KFHD7", 800 x 1280 @ 216, false, true, Both),
    device!("kindle-fire-hdx", "Kindle Fire HDX 7", "KFHDX7", 1200 x 1920 @ 323, false, true, Both),
];

/// Looks up a device by id.
#[must_use]
pub fn get_device_profile(id: &str) -> Option<&'static DeviceProfile> {
    DEVICE_PROFILES.iter().find(|d| d.id == id)
}

/// Returns every device sorted by id.
#[must_use]
pub fn list_devices() -> Vec<&'static DeviceProfile> {
    let mut devices: Vec<_> = DEVICE_PROFILES.iter().collect();
    devices.sort_by_key(|d| d.id);
    devices
}

/// Output image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputEncoding {
    #[default]
    Jpeg,
    Png,
}

impl OutputEncoding {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    /// MIME type of images in this encoding.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

impl FromStr for OutputEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(format!("unsupported output encoding: {other}")),
        }
    }
}

/// Parameters of the image transform pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationSettings {
    pub max_width: u32,
    pub max_height: u32,
    /// Encoder quality, 1-100. Ignored for lossless encodings.
    pub quality: u8,
    pub grayscale: bool,
    pub sharpen: bool,
    /// 1.0 leaves contrast unchanged.
    pub contrast: f64,
    /// 1.0 leaves brightness unchanged; below 1.0 darkens midtones.
    pub gamma: f64,
    pub encoding: OutputEncoding,
    pub strip_metadata: bool,
}

impl OptimizationSettings {
    const BASE_QUALITY: u8 = 85;
    const HIGH_DPI_QUALITY: u8 = 90;
    const HIGH_DPI_THRESHOLD: u32 = 300;
    const CONTRAST: f64 = 1.1;
    const EINK_GAMMA: f64 = 0.9;

    /// Derives the recommended settings for `device`.
    ///
    /// Monochrome panels get grayscale output, sharpening and a slightly
    /// darker gamma. Devices at 300 dpi or more get higher encode quality.
    #[must_use]
    pub fn for_profile(device: &DeviceProfile) -> Self {
        Self {
            max_width: device.width,
            max_height: device.height,
            quality: if device.dpi >= Self::HIGH_DPI_THRESHOLD {
                Self::HIGH_DPI_QUALITY
            } else {
                Self::BASE_QUALITY
            },
            grayscale: device.grayscale,
            sharpen: device.grayscale,
            contrast: Self::CONTRAST,
            gamma: if device.grayscale {
                Self::EINK_GAMMA
            } else {
                1.0
            },
            encoding: OutputEncoding::Jpeg,
            strip_metadata: true,
        }
    }

    /// Settings that only re-encode, with no size cap or tone changes.
    #[must_use]
    pub fn passthrough(encoding: OutputEncoding) -> Self {
        Self {
            max_width: u32::MAX,
            max_height: u32::MAX,
            quality: Self::BASE_QUALITY,
            grayscale: false,
            sharpen: false,
            contrast: 1.0,
            gamma: 1.0,
            encoding,
            strip_metadata: true,
        }
    }
}
