//! Devices command handler: print the device catalogue.

use mangas_core::imaging::{DeviceProfile, list_devices};

pub fn run_devices_command() {
    for profile in list_devices() {
        println!("{}", render_device_row(profile));
    }
}

fn render_device_row(profile: &DeviceProfile) -> String {
    format!(
        "{:<22} {:<34} {}x{} @ {} dpi{}",
        profile.id,
        profile.name,
        profile.width,
        profile.height,
        profile.dpi,
        if profile.grayscale { "" } else { ", color" }
    )
}
