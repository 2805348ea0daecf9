pub const TARGET: &str = "thumbv7em-none-eabihf";
pub const CHIP: &str = "nRF52840_xxAA";
pub const APP_MANIFEST: &str = "crates/power-meter-app/Cargo.toml";
pub const APP_NAME: &str = "power-meter-app";

/// Crates that build and test on the host.
pub const HOST_CRATES: &[&str] =
    &["power-meter-core", "power-meter-icd", "ads1232", "icm-42670"];

pub fn app_elf(release: bool) -> String {
    let profile = if release { "release" } else { "debug" };
    format!("target/{TARGET}/{profile}/{APP_NAME}")
}
