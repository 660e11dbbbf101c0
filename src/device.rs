//! Device compatibility checking
//!
//! Pure validation of a device descriptor against minimum screen size, a
//! browser/version allowlist and a tablet-class heuristic. No state.

use crate::types::{DeviceInfo, EnvironmentCheck};

/// Minimum screen width in CSS pixels
const MIN_SCREEN_WIDTH: f64 = 768.0;
/// Minimum screen height in CSS pixels
const MIN_SCREEN_HEIGHT: f64 = 1024.0;
/// Pixel ratio below which a low-resolution recommendation is issued
const LOW_DPI_THRESHOLD: f64 = 1.5;

/// Supported browsers with their minimum major versions
const SUPPORTED_BROWSERS: &[(&str, u32)] = &[("Chrome", 90), ("Safari", 14), ("Edge", 90)];

/// Check whether a device can run a gaze-tracking test.
///
/// Returns a compatibility verdict with human-readable issue and
/// recommendation lists. Recommendations alone do not make a device
/// incompatible; only issues do.
pub fn check_environment(device: &DeviceInfo) -> EnvironmentCheck {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    if device.screen_width < MIN_SCREEN_WIDTH || device.screen_height < MIN_SCREEN_HEIGHT {
        issues.push(format!(
            "Screen size too small. Minimum {}x{} required.",
            MIN_SCREEN_WIDTH as u32, MIN_SCREEN_HEIGHT as u32
        ));
        recommendations
            .push("Use a tablet device (iPad, Android tablet) for optimal experience.".to_string());
    }

    match parse_browser(&device.user_agent) {
        Some((browser, version)) => {
            let minimum = SUPPORTED_BROWSERS
                .iter()
                .find(|(name, _)| *name == browser)
                .map(|(_, min)| *min);
            if let Some(min) = minimum {
                if version < min {
                    issues.push(format!(
                        "{browser} version too old. Please update to {browser} {min} or later."
                    ));
                }
            }
        }
        None => {
            issues.push("Browser not supported. Chrome, Safari, or Edge required.".to_string());
            recommendations.push("Please use Chrome 90+, Safari 14+, or Edge 90+.".to_string());
        }
    }

    if !is_tablet_like(&device.user_agent) {
        issues.push("Desktop device detected. Gaze tracking requires a tablet with a front camera.".to_string());
        recommendations.push("Please use an iPad or Android tablet.".to_string());
    }

    if device.device_pixel_ratio < LOW_DPI_THRESHOLD {
        recommendations.push(
            "Low resolution screen detected. Higher resolution recommended for better accuracy."
                .to_string(),
        );
    }

    EnvironmentCheck {
        compatible: issues.is_empty(),
        issues,
        recommendations,
        required_permissions: vec!["camera".to_string()],
    }
}

/// Extract `(browser, major version)` from a user-agent string.
/// Only browsers in the allowlist are recognized.
fn parse_browser(user_agent: &str) -> Option<(&'static str, u32)> {
    for (name, _) in SUPPORTED_BROWSERS {
        if let Some(idx) = user_agent.find(&format!("{name}/")) {
            let version_str = &user_agent[idx + name.len() + 1..];
            let digits: String = version_str.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(version) = digits.parse::<u32>() {
                return Some((name, version));
            }
        }
    }
    None
}

/// Mobile/tablet heuristic matching the capture client's device classes
fn is_tablet_like(user_agent: &str) -> bool {
    ["Mobile", "Android", "iPad", "iPhone"]
        .iter()
        .any(|marker| user_agent.contains(marker))
}
