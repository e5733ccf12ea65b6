//! Coarse device summary from a user-agent string.
//!
//! Substring matching against a fixed vocabulary. Unmatched input yields
//! explicit sentinels instead of a guess.

use serde::{Deserialize, Serialize};

pub const BROWSER_NOT_DETECTED: &str = "Browser Not Detected";
pub const OS_NOT_DETECTED: &str = "Operating System Not Detected";
pub const DEVICE_NOT_DETECTED: &str = "Device Type Not Detected";
pub const BROWSER_NOT_RECOGNIZED: &str = "Browser Not Recognized";
pub const OS_NOT_RECOGNIZED: &str = "OS Not Recognized";
pub const DEVICE_NOT_RECOGNIZED: &str = "Device Not Recognized";

/// Order matters: Edge and Chrome UAs also contain "Safari", Edge UAs
/// contain "Chrome".
const BROWSERS: &[(&[&str], &str)] = &[
    (&["Edg/", "Edge/", "EdgA/", "EdgiOS/"], "Edge"),
    (&["Chrome/", "CriOS/"], "Chrome"),
    (&["Firefox/", "FxiOS/"], "Firefox"),
    (&["Safari/"], "Safari"),
];

/// Android UAs contain "Linux"; iOS UAs contain "Mac OS X".
const OPERATING_SYSTEMS: &[(&[&str], &str)] = &[
    (&["Windows"], "Windows"),
    (&["Android"], "Android"),
    (&["iPhone", "iPad", "iPod", "iOS"], "iOS"),
    (&["Mac OS", "Macintosh"], "macOS"),
    (&["Linux", "X11"], "Linux"),
];

/// Parsed browser, OS and device class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub browser: String,
    pub os: String,
    pub device: String,
}

impl DeviceSummary {
    pub fn parse(user_agent: &str) -> Self {
        let ua = user_agent.trim();
        if ua.is_empty() {
            return Self {
                browser: BROWSER_NOT_DETECTED.to_string(),
                os: OS_NOT_DETECTED.to_string(),
                device: DEVICE_NOT_DETECTED.to_string(),
            };
        }

        let browser = first_match(ua, BROWSERS).unwrap_or(BROWSER_NOT_RECOGNIZED);
        let os = first_match(ua, OPERATING_SYSTEMS);

        // Android phones advertise "Mobile"; Android tablets omit it.
        let android_tablet = ua.contains("Android") && !ua.contains("Mobile");
        let device = if ua.contains("iPad") || ua.contains("Tablet") || android_tablet {
            "Tablet"
        } else if ua.contains("Mobile") || ua.contains("iPhone") {
            "Mobile"
        } else if os.is_some() {
            "Desktop"
        } else {
            DEVICE_NOT_RECOGNIZED
        };

        Self {
            browser: browser.to_string(),
            os: os.unwrap_or(OS_NOT_RECOGNIZED).to_string(),
            device: device.to_string(),
        }
    }
}

fn first_match(ua: &str, table: &[(&[&str], &'static str)]) -> Option<&'static str> {
    table
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| ua.contains(n)))
        .map(|(_, name)| *name)
}
