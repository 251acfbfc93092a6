/// Camera permission status
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PermissionStatus {
    /// Permission granted
    Granted,
    /// Permission denied
    Denied,
    /// Permission not determined (the user will be prompted)
    NotDetermined,
    /// Permission restricted (parental controls, etc)
    Restricted,
}

impl PermissionStatus {
    /// Whether opening a stream would trigger a prompt rather than fail outright
    pub fn needs_prompt(&self) -> bool {
        matches!(self, PermissionStatus::NotDetermined)
    }
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionStatus::Granted => write!(f, "granted"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::NotDetermined => write!(f, "prompt"),
            PermissionStatus::Restricted => write!(f, "restricted"),
        }
    }
}

/// Detailed permission information
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PermissionInfo {
    pub status: PermissionStatus,
    pub message: String,
}

/// Probe camera permission for the current host.
///
/// Returns `None` where the host offers no way to query permission; callers
/// treat that as "prompt needed".
pub fn probe_host_permission() -> Option<PermissionInfo> {
    #[cfg(target_os = "linux")]
    {
        Some(probe_linux())
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(target_os = "linux")]
fn probe_linux() -> PermissionInfo {
    use std::fs;
    use std::path::Path;

    let video_devices: Vec<_> = (0..10)
        .map(|i| format!("/dev/video{}", i))
        .filter(|path| Path::new(path).exists())
        .collect();

    let Some(first_device) = video_devices.first() else {
        return PermissionInfo {
            status: PermissionStatus::NotDetermined,
            message: "No video devices found at /dev/video*".to_string(),
        };
    };

    match fs::metadata(first_device) {
        Ok(_) if in_video_group() => PermissionInfo {
            status: PermissionStatus::Granted,
            message: format!(
                "Camera access granted (user in video group, {} found)",
                first_device
            ),
        },
        Ok(_) => PermissionInfo {
            status: PermissionStatus::Denied,
            message: format!(
                "Camera device {} exists but user not in video group - run: sudo usermod -a -G video $USER",
                first_device
            ),
        },
        Err(e) => PermissionInfo {
            status: PermissionStatus::Denied,
            message: format!("Cannot access {}: {}", first_device, e),
        },
    }
}

#[cfg(target_os = "linux")]
fn in_video_group() -> bool {
    use std::process::Command;

    Command::new("groups")
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|groups| groups.contains("video") || groups.contains("plugdev"))
        .unwrap_or(false)
}
