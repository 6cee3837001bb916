use crate::error::Result;
use crate::geometry::NormPoint;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::manager::MAX_CAMERA_SLOTS;

/// How a camera slot's `source` string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Integer device index
    Usb,
    /// RTSP stream URL
    Rtsp,
    /// Other IP stream URL
    Ip,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Usb => "usb",
            SourceKind::Rtsp => "rtsp",
            SourceKind::Ip => "ip",
        }
    }
}

/// One persisted camera slot.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSlotConfig {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub source: String,
    pub enabled: bool,
    /// Normalized ROI polygon; empty or at least three vertices.
    pub roi_points: Vec<NormPoint>,
    pub tripwire: Option<(NormPoint, NormPoint)>,
}

impl CameraSlotConfig {
    pub fn has_roi(&self) -> bool {
        !self.roi_points.is_empty()
    }
}

// On-disk shape of cameras.json. ROI and tripwire objects are always
// written; a cleared tripwire round-trips as origin endpoints.

#[derive(Debug, Serialize, Deserialize)]
struct CamerasFile {
    cameras: Vec<CameraEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CameraEntry {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: SourceKind,
    source: String,
    enabled: bool,
    #[serde(default)]
    roi: RoiEntry,
    #[serde(default)]
    tripwire: TripwireEntry,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RoiEntry {
    #[serde(default)]
    points: Vec<NormPoint>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TripwireEntry {
    #[serde(default)]
    start: NormPoint,
    #[serde(default)]
    end: NormPoint,
}

impl From<CameraEntry> for CameraSlotConfig {
    fn from(entry: CameraEntry) -> Self {
        // A tripwire with both endpoints at the origin means "not set"
        let tripwire = if entry.tripwire.start.is_near_origin()
            && entry.tripwire.end.is_near_origin()
        {
            None
        } else {
            Some((entry.tripwire.start, entry.tripwire.end))
        };

        Self {
            id: entry.id,
            name: entry.name,
            kind: entry.kind,
            source: entry.source,
            enabled: entry.enabled,
            roi_points: entry.roi.points,
            tripwire,
        }
    }
}

impl From<&CameraSlotConfig> for CameraEntry {
    fn from(config: &CameraSlotConfig) -> Self {
        let (start, end) = config.tripwire.unwrap_or_default();
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            kind: config.kind,
            source: config.source.clone(),
            enabled: config.enabled,
            roi: RoiEntry {
                points: config.roi_points.clone(),
            },
            tripwire: TripwireEntry { start, end },
        }
    }
}

/// Load camera slot configs, keeping disabled entries so slot indices stay
/// stable. At most four slots are read.
pub fn load_camera_configs<P: AsRef<Path>>(path: P) -> Result<Vec<CameraSlotConfig>> {
    let data = fs::read_to_string(path.as_ref())?;
    let file: CamerasFile = serde_json::from_str(&data)?;

    let configs: Vec<CameraSlotConfig> = file
        .cameras
        .into_iter()
        .take(MAX_CAMERA_SLOTS)
        .map(CameraSlotConfig::from)
        .collect();

    debug!(
        "Loaded {} camera configs from {}",
        configs.len(),
        path.as_ref().display()
    );
    Ok(configs)
}

/// Write the whole configuration, replacing the file atomically via a
/// temporary sibling and rename.
pub fn save_camera_configs<P: AsRef<Path>>(path: P, configs: &[CameraSlotConfig]) -> Result<()> {
    let path = path.as_ref();
    let file = CamerasFile {
        cameras: configs.iter().map(CameraEntry::from).collect(),
    };

    let json = serde_json::to_string_pretty(&file)?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;

    debug!("Configuration saved to {}", path.display());
    Ok(())
}
