use crate::alerts::log::{Alert, AlertLog};
use crate::error::{AlertError, Result};
use chrono::Local;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const CSV_HEADER: &str = "ID,Timestamp,Camera Name,Type,Message,Snapshot Path";

/// Timestamps in exports are ISO 8601 without a zone suffix.
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedAlert {
    id: String,
    timestamp: String,
    camera_name: String,
    #[serde(rename = "type")]
    kind: String,
    message: String,
    snapshot_path: String,
    has_image: bool,
}

impl From<&Alert> for ExportedAlert {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.id.clone(),
            timestamp: alert.timestamp.format(ISO_FORMAT).to_string(),
            camera_name: alert.camera_name.clone(),
            kind: alert.kind.as_str().to_string(),
            message: alert.message.clone(),
            snapshot_path: alert.snapshot_path.clone(),
            has_image: alert.has_image(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument {
    alerts: Vec<ExportedAlert>,
    export_time: String,
    total_count: usize,
}

/// Quote a CSV field when it contains a comma, quote or newline, doubling
/// embedded quotes.
fn escape_csv(field: &str) -> String {
    let escaped = field.replace('"', "\"\"");
    if escaped.contains(',') || escaped.contains('"') || escaped.contains('\n') {
        format!("\"{}\"", escaped)
    } else {
        escaped
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| AlertError::ExportWrite {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn write_csv(path: &Path, alerts: &[&Alert]) -> Result<()> {
    ensure_parent_dir(path)?;

    let mut out = String::new();
    out.push_str(CSV_HEADER);
    out.push('\n');

    for alert in alerts {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            escape_csv(&alert.id),
            escape_csv(&alert.timestamp.format(ISO_FORMAT).to_string()),
            escape_csv(&alert.camera_name),
            escape_csv(alert.kind.as_str()),
            escape_csv(&alert.message),
            escape_csv(&alert.snapshot_path),
        ));
    }

    fs::write(path, out).map_err(|e| AlertError::ExportWrite {
        path: path.display().to_string(),
        source: e,
    })?;

    info!("Exported {} alerts to CSV: {}", alerts.len(), path.display());
    Ok(())
}

fn write_json(path: &Path, alerts: &[&Alert]) -> Result<()> {
    ensure_parent_dir(path)?;

    let document = ExportDocument {
        alerts: alerts.iter().map(|a| ExportedAlert::from(*a)).collect(),
        export_time: Local::now().format(ISO_FORMAT).to_string(),
        total_count: alerts.len(),
    };

    let json = serde_json::to_string_pretty(&document)?;
    fs::write(path, json).map_err(|e| AlertError::ExportWrite {
        path: path.display().to_string(),
        source: e,
    })?;

    info!(
        "Exported {} alerts to JSON: {}",
        alerts.len(),
        path.display()
    );
    Ok(())
}

impl AlertLog {
    /// Export every alert to CSV.
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let all: Vec<&Alert> = self.iter().collect();
        write_csv(path.as_ref(), &all)
    }

    /// Export the alerts at the given indices to CSV, in the given order.
    /// Invalid indices are dropped; an empty selection is an error.
    pub fn export_selected_csv<P: AsRef<Path>>(&self, path: P, indices: &[usize]) -> Result<()> {
        let selected = self.select(indices);
        if selected.is_empty() {
            return Err(AlertError::EmptySelection.into());
        }
        write_csv(path.as_ref(), &selected)
    }

    /// Export every alert to JSON.
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let all: Vec<&Alert> = self.iter().collect();
        write_json(path.as_ref(), &all)
    }

    /// Export the alerts at the given indices to JSON, in the given order.
    pub fn export_selected_json<P: AsRef<Path>>(&self, path: P, indices: &[usize]) -> Result<()> {
        let selected = self.select(indices);
        if selected.is_empty() {
            return Err(AlertError::EmptySelection.into());
        }
        write_json(path.as_ref(), &selected)
    }

    /// Write one alert's in-memory snapshot as PNG, then record the path on
    /// the alert and mark it saved.
    pub fn export_snapshot_png<P: AsRef<Path>>(&mut self, index: usize, path: P) -> Result<()> {
        let path = path.as_ref();

        let image = self
            .get(index)
            .ok_or(AlertError::IndexOutOfRange { index })?
            .snapshot_image
            .clone()
            .ok_or(AlertError::NoSnapshotImage { index })?;

        ensure_parent_dir(path)?;

        image
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| AlertError::SnapshotEncode {
                details: e.to_string(),
            })?;

        let alert = self.get_mut(index).expect("index checked above");
        alert.snapshot_path = path.display().to_string();
        alert.message = "Snapshot saved".to_string();
        debug!("Snapshot exported to PNG: {}", path.display());

        Ok(())
    }

    /// Filename suggestion for a snapshot export:
    /// `{camera_with_underscores}_{yyyyMMdd_HHmmss}.png`.
    pub fn suggested_png_filename(&self, index: usize) -> String {
        match self.get(index) {
            Some(alert) => format!(
                "{}_{}.png",
                alert.camera_name.replace(' ', "_"),
                alert.timestamp.format("%Y%m%d_%H%M%S")
            ),
            None => "snapshot.png".to_string(),
        }
    }
}
