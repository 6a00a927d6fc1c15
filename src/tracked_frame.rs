//! A single timestamped capture unit: image, pose transforms, tracking
//! status flags and free-form metadata.
//!
//! All metadata lives in one string-keyed field map. Two key conventions
//! carry the pose data:
//!
//! - `"<FromToTo>Transform"` holds 16 space-separated numbers, the
//!   row-major 4x4 transform;
//! - `"<FromToTo>TransformStatus"` holds a [`TrackerStatus`] token.
//!
//! A transform field and its status field are independent: a transform may
//! be present while its status says `MISSING`, and a status may exist for
//! a transform that was never written.

use std::collections::HashMap;
use std::fmt::Display;

use anyhow::{bail, Result};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::math;
use crate::transform_name::TransformName;
use crate::video_frame::VideoFrame;

const TRANSFORM_SUFFIX: &str = "Transform";
const TRANSFORM_STATUS_SUFFIX: &str = "TransformStatus";

/// Tool tracking state attached to a transform field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerStatus {
    #[default]
    Ok,
    Missing,
    OutOfView,
    OutOfVolume,
    ReqTimeout,
}

impl TrackerStatus {
    /// Parse a status field value. Tokens are matched as substrings in a
    /// fixed priority order; unrecognized text counts as `OK`, an absent
    /// field as `MISSING`.
    pub fn from_field(value: Option<&str>) -> Self {
        let Some(value) = value else {
            log::error!("Failed to get tracker status: field value is absent");
            return TrackerStatus::Missing;
        };
        if value.contains("OK") {
            TrackerStatus::Ok
        } else if value.contains("MISSING") {
            TrackerStatus::Missing
        } else if value.contains("OUT_OF_VIEW") {
            TrackerStatus::OutOfView
        } else if value.contains("OUT_OF_VOLUME") {
            TrackerStatus::OutOfVolume
        } else if value.contains("REQ_TIMEOUT") {
            TrackerStatus::ReqTimeout
        } else {
            TrackerStatus::Ok
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerStatus::Ok => "OK",
            TrackerStatus::Missing => "MISSING",
            TrackerStatus::OutOfView => "OUT_OF_VIEW",
            TrackerStatus::OutOfVolume => "OUT_OF_VOLUME",
            TrackerStatus::ReqTimeout => "REQ_TIMEOUT",
        }
    }
}

impl Display for TrackerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackedFrame {
    /// Acquisition time in seconds.
    pub timestamp: f64,
    image: VideoFrame,
    fields: HashMap<String, String>,
    /// Segmented fiducial point coordinates in pixels, if any.
    fiducial_points_px: Option<Vec<[f64; 2]>>,
}

impl TrackedFrame {
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    pub fn set_image_data(&mut self, image: VideoFrame) {
        self.image = image;
    }

    pub fn image_data(&self) -> &VideoFrame {
        &self.image
    }

    /// Frame dimensions, always recomputed from the live image.
    pub fn frame_size(&self) -> (u32, u32) {
        self.image.frame_size()
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.image.bytes_per_pixel() * 8
    }

    pub fn set_custom_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Absent fields are distinguishable from empty values.
    pub fn custom_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn is_custom_field_defined(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_transform_defined(&self, name: &TransformName) -> bool {
        match name.resolve() {
            Ok(resolved) => self.fields.contains_key(&(resolved + TRANSFORM_SUFFIX)),
            Err(_) => false,
        }
    }

    /// Read a transform into a caller-seeded buffer. Field data shorter
    /// than 16 numbers fills only the leading elements and leaves the rest
    /// of the buffer untouched.
    pub fn transform(&self, name: &TransformName, elements: &mut [f64; 16]) -> Result<()> {
        let key = self.resolve_name(name, "get transform")? + TRANSFORM_SUFFIX;
        let Some(value) = self.custom_field(&key) else {
            log::error!("Unable to get transform from field: {key}");
            bail!("transform field '{key}' is not defined");
        };
        math::parse_elements(value, elements);
        Ok(())
    }

    /// Identity-seeded variant of [`TrackedFrame::transform`].
    pub fn transform_matrix(&self, name: &TransformName) -> Result<Matrix4<f64>> {
        let mut elements = math::matrix_to_row_major(&Matrix4::identity());
        self.transform(name, &mut elements)?;
        Ok(math::matrix_from_row_major(&elements))
    }

    pub fn set_transform(&mut self, name: &TransformName, matrix: &Matrix4<f64>) -> Result<()> {
        self.set_transform_elements(name, &math::matrix_to_row_major(matrix))
    }

    pub fn set_transform_elements(
        &mut self,
        name: &TransformName,
        elements: &[f64; 16],
    ) -> Result<()> {
        let key = self.resolve_name(name, "set transform")? + TRANSFORM_SUFFIX;
        self.fields.insert(key, math::encode_elements(elements));
        Ok(())
    }

    pub fn transform_status(&self, name: &TransformName) -> Result<TrackerStatus> {
        let key = self.resolve_name(name, "get transform status")? + TRANSFORM_STATUS_SUFFIX;
        let Some(value) = self.custom_field(&key) else {
            log::error!("Unable to get transform status from field: {key}");
            bail!("transform status field '{key}' is not defined");
        };
        Ok(TrackerStatus::from_field(Some(value)))
    }

    /// The raw text is stored as given; callers are expected to use the
    /// [`TrackerStatus`] tokens.
    pub fn set_transform_status(&mut self, name: &TransformName, status: &str) -> Result<()> {
        let key = self.resolve_name(name, "set transform status")? + TRANSFORM_STATUS_SUFFIX;
        self.fields.insert(key, status.to_string());
        Ok(())
    }

    pub fn custom_field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Transform discovery: every field key ending in `"Transform"`.
    /// Status keys end in `"TransformStatus"` and never match. There is no
    /// separate transform index; this scan is the only mechanism.
    pub fn transform_names(&self) -> Vec<TransformName> {
        let mut names = Vec::new();
        for key in self.fields.keys() {
            let Some(stripped) = key.strip_suffix(TRANSFORM_SUFFIX) else {
                continue;
            };
            match stripped.parse::<TransformName>() {
                Ok(name) => names.push(name),
                Err(_) => log::warn!("Skipping transform field with unparseable name: {key}"),
            }
        }
        names
    }

    pub fn set_fiducial_points_px(&mut self, points: Option<Vec<[f64; 2]>>) {
        self.fiducial_points_px = points;
    }

    pub fn fiducial_points_px(&self) -> Option<&[[f64; 2]]> {
        self.fiducial_points_px.as_deref()
    }

    fn resolve_name(&self, name: &TransformName, what: &str) -> Result<String> {
        name.resolve().map_err(|err| {
            log::error!(
                "Unable to {what}: transform name is invalid (from: '{}', to: '{}')",
                name.from_frame(),
                name.to_frame()
            );
            err
        })
    }
}
