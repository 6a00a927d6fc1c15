//! Admission criteria for incoming tracked frames.
//!
//! Each criterion is an independent toggle; an empty set means every frame
//! is valid. Enabled criteria run in a fixed order and validation stops at
//! the first failure. The change-detection criteria look back over a
//! trailing window of already-accepted frames, the speed criterion only at
//! the most recent one.

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::math;
use crate::tracked_frame::{TrackedFrame, TrackerStatus};
use crate::transform_name::TransformName;

/// Frames closer in time than this cannot yield a reliable speed estimate.
const MIN_SPEED_ELAPSED_SEC: f64 = 1e-4;

/// Stepper encoder fields read by the changed-encoder-position criterion.
const PROBE_POSITION_FIELD: &str = "ProbePosition";
const PROBE_ROTATION_FIELD: &str = "ProbeRotation";
const TEMPLATE_POSITION_FIELD: &str = "TemplatePosition";

/// What to do with a frame that fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidFrameAction {
    /// Append anyway, log at error level, report failure.
    #[default]
    AddInvalidFrameAndReportError,
    /// Append anyway, log at debug level, report success.
    AddInvalidFrame,
    /// Skip the frame, log at error level, report failure.
    SkipInvalidFrameAndReportError,
    /// Skip the frame, log at debug level, report success.
    SkipInvalidFrame,
}

/// Independently toggled admission criteria.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRequirements {
    pub unique_timestamp: bool,
    pub tracking_ok: bool,
    pub changed_transform: bool,
    pub changed_encoder_position: bool,
    pub speed_below_threshold: bool,
}

impl ValidationRequirements {
    pub fn any(&self) -> bool {
        self.unique_timestamp
            || self.tracking_ok
            || self.changed_transform
            || self.changed_encoder_position
            || self.speed_below_threshold
    }
}

/// Admission pipeline configuration. Set up once before ingestion starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub requirements: ValidationRequirements,
    /// Transform checked by the status, changed-transform and speed
    /// criteria.
    pub transform_name: TransformName,
    pub min_required_translation_difference_mm: f64,
    pub min_required_angle_difference_deg: f64,
    /// Zero disables the translational speed check.
    pub max_allowed_translation_speed_mm_per_sec: f64,
    /// Zero disables the rotational speed check.
    pub max_allowed_rotation_speed_deg_per_sec: f64,
    /// Trailing-window size for the change-detection criteria.
    pub number_of_unique_frames: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            requirements: ValidationRequirements::default(),
            transform_name: TransformName::default(),
            min_required_translation_difference_mm: 0.0,
            min_required_angle_difference_deg: 0.0,
            max_allowed_translation_speed_mm_per_sec: 0.0,
            max_allowed_rotation_speed_deg_per_sec: 0.0,
            number_of_unique_frames: 5,
        }
    }
}

impl ValidationConfig {
    /// Run every enabled criterion against the already-accepted frames, in
    /// fixed order, stopping at the first failure.
    pub fn validate(&self, frames: &[TrackedFrame], candidate: &TrackedFrame) -> bool {
        if !self.requirements.any() {
            return true;
        }

        if self.requirements.unique_timestamp && !self.validate_timestamp(frames, candidate) {
            log::debug!("Validation failed - timestamp is not unique");
            return false;
        }
        if self.requirements.tracking_ok && !self.validate_status(candidate) {
            log::debug!("Validation failed - tracking status is not OK");
            return false;
        }
        if self.requirements.changed_transform && !self.validate_transform(frames, candidate) {
            log::debug!("Validation failed - transform has not changed");
            return false;
        }
        if self.requirements.changed_encoder_position
            && !self.validate_encoder_position(frames, candidate)
        {
            log::debug!("Validation failed - encoder position has not changed");
            return false;
        }
        if self.requirements.speed_below_threshold && !self.validate_speed(frames, candidate) {
            log::debug!("Validation failed - speed is higher than threshold");
            return false;
        }

        true
    }

    /// Timestamps are compared exactly, without tolerance.
    fn validate_timestamp(&self, frames: &[TrackedFrame], candidate: &TrackedFrame) -> bool {
        !frames
            .iter()
            .any(|frame| frame.timestamp == candidate.timestamp)
    }

    /// Reads the `"<name>Status"` field. The suffix differs from the
    /// per-transform `"...TransformStatus"` convention and both are kept
    /// verbatim; unifying them would change which field gates admission.
    fn validate_status(&self, candidate: &TrackedFrame) -> bool {
        let resolved = match self.transform_name.resolve() {
            Ok(resolved) => resolved,
            Err(_) => {
                log::warn!("Failed to validate tracking status - the validation transform name is invalid");
                return false;
            }
        };

        let status_field = format!("{resolved}Status");
        let status = TrackerStatus::from_field(candidate.custom_field(&status_field));
        if status != TrackerStatus::Ok {
            log::debug!("Tracking status {status} is invalid for tool {resolved}");
            return false;
        }
        true
    }

    fn validate_transform(&self, frames: &[TrackedFrame], candidate: &TrackedFrame) -> bool {
        let Ok(candidate_transform) = candidate.transform_matrix(&self.transform_name) else {
            // nothing to compare against: the candidate counts as changed
            return true;
        };

        !self.trailing_window(frames).iter().any(|frame| {
            let Ok(window_transform) = frame.transform_matrix(&self.transform_name) else {
                return false;
            };
            self.is_near_duplicate(&candidate_transform, &window_transform)
        })
    }

    fn validate_encoder_position(&self, frames: &[TrackedFrame], candidate: &TrackedFrame) -> bool {
        let Some(candidate_encoder) = StepperEncoderValues::from_frame(candidate) else {
            return true;
        };

        !self.trailing_window(frames).iter().any(|frame| {
            let Some(frame_encoder) = StepperEncoderValues::from_frame(frame) else {
                return false;
            };
            (candidate_encoder.probe_position - frame_encoder.probe_position).abs()
                < self.min_required_translation_difference_mm
                && (candidate_encoder.probe_rotation - frame_encoder.probe_rotation).abs()
                    < self.min_required_angle_difference_deg
                && (candidate_encoder.template_position - frame_encoder.template_position).abs()
                    < self.min_required_translation_difference_mm
        })
    }

    /// Compares against the most recently accepted frame only.
    fn validate_speed(&self, frames: &[TrackedFrame], candidate: &TrackedFrame) -> bool {
        let Some(latest) = frames.last() else {
            return true;
        };

        let elapsed_sec = (candidate.timestamp - latest.timestamp).abs();
        if elapsed_sec < MIN_SPEED_ELAPSED_SEC {
            // the frames were acquired almost at the same time; speed
            // cannot be estimated reliably, better to invalidate the frame
            return false;
        }

        let Ok(candidate_transform) = candidate.transform_matrix(&self.transform_name) else {
            log::error!("Unable to get the validation transform of the input frame");
            return false;
        };
        let Ok(latest_transform) = latest.transform_matrix(&self.transform_name) else {
            log::error!("Unable to get the validation transform of the latest frame in the list");
            return false;
        };

        if self.max_allowed_translation_speed_mm_per_sec > 0.0 {
            let speed_mm_per_sec =
                (math::position_difference(&candidate_transform, &latest_transform) / elapsed_sec)
                    .abs();
            if speed_mm_per_sec > self.max_allowed_translation_speed_mm_per_sec {
                log::debug!(
                    "Frame position changed too fast ({speed_mm_per_sec} > {} mm/sec)",
                    self.max_allowed_translation_speed_mm_per_sec
                );
                return false;
            }
        }

        if self.max_allowed_rotation_speed_deg_per_sec > 0.0 {
            let speed_deg_per_sec = (math::orientation_difference_deg(
                &candidate_transform,
                &latest_transform,
            ) / elapsed_sec)
                .abs();
            if speed_deg_per_sec > self.max_allowed_rotation_speed_deg_per_sec {
                log::debug!(
                    "Frame orientation changed too fast ({speed_deg_per_sec} > {} deg/sec)",
                    self.max_allowed_rotation_speed_deg_per_sec
                );
                return false;
            }
        }

        true
    }

    /// The last `number_of_unique_frames` accepted frames, or all of them
    /// when fewer exist. Recomputed per call; never includes the candidate.
    fn trailing_window<'a>(&self, frames: &'a [TrackedFrame]) -> &'a [TrackedFrame] {
        &frames[frames.len().saturating_sub(self.number_of_unique_frames)..]
    }

    /// A near-duplicate falls below both minimum deltas, so a zero
    /// threshold lets every frame through.
    fn is_near_duplicate(&self, a: &Matrix4<f64>, b: &Matrix4<f64>) -> bool {
        math::position_difference(a, b).abs() < self.min_required_translation_difference_mm
            && math::orientation_difference_deg(a, b).abs() < self.min_required_angle_difference_deg
    }
}

struct StepperEncoderValues {
    probe_position: f64,
    probe_rotation: f64,
    template_position: f64,
}

impl StepperEncoderValues {
    fn from_frame(frame: &TrackedFrame) -> Option<Self> {
        Some(Self {
            probe_position: numeric_field(frame, PROBE_POSITION_FIELD)?,
            probe_rotation: numeric_field(frame, PROBE_ROTATION_FIELD)?,
            template_position: numeric_field(frame, TEMPLATE_POSITION_FIELD)?,
        })
    }
}

fn numeric_field(frame: &TrackedFrame, field_name: &str) -> Option<f64> {
    let Some(value) = frame.custom_field(field_name) else {
        log::warn!("Unable to get {field_name} field from tracked frame");
        return None;
    };
    match value.trim().parse() {
        Ok(number) => Some(number),
        Err(_) => {
            log::warn!("Unable to parse {field_name} field value: {value}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ValidationConfig, ValidationRequirements};
    use crate::tracked_frame::TrackedFrame;
    use crate::transform_name::TransformName;
    use nalgebra::{Matrix4, Rotation3, Vector3};

    fn config_with(requirements: ValidationRequirements) -> ValidationConfig {
        ValidationConfig {
            requirements,
            transform_name: TransformName::new("Tool", "Tracker").unwrap(),
            ..ValidationConfig::default()
        }
    }

    fn frame_at(timestamp: f64, translation: [f64; 3]) -> TrackedFrame {
        let mut frame = TrackedFrame::new(timestamp);
        let mut matrix = Matrix4::identity();
        matrix[(0, 3)] = translation[0];
        matrix[(1, 3)] = translation[1];
        matrix[(2, 3)] = translation[2];
        frame
            .set_transform(&TransformName::new("Tool", "Tracker").unwrap(), &matrix)
            .unwrap();
        frame
    }

    #[test]
    fn no_requirements_accepts_everything() {
        let config = config_with(ValidationRequirements::default());
        let accepted = vec![frame_at(1.0, [0.0; 3])];
        assert!(config.validate(&accepted, &frame_at(1.0, [0.0; 3])));
    }

    #[test]
    fn status_criterion_reads_the_status_suffix_field() {
        let config = config_with(ValidationRequirements {
            tracking_ok: true,
            ..Default::default()
        });

        let mut candidate = TrackedFrame::new(0.0);
        assert!(!config.validate(&[], &candidate));

        // the per-transform status convention does not gate admission
        candidate.set_custom_field("ToolToTrackerTransformStatus", "OK");
        assert!(!config.validate(&[], &candidate));

        candidate.set_custom_field("ToolToTrackerStatus", "OK");
        assert!(config.validate(&[], &candidate));

        candidate.set_custom_field("ToolToTrackerStatus", "TR_OUT_OF_VIEW");
        assert!(!config.validate(&[], &candidate));
    }

    #[test]
    fn status_criterion_fails_with_invalid_validation_name() {
        let config = ValidationConfig {
            requirements: ValidationRequirements {
                tracking_ok: true,
                ..Default::default()
            },
            ..ValidationConfig::default()
        };
        assert!(!config.validate(&[], &TrackedFrame::new(0.0)));
    }

    #[test]
    fn changed_transform_rejects_near_duplicates_in_the_window() {
        let mut config = config_with(ValidationRequirements {
            changed_transform: true,
            ..Default::default()
        });
        config.min_required_translation_difference_mm = 5.0;
        config.min_required_angle_difference_deg = 2.0;
        config.number_of_unique_frames = 2;

        let accepted = vec![
            frame_at(1.0, [0.0, 0.0, 0.0]),
            frame_at(2.0, [100.0, 0.0, 0.0]),
            frame_at(3.0, [200.0, 0.0, 0.0]),
        ];

        // near-duplicate of the last window entry
        assert!(!config.validate(&accepted, &frame_at(4.0, [201.0, 0.0, 0.0])));
        // near-duplicate of a frame that has slid out of the window
        assert!(config.validate(&accepted, &frame_at(4.0, [1.0, 0.0, 0.0])));
        // far from every window entry
        assert!(config.validate(&accepted, &frame_at(4.0, [300.0, 0.0, 0.0])));
    }

    #[test]
    fn changed_transform_requires_only_one_threshold_to_differ() {
        let mut config = config_with(ValidationRequirements {
            changed_transform: true,
            ..Default::default()
        });
        config.min_required_translation_difference_mm = 5.0;
        config.min_required_angle_difference_deg = 2.0;

        let accepted = vec![frame_at(1.0, [0.0, 0.0, 0.0])];

        // same position but rotated past the angle threshold
        let mut rotated = TrackedFrame::new(2.0);
        let matrix =
            Rotation3::from_axis_angle(&Vector3::z_axis(), 10f64.to_radians()).to_homogeneous();
        rotated
            .set_transform(&TransformName::new("Tool", "Tracker").unwrap(), &matrix)
            .unwrap();
        assert!(config.validate(&accepted, &rotated));
    }

    #[test]
    fn zero_thresholds_disable_change_detection() {
        let config = config_with(ValidationRequirements {
            changed_transform: true,
            ..Default::default()
        });
        let accepted = vec![frame_at(1.0, [0.0; 3])];
        assert!(config.validate(&accepted, &frame_at(2.0, [0.0; 3])));
    }

    #[test]
    fn changed_encoder_position_compares_stepper_fields() {
        let mut config = config_with(ValidationRequirements {
            changed_encoder_position: true,
            ..Default::default()
        });
        config.min_required_translation_difference_mm = 1.0;
        config.min_required_angle_difference_deg = 1.0;

        let encoder_frame = |t: f64, pos: f64, rot: f64, template: f64| {
            let mut frame = TrackedFrame::new(t);
            frame.set_custom_field("ProbePosition", pos.to_string());
            frame.set_custom_field("ProbeRotation", rot.to_string());
            frame.set_custom_field("TemplatePosition", template.to_string());
            frame
        };

        let accepted = vec![encoder_frame(1.0, 10.0, 5.0, 0.0)];

        assert!(!config.validate(&accepted, &encoder_frame(2.0, 10.1, 5.1, 0.1)));
        assert!(config.validate(&accepted, &encoder_frame(2.0, 20.0, 5.0, 0.0)));
        // frames without encoder fields never suppress a candidate
        assert!(config.validate(&accepted, &frame_at(2.0, [0.0; 3])));
    }

    #[test]
    fn config_serde_round_trip() {
        let mut config = config_with(ValidationRequirements {
            unique_timestamp: true,
            speed_below_threshold: true,
            ..Default::default()
        });
        config.max_allowed_translation_speed_mm_per_sec = 500.0;
        config.number_of_unique_frames = 7;

        let encoded = serde_json::to_string(&config).unwrap();
        let decoded: ValidationConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.requirements, config.requirements);
        assert_eq!(
            decoded.transform_name.resolve().unwrap(),
            "ToolToTracker"
        );
        assert_eq!(decoded.max_allowed_translation_speed_mm_per_sec, 500.0);
        assert_eq!(decoded.number_of_unique_frames, 7);
    }
}
