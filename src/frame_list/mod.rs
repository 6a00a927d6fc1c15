//! Ordered, owning collection of tracked frames with a configurable
//! admission pipeline and collection-level string metadata.

mod validation;

pub use validation::{InvalidFrameAction, ValidationConfig, ValidationRequirements};

use std::collections::HashMap;

use anyhow::{bail, Result};
use nalgebra::Matrix4;

use crate::math;
use crate::tracked_frame::TrackedFrame;
use crate::transform_name::TransformName;

const DEFAULT_FRAME_TRANSFORM_NAME_FIELD: &str = "DefaultFrameTransformName";
const GLOBAL_OFFSET_FIELD: &str = "Offset";
const GLOBAL_TRANSFORM_MATRIX_FIELD: &str = "TransformMatrix";

#[derive(Debug, Clone)]
pub struct TrackedFrameList {
    frames: Vec<TrackedFrame>,
    custom_fields: HashMap<String, String>,
    pub validation: ValidationConfig,
}

impl Default for TrackedFrameList {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackedFrameList {
    pub fn new() -> Self {
        let mut custom_fields = HashMap::new();
        custom_fields.insert(
            DEFAULT_FRAME_TRANSFORM_NAME_FIELD.to_string(),
            "ToolToTrackerTransform".to_string(),
        );
        custom_fields.insert("UltrasoundImageOrientation".to_string(), "MF".to_string());
        Self {
            frames: Vec::new(),
            custom_fields,
            validation: ValidationConfig::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Read access starts at frame number 0.
    pub fn frame(&self, frame_number: usize) -> Option<&TrackedFrame> {
        if frame_number >= self.frames.len() {
            log::error!("Requested a non-existing tracked frame (frame number: {frame_number})");
            return None;
        }
        Some(&self.frames[frame_number])
    }

    pub fn frame_mut(&mut self, frame_number: usize) -> Option<&mut TrackedFrame> {
        if frame_number >= self.frames.len() {
            log::error!("Requested a non-existing tracked frame (frame number: {frame_number})");
            return None;
        }
        Some(&mut self.frames[frame_number])
    }

    /// Accepted frames in acquisition order.
    pub fn frames(&self) -> &[TrackedFrame] {
        &self.frames
    }

    /// Removal rejects frame number 0, a long-standing quirk kept on
    /// purpose, as well as any number past the end of the list.
    pub fn remove_frame(&mut self, frame_number: usize) -> Result<()> {
        if frame_number == 0 || frame_number >= self.frames.len() {
            log::warn!(
                "Failed to remove tracked frame from list - invalid frame number: {frame_number}"
            );
            bail!("invalid frame number: {frame_number}");
        }
        self.frames.remove(frame_number);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Validate `frame` against the configured criteria and, depending on
    /// the outcome and `action`, deep-copy it into the list. The producer's
    /// instance is never retained.
    pub fn add_frame(&mut self, frame: &TrackedFrame, action: InvalidFrameAction) -> Result<()> {
        let is_valid = self.validation.validate(&self.frames, frame);
        if !is_valid {
            match action {
                InvalidFrameAction::AddInvalidFrameAndReportError => {
                    log::error!("A similar frame is already found in the tracked frame list, but the invalid frame was added to the list");
                    self.frames.push(frame.clone());
                    bail!("invalid frame added to the tracked frame list");
                }
                InvalidFrameAction::AddInvalidFrame => {
                    log::debug!("A similar frame is already found in the tracked frame list, but the invalid frame was added to the list");
                }
                InvalidFrameAction::SkipInvalidFrameAndReportError => {
                    log::error!("A similar frame is already found in the tracked frame list, invalid frame skipped");
                    bail!("invalid frame skipped");
                }
                InvalidFrameAction::SkipInvalidFrame => {
                    log::debug!("A similar frame is already found in the tracked frame list, invalid frame skipped");
                    return Ok(());
                }
            }
        }

        self.frames.push(frame.clone());
        Ok(())
    }

    /// Appends every frame of `source` using the default policy. See
    /// [`TrackedFrameList::add_all_with_action`].
    pub fn add_all(&mut self, source: &TrackedFrameList) -> Result<()> {
        self.add_all_with_action(source, InvalidFrameAction::default())
    }

    /// Appends every frame of `source`, continuing past individual
    /// failures. Reports failure if any sub-add failed; frames accepted
    /// along the way stay accepted.
    pub fn add_all_with_action(
        &mut self,
        source: &TrackedFrameList,
        action: InvalidFrameAction,
    ) -> Result<()> {
        let mut failed = 0usize;
        for frame in source.frames() {
            if self.add_frame(frame, action).is_err() {
                log::error!("Failed to add tracked frame to the list");
                failed += 1;
            }
        }
        if failed > 0 {
            bail!("failed to add {failed} tracked frame(s) to the list");
        }
        Ok(())
    }

    /// Bit depth of the stored images, taken from the first frame.
    pub fn bits_per_pixel(&self) -> u32 {
        match self.frames.first() {
            Some(frame) => frame.bits_per_pixel(),
            None => {
                log::warn!("Unable to get bits per pixel: there is no frame in the tracked frame list");
                0
            }
        }
    }

    pub fn default_frame_transform_name(&self) -> TransformName {
        let value = self.custom_string(DEFAULT_FRAME_TRANSFORM_NAME_FIELD);
        match value.unwrap_or_default().parse() {
            Ok(name) => name,
            Err(_) => {
                log::warn!("Default frame transform name is not valid: {value:?}");
                TransformName::default()
            }
        }
    }

    pub fn set_default_frame_transform_name(&mut self, name: &TransformName) -> Result<()> {
        let resolved = name.resolve().map_err(|err| {
            log::error!(
                "Failed to set default frame transform name - name is invalid (from: '{}', to: '{}')",
                name.from_frame(),
                name.to_frame()
            );
            err
        })?;
        self.custom_fields
            .insert(DEFAULT_FRAME_TRANSFORM_NAME_FIELD.to_string(), resolved);
        Ok(())
    }

    pub fn custom_string(&self, field_name: &str) -> Option<&str> {
        self.custom_fields.get(field_name).map(String::as_str)
    }

    /// `None` removes the field; deletion by unset is a normal operation,
    /// not an error.
    pub fn set_custom_string(&mut self, field_name: &str, value: Option<&str>) -> Result<()> {
        if field_name.is_empty() {
            log::error!("Failed to set custom string: field name is empty");
            bail!("field name is empty");
        }
        match value {
            Some(value) => {
                self.custom_fields
                    .insert(field_name.to_string(), value.to_string());
            }
            None => {
                self.custom_fields.remove(field_name);
            }
        }
        Ok(())
    }

    pub fn custom_field_names(&self) -> Vec<String> {
        self.custom_fields.keys().cloned().collect()
    }

    /// Read a 16-number transform field into a caller-seeded buffer, with
    /// the same early-stop semantics as the per-frame accessor.
    pub fn custom_transform(&self, field_name: &str, elements: &mut [f64; 16]) -> Result<()> {
        if field_name.is_empty() {
            log::error!("Invalid frame transform name");
            bail!("field name is empty");
        }
        let Some(value) = self.custom_string(field_name) else {
            log::error!("Cannot find frame transform: {field_name}");
            bail!("transform field '{field_name}' is not defined");
        };
        math::parse_elements(value, elements);
        Ok(())
    }

    /// Identity-seeded variant of [`TrackedFrameList::custom_transform`].
    pub fn custom_transform_matrix(&self, field_name: &str) -> Result<Matrix4<f64>> {
        let mut elements = math::matrix_to_row_major(&Matrix4::identity());
        self.custom_transform(field_name, &mut elements)?;
        Ok(math::matrix_from_row_major(&elements))
    }

    pub fn set_custom_transform(&mut self, field_name: &str, matrix: &Matrix4<f64>) -> Result<()> {
        self.set_custom_transform_elements(field_name, &math::matrix_to_row_major(matrix))
    }

    pub fn set_custom_transform_elements(
        &mut self,
        field_name: &str,
        elements: &[f64; 16],
    ) -> Result<()> {
        self.set_custom_string(field_name, Some(&math::encode_elements(elements)))
    }

    /// Reassemble the collection-wide transform from its two sub-fields:
    /// `"Offset"` (3 numbers, translation) and `"TransformMatrix"`
    /// (9 numbers, row-major 3x3 block). The untouched fourth row and
    /// column keep their identity values.
    pub fn global_transform(&self) -> Result<Matrix4<f64>> {
        let Some(offset_value) = self.custom_string(GLOBAL_OFFSET_FIELD) else {
            log::error!("Cannot determine global transform, Offset is undefined");
            bail!("Offset field is undefined");
        };
        let Some(matrix_value) = self.custom_string(GLOBAL_TRANSFORM_MATRIX_FIELD) else {
            log::error!("Cannot determine global transform, TransformMatrix is undefined");
            bail!("TransformMatrix field is undefined");
        };

        let offset = parse_exact::<3>(offset_value, GLOBAL_OFFSET_FIELD)?;
        let block = parse_exact::<9>(matrix_value, GLOBAL_TRANSFORM_MATRIX_FIELD)?;

        let mut global = Matrix4::identity();
        global[(0, 3)] = offset[0];
        global[(1, 3)] = offset[1];
        global[(2, 3)] = offset[2];
        for row in 0..3 {
            for col in 0..3 {
                global[(row, col)] = block[row * 3 + col];
            }
        }
        Ok(global)
    }

    pub fn set_global_transform(&mut self, global: &Matrix4<f64>) -> Result<()> {
        let offset = format!(
            "{} {} {}",
            global[(0, 3)],
            global[(1, 3)],
            global[(2, 3)]
        );
        self.set_custom_string(GLOBAL_OFFSET_FIELD, Some(&offset))?;

        let block = (0..3)
            .flat_map(|row| (0..3).map(move |col| global[(row, col)].to_string()))
            .collect::<Vec<_>>()
            .join(" ");
        self.set_custom_string(GLOBAL_TRANSFORM_MATRIX_FIELD, Some(&block))?;

        Ok(())
    }
}

fn parse_exact<const N: usize>(value: &str, field_name: &str) -> Result<[f64; N]> {
    let mut numbers = [0.0; N];
    let mut count = 0;
    for token in value.split_whitespace() {
        if count == N {
            break;
        }
        match token.parse() {
            Ok(number) => {
                numbers[count] = number;
                count += 1;
            }
            Err(_) => break,
        }
    }
    if count < N {
        log::error!("Not enough elements in the {field_name} field (expected {N}, found {count})");
        bail!("not enough elements in the {field_name} field");
    }
    Ok(numbers)
}
