//! Read-only projections of `SessionState`. Nothing here mutates.

use fitcheck_contracts::catalog::{pose_index, POSE_INSTRUCTIONS};

use super::state::SessionState;

const NEUTRAL_SCENE: &str = "a neutral studio background";
const UPLOADED_SCENE: &str = "a custom uploaded scene";
pub(crate) const CUSTOM_UPLOAD_PREFIX: &str = "custom-upload";

pub fn current_pose_label(state: &SessionState) -> &'static str {
    POSE_INSTRUCTIONS[state.current_pose_index % POSE_INSTRUCTIONS.len()]
}

/// The live editing head before overrides: the current layer's image for
/// the current pose, any image of that layer, or the bare model.
pub fn base_display_image(state: &SessionState) -> Option<&str> {
    let Some(layer) = state.history.layer_at(state.current_outfit_index) else {
        return state.model_image.as_deref();
    };
    layer
        .pose_image(current_pose_label(state))
        .or_else(|| layer.any_pose_image())
        .or(state.model_image.as_deref())
}

/// Gallery selection, then background, then the base image.
pub fn display_image(state: &SessionState) -> Option<&str> {
    state
        .gallery_selection
        .as_deref()
        .or(state.background_image.as_deref())
        .or_else(|| base_display_image(state))
}

/// Pose labels rendered so far for the current layer, in render order.
pub fn available_pose_labels(state: &SessionState) -> Vec<&str> {
    state
        .history
        .layer_at(state.current_outfit_index)
        .map(|layer| layer.pose_labels())
        .unwrap_or_default()
}

pub fn active_garment_ids(state: &SessionState) -> Vec<&str> {
    state
        .history
        .active_slice(state.current_outfit_index)
        .iter()
        .filter_map(|layer| layer.garment_id())
        .collect()
}

/// Garment names worn on top of the base model, comma separated.
pub fn outfit_description(state: &SessionState) -> String {
    state
        .history
        .active_slice(state.current_outfit_index)
        .iter()
        .skip(1)
        .filter_map(|layer| layer.garment.as_ref().map(|garment| garment.name.as_str()))
        .collect::<Vec<&str>>()
        .join(", ")
}

pub fn scene_description(state: &SessionState) -> String {
    match state.background_id.as_deref() {
        Some(id) if id.starts_with(CUSTOM_UPLOAD_PREFIX) => UPLOADED_SCENE.to_string(),
        Some(id) if !id.is_empty() => id.to_string(),
        _ => NEUTRAL_SCENE.to_string(),
    }
}

/// Target of "previous pose": cycles through rendered poses only. `None`
/// when fewer than two poses exist.
pub fn previous_pose_index(state: &SessionState) -> Option<usize> {
    let available = available_pose_labels(state);
    if available.len() <= 1 {
        return None;
    }
    let total = POSE_INSTRUCTIONS.len();
    let current = state.current_pose_index % total;
    let Some(position) = available
        .iter()
        .position(|label| *label == current_pose_label(state))
    else {
        return Some((current + total - 1) % total);
    };
    let previous = available[(position + available.len() - 1) % available.len()];
    pose_index(previous)
}

/// Target of "next pose": the next rendered pose, or the next catalog pose
/// once the rendered ones run out.
pub fn next_pose_index(state: &SessionState) -> usize {
    let total = POSE_INSTRUCTIONS.len();
    let current = state.current_pose_index % total;
    let fallback = (current + 1) % total;
    let available = available_pose_labels(state);
    let Some(position) = available
        .iter()
        .position(|label| *label == current_pose_label(state))
    else {
        return fallback;
    };
    available
        .get(position + 1)
        .and_then(|label| pose_index(label))
        .unwrap_or(fallback)
}
