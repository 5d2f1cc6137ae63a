/// Camera/pose instructions shared by every outfit layer. Pose indices in
/// session state always address this list.
pub const POSE_INSTRUCTIONS: [&str; 6] = [
    "Full frontal view, hands on hips",
    "Slightly turned, 3/4 view",
    "Side profile view",
    "Jumping in the air, mid-action shot",
    "Walking towards camera",
    "Leaning against a wall",
];

pub fn pose_label(index: usize) -> Option<&'static str> {
    POSE_INSTRUCTIONS.get(index).copied()
}

pub fn pose_index(label: &str) -> Option<usize> {
    POSE_INSTRUCTIONS.iter().position(|pose| *pose == label)
}
