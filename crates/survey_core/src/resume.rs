use shared::{
    domain::{Side, Step, GROUP_COUNT},
    protocol::{ImageSelections, LogRecord},
};

use crate::layout::{StepLayout, MOBILITY_AID_STEP};

/// First block, scanning forward from `from` in plan order, whose group is
/// missing images on either side. The plan is the order stored with the
/// session, so this is the order the participant actually saw the blocks in.
pub fn first_incomplete_block(
    layout: &StepLayout,
    selections: &ImageSelections,
    from: usize,
) -> Option<usize> {
    (from..GROUP_COUNT).find(|block| {
        layout.group_at(*block).is_some_and(|group| {
            !selections.is_side_complete(group, Side::A) || !selections.is_side_complete(group, Side::B)
        })
    })
}

/// Step a stored record resumes on.
pub fn resume_step(layout: &StepLayout, record: &LogRecord) -> Step {
    if !record.answers.is_group_continue {
        return MOBILITY_AID_STEP;
    }

    let from = layout.block_for_resume(record.current_step);
    match first_incomplete_block(layout, &record.image_selections, from) {
        Some(block) => layout.selection_step(block),
        None => MOBILITY_AID_STEP,
    }
}
