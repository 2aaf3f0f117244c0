//! Step numbering and the per-session table that maps image steps to groups.

use rand::{seq::SliceRandom, Rng};
use shared::{
    domain::{GroupKey, Side, Step, GROUP_COUNT},
    protocol::SessionPlan,
};

pub const TOTAL_STEPS: i32 = 38;
pub const WELCOME_STEP: Step = Step(0);
pub const INTRO_STEP: Step = Step(1);
pub const NAME_STEP: Step = Step(2);
pub const EMAIL_STEP: Step = Step(3);
pub const AID_OPTIONS_STEP: Step = Step(4);
pub const AID_CHOICE_STEP: Step = Step(5);
pub const MOBILITY_AID_STEP: Step = Step(6);
pub const IMAGE_STEP: Step = Step(9);
pub const STEPS_PER_GROUP: i32 = 3;
pub const RANK_STEP: Step = Step(36);
pub const CONTINUE_STEP: Step = Step(37);
pub const FINAL_STEP: Step = Step(TOTAL_STEPS);
/// A break is offered before every third image block.
pub const BREAK_EVERY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Selection,
    Comparison(Side),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSlot {
    pub block: usize,
    pub group: GroupKey,
    pub phase: Phase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Welcome,
    Intro,
    Name,
    Email,
    MobilityAidOptions,
    MobilityAidChoice,
    SidewalkBarriers,
    InstructionsOne,
    InstructionsTwo,
    ImageSelection { block: usize, group: GroupKey },
    ImageComparison { block: usize, group: GroupKey, side: Side },
    Rank,
    Continue,
    Ending,
}

/// What a step turns into once the current answers are taken into account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Show(Screen),
    Redirect(Step),
}

/// Lookup table from step number to image block, built once per plan.
#[derive(Debug, Clone)]
pub struct StepLayout {
    plan: SessionPlan,
    slots: [Option<BlockSlot>; TOTAL_STEPS as usize + 1],
}

impl StepLayout {
    pub fn new(plan: SessionPlan) -> Self {
        let mut slots = [None; TOTAL_STEPS as usize + 1];
        for (block, group) in plan.group_order.iter().copied().enumerate() {
            let base = block_base(block) as usize;
            slots[base] = Some(BlockSlot {
                block,
                group,
                phase: Phase::Selection,
            });
            slots[base + 1] = Some(BlockSlot {
                block,
                group,
                phase: Phase::Comparison(Side::A),
            });
            slots[base + 2] = Some(BlockSlot {
                block,
                group,
                phase: Phase::Comparison(Side::B),
            });
        }
        Self { plan, slots }
    }

    pub fn plan(&self) -> &SessionPlan {
        &self.plan
    }

    pub fn slot(&self, step: Step) -> Option<BlockSlot> {
        usize::try_from(step.0)
            .ok()
            .and_then(|index| self.slots.get(index).copied().flatten())
    }

    pub fn group_at(&self, block: usize) -> Option<GroupKey> {
        self.plan.group_order.get(block).copied()
    }

    pub fn block_of(&self, group: GroupKey) -> Option<usize> {
        self.plan.group_order.iter().position(|g| *g == group)
    }

    pub fn selection_step(&self, block: usize) -> Step {
        Step(block_base(block))
    }

    pub fn comparison_step(&self, block: usize, side: Side) -> Step {
        match side {
            Side::A => Step(block_base(block) + 1),
            Side::B => Step(block_base(block) + 2),
        }
    }

    /// First step after the block: the next selection step, or the ranking
    /// question after the last block.
    pub fn after_block(&self, block: usize) -> Step {
        Step(block_base(block + 1))
    }

    /// Block a stored step points into. Steps before the image blocks map to
    /// the first block; steps after them map past the last one.
    pub fn block_for_resume(&self, step: Step) -> usize {
        if step < IMAGE_STEP {
            return 0;
        }
        let offset = (step.0 - IMAGE_STEP.0) / STEPS_PER_GROUP;
        (offset as usize).min(GROUP_COUNT)
    }
}

fn block_base(block: usize) -> i32 {
    IMAGE_STEP.0 + STEPS_PER_GROUP * block as i32
}

/// Screens that do not depend on answers or the group layout.
pub fn fixed_screen(step: Step) -> Option<Screen> {
    let screen = match step.0 {
        1 => Screen::Intro,
        2 => Screen::Name,
        3 => Screen::Email,
        4 => Screen::MobilityAidOptions,
        5 => Screen::MobilityAidChoice,
        6 => Screen::SidewalkBarriers,
        7 => Screen::InstructionsOne,
        8 => Screen::InstructionsTwo,
        36 => Screen::Rank,
        37 => Screen::Continue,
        38 => Screen::Ending,
        _ => return None,
    };
    Some(screen)
}

pub fn shuffled_plan<R: Rng + ?Sized>(rng: &mut R) -> SessionPlan {
    let mut group_order = GroupKey::ALL;
    group_order.shuffle(rng);
    SessionPlan {
        group_order,
        image_seed: rng.gen(),
    }
}

#[cfg(test)]
#[path = "tests/layout_tests.rs"]
mod tests;
