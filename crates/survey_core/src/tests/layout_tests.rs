use super::*;
use rand::{rngs::StdRng, SeedableRng};

fn group(index: usize) -> GroupKey {
    GroupKey::new(index).unwrap()
}

#[test]
fn canonical_layout_maps_blocks_in_threes() {
    let layout = StepLayout::new(SessionPlan::canonical());

    assert_eq!(
        layout.slot(Step(9)),
        Some(BlockSlot {
            block: 0,
            group: group(0),
            phase: Phase::Selection
        })
    );
    assert_eq!(
        layout.slot(Step(10)).map(|slot| slot.phase),
        Some(Phase::Comparison(Side::A))
    );
    assert_eq!(
        layout.slot(Step(11)).map(|slot| slot.phase),
        Some(Phase::Comparison(Side::B))
    );
    assert_eq!(
        layout.slot(Step(35)),
        Some(BlockSlot {
            block: 8,
            group: group(8),
            phase: Phase::Comparison(Side::B)
        })
    );
    assert_eq!(layout.slot(Step(8)), None);
    assert_eq!(layout.slot(Step(36)), None);
    assert_eq!(layout.slot(Step(-4)), None);
    assert_eq!(layout.slot(Step(500)), None);
}

#[test]
fn every_image_step_belongs_to_exactly_one_block() {
    let mut rng = StdRng::seed_from_u64(11);
    let layout = StepLayout::new(shuffled_plan(&mut rng));

    for step in IMAGE_STEP.0..RANK_STEP.0 {
        let slot = layout.slot(Step(step)).expect("image step has a slot");
        assert_eq!(layout.group_at(slot.block), Some(slot.group));
        assert_eq!(layout.block_of(slot.group), Some(slot.block));
    }
}

#[test]
fn shuffled_plan_is_a_permutation() {
    let mut rng = StdRng::seed_from_u64(3);
    let plan = shuffled_plan(&mut rng);

    let mut order = plan.group_order.to_vec();
    order.sort();
    assert_eq!(order, GroupKey::ALL.to_vec());
}

#[test]
fn shuffled_layout_follows_plan_order() {
    let mut order = GroupKey::ALL;
    order.reverse();
    let layout = StepLayout::new(SessionPlan {
        group_order: order,
        image_seed: 5,
    });

    assert_eq!(layout.slot(Step(9)).map(|slot| slot.group), Some(group(8)));
    assert_eq!(layout.slot(Step(33)).map(|slot| slot.group), Some(group(0)));
    assert_eq!(layout.block_of(group(8)), Some(0));
}

#[test]
fn block_navigation_steps() {
    let layout = StepLayout::new(SessionPlan::canonical());

    assert_eq!(layout.selection_step(0), Step(9));
    assert_eq!(layout.selection_step(4), Step(21));
    assert_eq!(layout.comparison_step(4, Side::A), Step(22));
    assert_eq!(layout.comparison_step(4, Side::B), Step(23));
    assert_eq!(layout.after_block(4), Step(24));
    assert_eq!(layout.after_block(8), RANK_STEP);
}

#[test]
fn resume_block_for_stored_step() {
    let layout = StepLayout::new(SessionPlan::canonical());

    assert_eq!(layout.block_for_resume(Step(0)), 0);
    assert_eq!(layout.block_for_resume(Step(6)), 0);
    assert_eq!(layout.block_for_resume(Step(9)), 0);
    assert_eq!(layout.block_for_resume(Step(11)), 0);
    assert_eq!(layout.block_for_resume(Step(12)), 1);
    assert_eq!(layout.block_for_resume(Step(35)), 8);
    assert_eq!(layout.block_for_resume(Step(36)), GROUP_COUNT);
    assert_eq!(layout.block_for_resume(Step(90)), GROUP_COUNT);
}

#[test]
fn fixed_screens_cover_non_image_steps() {
    assert_eq!(fixed_screen(Step(1)), Some(Screen::Intro));
    assert_eq!(fixed_screen(Step(6)), Some(Screen::SidewalkBarriers));
    assert_eq!(fixed_screen(Step(36)), Some(Screen::Rank));
    assert_eq!(fixed_screen(Step(38)), Some(Screen::Ending));
    assert_eq!(fixed_screen(Step(0)), None);
    assert_eq!(fixed_screen(Step(15)), None);
    assert_eq!(fixed_screen(Step(39)), None);
}
