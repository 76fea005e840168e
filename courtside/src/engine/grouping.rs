//! Group allocation by seed.
//!
//! Teams are sorted by seed and dealt into groups one at a time, so seeds
//! 1, 2, 3 land in different groups before any group receives a second team.

use super::{EngineError, EngineResult, Participant, seed_order};
use crate::tournament::models::GroupSizing;

/// Letter label for a zero-based group index: A..Z, then AA, AB, ...
pub fn group_label(index: usize) -> String {
    let mut label = String::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        label.insert(0, char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    label
}

/// Number of groups a policy yields for `team_count` teams (0 for no grouping)
pub fn group_count(sizing: GroupSizing, team_count: usize) -> EngineResult<usize> {
    match sizing {
        GroupSizing::NoGrouping => Ok(0),
        GroupSizing::GroupCount(0) | GroupSizing::TeamsPerGroup(0) => {
            Err(EngineError::InvalidGroupSize)
        }
        GroupSizing::GroupCount(groups) => Ok((groups as usize).min(team_count.max(1))),
        GroupSizing::TeamsPerGroup(per_group) => {
            Ok(team_count.div_ceil(per_group as usize).max(1))
        }
    }
}

/// Assign group labels to participants.
///
/// Returns the participants in seed order with `group` filled in. With
/// [`GroupSizing::NoGrouping`] every label is empty.
pub fn allocate_groups(
    participants: &[Participant],
    sizing: GroupSizing,
) -> EngineResult<Vec<Participant>> {
    let groups = group_count(sizing, participants.len())?;

    Ok(seed_order(participants)
        .into_iter()
        .enumerate()
        .map(|(position, p)| Participant {
            team_id: p.team_id,
            seed: p.seed,
            group: if groups == 0 {
                String::new()
            } else {
                group_label(position % groups)
            },
        })
        .collect())
}
