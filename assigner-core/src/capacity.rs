use crate::{AssignError, Settings};

/// Split `total` seats over `group_count` groups.
///
/// Every group gets `total / group_count` seats and the first `total % group_count` groups get one
/// more, so the result always sums to `total` and no two groups differ by more than one.
/// e.g. 1000 over 7 groups -> [143, 143, 143, 143, 143, 143, 142]
pub fn compute_capacities(total: i64, group_count: i64) -> Result<Vec<i64>, AssignError> {
    let settings = Settings::new(total, group_count);
    settings.validate()?;

    let base = total / group_count;
    let extra = (total % group_count) as usize;

    Ok((0..settings.groups())
        .map(|index| if index < extra { base + 1 } else { base })
        .collect())
}
