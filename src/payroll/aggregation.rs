use std::collections::HashMap;
use std::hash::Hash;

use crate::error::AppError;
use crate::model::payroll::{AggregatedPayrollGroup, PayrollFigures, RawPayrollRecord};

/// Folds keyed units into one accumulator per distinct key. The first unit
/// seen for a key becomes the accumulator; later ones are handed to `merge`,
/// and the first merge error aborts the fold.
/// Output keeps first-encounter order so equal input yields equal output.
pub fn fold_by_key<K, T, E>(
    units: impl IntoIterator<Item = (K, T)>,
    mut merge: impl FnMut(&mut T, T) -> Result<(), E>,
) -> Result<Vec<(K, T)>, E>
where
    K: Eq + Hash + Clone,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut folded: Vec<(K, T)> = Vec::new();

    for (key, unit) in units {
        match index.get(&key) {
            Some(&slot) => merge(&mut folded[slot].1, unit)?,
            None => {
                index.insert(key.clone(), folded.len());
                folded.push((key, unit));
            }
        }
    }
    Ok(folded)
}

/// One group per `(employee, payment status)` pair present in `records`.
/// An employee with no records contributes no group.
pub fn aggregate(records: &[RawPayrollRecord]) -> Result<Vec<AggregatedPayrollGroup>, AppError> {
    let units = records
        .iter()
        .map(|record| {
            Ok((
                record.group_key(),
                (record.identity.clone(), PayrollFigures::seed(record)?),
            ))
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let groups = fold_by_key(units, |(_, acc), (_, next)| acc.absorb(&next))?
        .into_iter()
        .map(|(key, (identity, figures))| AggregatedPayrollGroup {
            key,
            identity,
            period_label: figures.period_label(),
            figures,
        })
        .collect();
    Ok(groups)
}
