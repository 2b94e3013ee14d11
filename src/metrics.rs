use ndarray::ArrayView2;

/// Aggregate balance metrics for per-class example counts.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassSkew {
    /// Examples across all classes.
    pub total: usize,
    /// Number of classes counted, including empty ones.
    pub classes: usize,
    /// Smallest class count.
    pub min: usize,
    /// Largest class count.
    pub max: usize,
    /// Mean count per class.
    pub mean: f64,
    /// Largest class count over the total.
    pub max_share: f64,
    /// Smallest class count over the total.
    pub min_share: f64,
    /// max / min; infinite when a class is empty.
    pub ratio: f64,
    /// Count and share of each class, by class index.
    pub per_class: Vec<ClassShare>,
}

/// One class's share of a batch.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassShare {
    /// Index of the class in the one-hot targets.
    pub class_index: usize,
    /// Examples of this class.
    pub count: usize,
    /// count / total
    pub share: f64,
}

/// Examples per class in an E-by-K one-hot (or soft) target matrix, using
/// the argmax of each row.
pub fn class_counts(targets: ArrayView2<'_, f32>) -> Vec<usize> {
    let mut counts = vec![0; targets.ncols()];
    for row in targets.outer_iter() {
        let best = row
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (index, value)| match best {
                Some((_, top)) if top >= *value => best,
                _ => Some((index, *value)),
            });
        if let Some((index, _)) = best {
            counts[index] += 1;
        }
    }
    counts
}

/// Compute balance metrics from per-class counts, indexed by class.
pub fn class_skew(counts: &[usize]) -> Option<ClassSkew> {
    let min = *counts.iter().min()?;
    let max = *counts.iter().max()?;
    let total: usize = counts.iter().sum();
    let classes = counts.len();
    let share = |count: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };
    let ratio = if min == 0 {
        f64::INFINITY
    } else {
        max as f64 / min as f64
    };
    let mut per_class: Vec<ClassShare> = counts
        .iter()
        .enumerate()
        .map(|(class_index, count)| ClassShare {
            class_index,
            count: *count,
            share: share(*count),
        })
        .collect();
    per_class.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.class_index.cmp(&b.class_index))
    });
    Some(ClassSkew {
        total,
        classes,
        min,
        max,
        mean: total as f64 / classes as f64,
        max_share: share(max),
        min_share: share(min),
        ratio,
        per_class,
    })
}
