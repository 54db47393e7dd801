use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Row indices assigned to training and held-out evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Split {
    pub fn has_held_out(&self) -> bool {
        !self.test.is_empty()
    }
}

/// Seeded shuffle of `0..n`, capped at `max_samples` training rows.
///
/// With `max_samples == 0` or `n <= max_samples` every row trains and nothing
/// is held out; otherwise exactly `max_samples` rows train and the rest are
/// held out.
pub fn split_indices(n: usize, max_samples: usize, seed: u64) -> Split {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    if max_samples > 0 && n > max_samples {
        let test = indices.split_off(max_samples);
        Split {
            train: indices,
            test,
        }
    } else {
        Split {
            train: indices,
            test: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_training_rows_and_holds_out_the_rest() {
        let split = split_indices(500, 100, 42);
        assert_eq!(split.train.len(), 100);
        assert_eq!(split.test.len(), 400);
        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn same_seed_same_split() {
        assert_eq!(split_indices(500, 100, 42), split_indices(500, 100, 42));
        assert_ne!(split_indices(500, 100, 42), split_indices(500, 100, 43));
    }

    #[test]
    fn no_cap_keeps_everything_in_train() {
        let split = split_indices(50, 0, 1);
        assert_eq!(split.train.len(), 50);
        assert!(!split.has_held_out());
        assert!(!split_indices(50, 50, 1).has_held_out());
    }
}
