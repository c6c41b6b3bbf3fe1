use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::dataset::WindowRecord;

/// What the train/test split keeps together.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Windows are split individually; one recording may feed both sides.
    #[default]
    Window,
    /// All windows of a recording land on the same side.
    File,
}

/// Number of test items for `n` items: `ceil(fraction * n)`.
fn test_len(n: usize, test_fraction: f64) -> usize {
    ((n as f64 * test_fraction).ceil() as usize).min(n)
}

/// Seeded shuffle followed by a `(train, test)` partition.
pub fn split_dataset(
    records: Vec<WindowRecord>,
    test_fraction: f64,
    seed: u64,
    strategy: SplitStrategy,
) -> (Vec<WindowRecord>, Vec<WindowRecord>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_test = test_len(records.len(), test_fraction);

    match strategy {
        SplitStrategy::Window => {
            let mut records = records;
            records.shuffle(&mut rng);
            let train = records.split_off(n_test);
            (train, records)
        }
        SplitStrategy::File => {
            let mut groups: BTreeMap<PathBuf, Vec<WindowRecord>> = BTreeMap::new();
            for record in records {
                groups.entry(record.path.clone()).or_default().push(record);
            }

            let mut groups: Vec<Vec<WindowRecord>> = groups.into_values().collect();
            groups.shuffle(&mut rng);

            let mut train = Vec::new();
            let mut test = Vec::new();
            for group in groups {
                if test.len() < n_test {
                    test.extend(group);
                } else {
                    train.extend(group);
                }
            }

            train.shuffle(&mut rng);
            test.shuffle(&mut rng);
            (train, test)
        }
    }
}
