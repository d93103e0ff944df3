//! Vote aggregation
//!
//! Pure functions over a round's votes. Markers (`☕`, t-shirt sizes) are
//! left out of the numeric statistics but counted everywhere else.

use serde::{Deserialize, Serialize};

use crate::models::{Round, VoteValue, Votes};

/// One bar of the distribution chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub value: VoteValue,
    pub count: usize,
}

/// Statistics of a revealed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    /// Mean of numeric votes; `None` when there are none
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Numeric and marker votes alike
    pub voted_count: usize,
    /// Observers excluded
    pub active_participant_count: usize,
    /// Most frequent first; ties keep first-seen order
    pub distribution: Vec<Bucket>,
    /// Shared value when every vote is identical
    pub consensus: Option<VoteValue>,
}

impl Tally {
    pub fn compute(votes: &Votes, active_participant_count: usize) -> Self {
        let numeric: Vec<f64> = votes.values().filter_map(VoteValue::as_number).collect();

        let average = if numeric.is_empty() {
            None
        } else {
            Some(numeric.iter().sum::<f64>() / numeric.len() as f64)
        };

        Self {
            average,
            min: numeric.iter().copied().reduce(f64::min),
            max: numeric.iter().copied().reduce(f64::max),
            voted_count: votes.len(),
            active_participant_count,
            distribution: distribution(votes),
            consensus: consensus(votes),
        }
    }

    /// Tally a round only once its votes are visible
    pub fn for_revealed(round: &Round, active_participant_count: usize) -> Option<Self> {
        round
            .is_revealed()
            .then(|| Self::compute(&round.votes, active_participant_count))
    }

    /// Formatted as `voted/active`, e.g. `3/4`
    pub fn turnout(&self) -> String {
        format!("{}/{}", self.voted_count, self.active_participant_count)
    }

    pub fn has_consensus(&self) -> bool {
        self.consensus.is_some()
    }
}

/// Group votes by literal value, most frequent first.
///
/// The sort is stable over first-seen order, so equal counts keep the
/// order in which their value first appeared.
pub fn distribution(votes: &Votes) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = Vec::new();
    for value in votes.values() {
        match buckets.iter_mut().find(|b| b.value == *value) {
            Some(bucket) => bucket.count += 1,
            None => buckets.push(Bucket {
                value: value.clone(),
                count: 1,
            }),
        }
    }
    buckets.sort_by(|a, b| b.count.cmp(&a.count));
    buckets
}

/// The shared value if there is at least one vote and all are identical
pub fn consensus(votes: &Votes) -> Option<VoteValue> {
    let mut values = votes.values();
    let first = values.next()?;
    values.all(|v| v == first).then(|| first.clone())
}
