//! Finality: how much weight would have to be faulty to revert a candidate block.

use std::{collections::BTreeMap, iter, sync::Arc};

use num_rational::Ratio;

use super::{fork_choice, DagStore, MessageMeta};
use crate::{
    components::consensus::{Config, Error},
    types::{MessageHash, ValidatorId, Weight, WeightMap},
};

/// A strategy computing the fault tolerance of a candidate block.
///
/// Implementations only read the DAG and never overstate the tolerance.
pub trait FinalityOracle {
    /// Returns the total weight of validators that would have to equivocate for `candidate` to
    /// be reverted.
    fn fault_tolerance(
        &self,
        dag: &DagStore,
        weights: &WeightMap,
        candidate: &MessageHash,
    ) -> Result<Weight, Error>;

    /// Returns the fault tolerance as a fraction of the total weight.
    fn fault_tolerance_fraction(
        &self,
        dag: &DagStore,
        weights: &WeightMap,
        candidate: &MessageHash,
    ) -> Result<Ratio<u64>, Error> {
        let total = weights.total_weight();
        if total.is_zero() {
            return Ok(Ratio::from_integer(0));
        }
        let ftt = self.fault_tolerance(dag, weights, candidate)?;
        Ok(Ratio::new(ftt.0.min(total.0), total.0))
    }

    /// Returns whether `candidate`'s fault tolerance reaches `threshold`.
    fn is_finalized(
        &self,
        dag: &DagStore,
        weights: &WeightMap,
        candidate: &MessageHash,
        threshold: Ratio<u64>,
    ) -> Result<bool, Error> {
        Ok(self.fault_tolerance_fraction(dag, weights, candidate)? >= threshold)
    }
}

/// The validators' latest messages that count for a summit.
type Panorama = BTreeMap<ValidatorId, Arc<MessageMeta>>;

/// A list containing the earliest level-n messages of each member of some committee, for some n.
#[derive(Debug)]
struct Section<'a> {
    /// Assigns to each member of a committee the sequence number of the earliest message that
    /// qualifies them for that committee.
    sequence_numbers: BTreeMap<ValidatorId, u32>,
    dag: &'a DagStore,
    weights: &'a WeightMap,
    panorama: &'a Panorama,
}

impl<'a> Section<'a> {
    /// Creates a section assigning to each validator their level-0 message, i.e. the oldest
    /// message in their current streak of votes for `candidate` and its descendants.
    fn level0(
        candidate: &MessageMeta,
        dag: &'a DagStore,
        weights: &'a WeightMap,
        panorama: &'a Panorama,
    ) -> Result<Self, Error> {
        let mut sequence_numbers = BTreeMap::new();
        for (validator_id, latest) in panorama {
            let mut level0 = None;
            for meta in swimlane(dag, Arc::clone(latest)) {
                if !fork_choice::votes_for(dag, &meta, candidate)? {
                    break;
                }
                level0 = Some(meta.seq_num);
            }
            if let Some(seq_num) = level0 {
                sequence_numbers.insert(*validator_id, seq_num);
            }
        }
        Ok(Section {
            sequence_numbers,
            dag,
            weights,
            panorama,
        })
    }

    /// Returns a section `s` of messages each of which can see a quorum of messages in `self` by
    /// validators that are part of `s`.
    fn next(&self, quorum: Weight) -> Option<Self> {
        let members = self.sequence_numbers.keys().copied().collect();
        let committee = self.prune_committee(quorum, members);
        if committee.is_empty() {
            None
        } else {
            Some(self.next_from_committee(quorum, &committee))
        }
    }

    /// Returns the greatest subset of the `committee` of validators whose latest messages can see
    /// a quorum of messages by the subset in `self`.
    fn prune_committee(
        &self,
        quorum: Weight,
        mut committee: Vec<ValidatorId>,
    ) -> Vec<ValidatorId> {
        loop {
            let sees_quorum = |validator_id: &ValidatorId| {
                self.panorama
                    .get(validator_id)
                    .map_or(false, |latest| self.seen_weight(latest, &committee) >= quorum)
            };
            let (new_committee, pruned): (Vec<_>, Vec<_>) =
                committee.iter().copied().partition(sees_quorum);
            if pruned.is_empty() {
                return new_committee;
            }
            committee = new_committee;
        }
    }

    /// Returns the section containing the earliest message of each of the `committee` members
    /// that can see a quorum of messages by `committee` members in `self`.
    fn next_from_committee(&self, quorum: Weight, committee: &[ValidatorId]) -> Self {
        let find_first_lvl_n = |validator_id: &ValidatorId| {
            let latest = self.panorama.get(validator_id)?;
            swimlane(self.dag, Arc::clone(latest))
                .take_while(|meta| self.seen_weight(meta, committee) >= quorum)
                .last()
                .map(|meta| (*validator_id, meta.seq_num))
        };
        Section {
            sequence_numbers: committee.iter().filter_map(find_first_lvl_n).collect(),
            dag: self.dag,
            weights: self.weights,
            panorama: self.panorama,
        }
    }

    /// Returns the total weight of the `committee`'s members whose message in this section is
    /// seen by `meta`.
    fn seen_weight(&self, meta: &MessageMeta, committee: &[ValidatorId]) -> Weight {
        committee
            .iter()
            .filter(|validator_id| self.can_see(meta, validator_id))
            .map(|validator_id| self.weights.weight(validator_id))
            .sum()
    }

    /// Returns whether `meta` can see `validator_id`'s message in `self`, where a message is
    /// considered to see itself.
    fn can_see(&self, meta: &MessageMeta, validator_id: &ValidatorId) -> bool {
        self.sequence_numbers
            .get(validator_id)
            .map_or(false, |self_sn| {
                if meta.validator_id == *validator_id {
                    meta.seq_num >= *self_sn
                } else {
                    seen_seq_num(self.dag, meta, validator_id).map_or(false, |sn| sn >= *self_sn)
                }
            })
    }
}

/// Iterates over `latest` and the earlier messages by the same validator, newest first.
fn swimlane(
    dag: &DagStore,
    latest: Arc<MessageMeta>,
) -> impl Iterator<Item = Arc<MessageMeta>> + '_ {
    iter::successors(Some(latest), move |meta| {
        meta.validator_prev_hash.and_then(|hash| dag.lookup(&hash))
    })
}

/// The highest sequence number by `validator_id` that `meta` cites directly.
fn seen_seq_num(dag: &DagStore, meta: &MessageMeta, validator_id: &ValidatorId) -> Option<u32> {
    let justified = meta
        .justifications
        .iter()
        .filter(|justification| justification.validator == *validator_id)
        .map(|justification| justification.latest_hash);
    justified
        .chain(meta.parents.iter().copied())
        .filter_map(|hash| dag.lookup(&hash))
        .filter(|cited| cited.validator_id == *validator_id)
        .map(|cited| cited.seq_num)
        .max()
}

/// The summit finality detector.
///
/// A level-`k` summit with quorum `q` is a chain of sections: level 0 holds each validator's
/// earliest message in its current streak of votes for the candidate, and each member of level
/// `n + 1` has a message that sees a quorum of level-`n` messages by other members.  Such a
/// summit tolerates `(2q − total)(1 − 2^−k)` of faulty weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SummitDetector {
    max_level: u8,
}

impl SummitDetector {
    /// The level past which summits don't raise the tolerance noticeably: the limit is reached
    /// within `2^-64`.
    pub const MAX_LEVEL: u8 = 64;

    /// Creates a detector looking for summits of up to `max_level` levels.
    pub fn new(max_level: u8) -> Self {
        SummitDetector {
            max_level: max_level.min(Self::MAX_LEVEL),
        }
    }

    /// The highest level looked for.
    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    /// Returns the level of the highest summit for `candidate` with the given `quorum`, up to the
    /// maximum level.
    pub fn summit_level(
        &self,
        dag: &DagStore,
        weights: &WeightMap,
        candidate: &MessageHash,
        quorum: Weight,
    ) -> Result<usize, Error> {
        let candidate = dag
            .lookup(candidate)
            .ok_or(Error::UnknownMessage(*candidate))?;
        if candidate.is_ballot() {
            return Ok(0);
        }
        let panorama = panorama(dag, weights);
        let sec0 = Section::level0(&candidate, dag, weights, &panorama)?;
        Ok(self.level_for_quorum(&sec0, quorum))
    }

    fn level_for_quorum(&self, sec0: &Section, quorum: Weight) -> usize {
        let sections_iter = iter::successors(sec0.next(quorum), |sec| sec.next(quorum));
        sections_iter.take(usize::from(self.max_level)).count()
    }

    /// The greatest quorum for which a summit of at least `level` levels exists, if any.
    fn max_quorum_for_level(
        &self,
        sec0: &Section,
        level: usize,
        total: Weight,
    ) -> Option<Weight> {
        let has_summit = |quorum: Weight| self.level_for_quorum(sec0, quorum) >= level;
        // Quorums at or below half the total weight tolerate nothing.
        let mut low = total.0 / 2 + 1;
        if low > total.0 || !has_summit(Weight(low)) {
            return None;
        }
        let mut high = total.0;
        while low < high {
            let mid = low + (high - low + 1) / 2;
            if has_summit(Weight(mid)) {
                low = mid;
            } else {
                high = mid - 1;
            }
        }
        Some(Weight(low))
    }
}

impl Default for SummitDetector {
    fn default() -> Self {
        SummitDetector::new(8)
    }
}

impl From<&Config> for SummitDetector {
    fn from(config: &Config) -> Self {
        SummitDetector::new(config.max_summit_level)
    }
}

impl FinalityOracle for SummitDetector {
    fn fault_tolerance(
        &self,
        dag: &DagStore,
        weights: &WeightMap,
        candidate: &MessageHash,
    ) -> Result<Weight, Error> {
        let candidate = dag
            .lookup(candidate)
            .ok_or(Error::UnknownMessage(*candidate))?;
        if candidate.is_ballot() {
            return Ok(Weight(0));
        }
        let total = weights.total_weight();
        let panorama = panorama(dag, weights);
        let sec0 = Section::level0(&candidate, dag, weights, &panorama)?;
        let mut best = Weight(0);
        for level in 1..=usize::from(self.max_level) {
            let quorum = match self.max_quorum_for_level(&sec0, level, total) {
                Some(quorum) => quorum,
                // Higher levels need at least the same quorum.
                None => break,
            };
            best = best.max(ftt_for_summit(level, quorum, total));
        }
        Ok(best)
    }
}

/// The panorama: the latest message of every validator with positive weight.
fn panorama(dag: &DagStore, weights: &WeightMap) -> Panorama {
    dag.latest_messages()
        .into_iter()
        .filter(|(validator_id, _)| !weights.weight(validator_id).is_zero())
        .collect()
}

/// Returns the fault tolerance of a `level`-level summit with the given quorum:
/// `(2 quorum − total)(2^level − 1) / 2^level`, rounded down.
fn ftt_for_summit(level: usize, quorum: Weight, total: Weight) -> Weight {
    let excess = (2 * u128::from(quorum)).saturating_sub(u128::from(total));
    let pow_lvl = 1u128 << level.min(usize::from(SummitDetector::MAX_LEVEL));
    // excess − ⌈excess / 2^level⌉ is the exact floor without overflowing.
    Weight((excess - (excess + pow_lvl - 1) / pow_lvl) as u64)
}
