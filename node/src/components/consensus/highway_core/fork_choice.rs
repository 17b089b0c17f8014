//! Main-chain membership and the fork choice rule.

use std::{
    collections::{BTreeMap, HashMap},
    iter,
    sync::Arc,
};

use super::{DagStore, MessageMeta};
use crate::{
    components::consensus::Error,
    types::{MessageHash, Weight, WeightMap},
};

/// Returns whether `candidate` is in the main chain of `target`, i.e. whether following main
/// parents from `target` reaches `candidate`.  Every message is in its own main chain.
///
/// The walk stops as soon as it reaches a message whose j-rank is not greater than the
/// candidate's: a descendant always has a greater j-rank than its ancestors.
pub fn is_in_main_chain(
    dag: &DagStore,
    candidate: &MessageMeta,
    target: &MessageMeta,
) -> Result<bool, Error> {
    if candidate.hash == target.hash {
        return Ok(true);
    }
    let mut current_hash = target.hash;
    let mut current_j_rank = target.j_rank;
    let mut main_parent = target.main_parent().copied();
    loop {
        if current_hash == candidate.hash {
            return Ok(true);
        }
        if current_j_rank <= candidate.j_rank {
            return Ok(false);
        }
        let parent_hash = match main_parent {
            Some(parent_hash) => parent_hash,
            None => return Ok(false),
        };
        let parent = dag
            .lookup(&parent_hash)
            .ok_or_else(|| Error::MissingDependency {
                message: current_hash,
                missing: vec![parent_hash],
            })?;
        current_hash = parent.hash;
        current_j_rank = parent.j_rank;
        main_parent = parent.main_parent().copied();
    }
}

/// Like [`is_in_main_chain`], resolving the candidate by hash first.  A ballot is never in a
/// main chain, so a ballot candidate yields `false`.
pub fn is_in_main_chain_by_hash(
    dag: &DagStore,
    candidate: &MessageHash,
    target: &MessageMeta,
) -> Result<bool, Error> {
    let candidate = dag
        .lookup(candidate)
        .ok_or(Error::UnknownMessage(*candidate))?;
    if candidate.is_ballot() {
        return Ok(false);
    }
    is_in_main_chain(dag, &candidate, target)
}

/// Returns the hash of the block a message votes for: a block votes for itself, a ballot for its
/// parent.
pub fn vote_target(meta: &MessageMeta) -> Option<MessageHash> {
    if meta.is_block() {
        Some(meta.hash)
    } else {
        meta.main_parent().copied()
    }
}

/// Returns whether `meta` votes for `candidate` or one of its main-chain descendants.
pub fn votes_for(
    dag: &DagStore,
    meta: &MessageMeta,
    candidate: &MessageMeta,
) -> Result<bool, Error> {
    let target_hash = match vote_target(meta) {
        Some(target_hash) => target_hash,
        None => return Ok(false),
    };
    let target = dag
        .lookup(&target_hash)
        .ok_or_else(|| Error::MissingDependency {
            message: meta.hash,
            missing: vec![target_hash],
        })?;
    is_in_main_chain(dag, candidate, &target)
}

/// Iterates over `from` and its main ancestors, ending at genesis or at the first main parent
/// missing from the DAG.
pub fn main_chain(
    dag: &DagStore,
    from: Arc<MessageMeta>,
) -> impl Iterator<Item = Arc<MessageMeta>> + '_ {
    iter::successors(Some(from), move |meta| {
        meta.main_parent().and_then(|parent| dag.lookup(parent))
    })
}

/// Runs the latest-message-driven GHOST rule from `start`.
///
/// Every bonded validator's latest message adds its weight to each block on the main chain of
/// its vote target, down to `start`. Starting at `start`, the walk then repeatedly moves to the
/// main child with the greatest score, breaking ties by hash, and returns the block it stops at.
pub fn fork_choice(
    dag: &DagStore,
    weights: &WeightMap,
    start: &MessageHash,
) -> Result<MessageHash, Error> {
    let start_meta = dag.lookup(start).ok_or(Error::UnknownMessage(*start))?;
    let mut scores: HashMap<MessageHash, Weight> = HashMap::new();
    for (validator_id, latest) in dag.latest_messages() {
        let weight = weights.weight(&validator_id);
        if weight.is_zero() || !votes_for(dag, &latest, &start_meta)? {
            continue;
        }
        let target = match vote_target(&latest).and_then(|hash| dag.lookup(&hash)) {
            Some(target) => target,
            None => continue,
        };
        for block in main_chain(dag, target) {
            if block.j_rank <= start_meta.j_rank {
                break;
            }
            let score = scores.entry(block.hash).or_default();
            *score = score.saturating_add(weight);
        }
    }

    let mut children: BTreeMap<MessageHash, Vec<MessageHash>> = BTreeMap::new();
    for hash in scores.keys() {
        if let Some(parent) = dag.lookup(hash).and_then(|meta| meta.main_parent().copied()) {
            children.entry(parent).or_default().push(*hash);
        }
    }
    let mut current = *start;
    while let Some(best) = children.get(&current).and_then(|hashes| {
        hashes
            .iter()
            .max_by_key(|hash| (scores.get(*hash).copied().unwrap_or_default(), **hash))
    }) {
        current = *best;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use highway_types::testing::TestRng;
    use proptest::prelude::*;

    use super::*;
    use crate::{
        components::consensus::Violation,
        testing::{self, DagBuilder},
    };

    #[test]
    fn message_is_in_its_own_main_chain() {
        let mut rng = TestRng::new();
        let mut builder = DagBuilder::new(&mut rng, 2);
        let dag = testing::new_dag();
        for message in builder.random_dag(&mut rng, 12) {
            let meta = dag.insert_and_index(&message).unwrap();
            assert!(is_in_main_chain(&dag, &meta, &meta).unwrap());
        }
    }

    #[test]
    fn main_chain_follows_first_parent_only() {
        let mut rng = TestRng::new();
        let mut builder = DagBuilder::new(&mut rng, 2);
        let genesis = builder.genesis();
        let a1 = builder.block(0, &[*genesis.hash()]);
        let b1 = builder.block(1, &[*genesis.hash()]);
        let a2 = builder.block(0, &[*a1.hash(), *b1.hash()]);
        let dag = testing::insert_all(&[&genesis, &a1, &b1, &a2]);

        let meta = |hash: &MessageHash| dag.lookup(hash).unwrap();
        assert!(is_in_main_chain(&dag, &meta(a1.hash()), &meta(a2.hash())).unwrap());
        assert!(is_in_main_chain(&dag, &meta(genesis.hash()), &meta(a2.hash())).unwrap());
        assert!(!is_in_main_chain(&dag, &meta(b1.hash()), &meta(a2.hash())).unwrap());
        assert!(!is_in_main_chain(&dag, &meta(a2.hash()), &meta(a1.hash())).unwrap());
        let chain: Vec<_> = main_chain(&dag, meta(a2.hash()))
            .map(|meta| meta.hash)
            .collect();
        assert_eq!(chain, vec![*a2.hash(), *a1.hash(), *genesis.hash()]);
    }

    #[test]
    fn ballot_candidate_is_never_in_main_chain() {
        let mut rng = TestRng::new();
        let mut builder = DagBuilder::new(&mut rng, 2);
        let genesis = builder.genesis();
        let a1 = builder.block(0, &[*genesis.hash()]);
        let ballot = builder.ballot(1, *a1.hash());
        let dag = testing::insert_all(&[&genesis, &a1, &ballot]);

        let ballot_meta = dag.lookup(ballot.hash()).unwrap();
        assert!(!is_in_main_chain_by_hash(&dag, ballot.hash(), &ballot_meta).unwrap());
        assert!(is_in_main_chain_by_hash(&dag, a1.hash(), &ballot_meta).unwrap());
        assert_eq!(vote_target(&ballot_meta), Some(*a1.hash()));
    }

    #[test]
    fn missing_main_parent_is_reported() {
        let mut rng = TestRng::new();
        let mut builder = DagBuilder::new(&mut rng, 1);
        let genesis = builder.genesis();
        let a1 = builder.block(0, &[*genesis.hash()]);
        let a2 = builder.block(0, &[*a1.hash()]);
        let dag = testing::insert_all(&[&genesis, &a1, &a2]);

        let genesis_meta = dag.lookup(genesis.hash()).unwrap();
        let a2_meta = dag.lookup(a2.hash()).unwrap();
        dag.reset();
        match is_in_main_chain(&dag, &genesis_meta, &a2_meta) {
            Err(Error::MissingDependency { message, missing }) => {
                assert_eq!(message, *a2.hash());
                assert_eq!(missing, vec![*a1.hash()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn fork_choice_prefers_heavier_branch() {
        let mut rng = TestRng::new();
        let mut builder = DagBuilder::with_weights(&mut rng, &[3, 2, 2]);
        let genesis = builder.genesis();
        let a1 = builder.block_with_justifications(0, &[*genesis.hash()], &[*genesis.hash()]);
        let b1 = builder.block_with_justifications(1, &[*genesis.hash()], &[*genesis.hash()]);
        let c1 = builder.ballot_with_justifications(2, *b1.hash(), &[*b1.hash()]);
        let dag = testing::insert_all(&[&genesis, &a1, &b1, &c1]);

        let weights = builder.weight_map();
        assert_eq!(
            fork_choice(&dag, &weights, genesis.hash()).unwrap(),
            *b1.hash()
        );
    }

    #[test]
    fn ballot_on_ballot_never_becomes_the_tip() {
        let mut rng = TestRng::new();
        let mut builder = DagBuilder::with_weights(&mut rng, &[1, 3]);
        let genesis = builder.genesis();
        let a1 = builder.block(0, &[*genesis.hash()]);
        let b1 = builder.ballot(1, *a1.hash());
        let b2 = builder.forged_ballot(1, vec![*b1.hash()]);
        let dag = testing::insert_all(&[&genesis, &a1, &b1]);

        match dag.insert_and_index(&b2) {
            Err(Error::StructuralViolation { hash, violation }) => {
                assert_eq!(hash, *b2.hash());
                assert_eq!(violation, Violation::BallotAsMainParent(*b1.hash()));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        let tip = fork_choice(&dag, &builder.weight_map(), genesis.hash()).unwrap();
        assert_eq!(tip, *a1.hash());
        assert!(dag.lookup(&tip).unwrap().is_block());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn main_chain_members_have_smaller_j_rank(seed in any::<[u8; 16]>(), size in 1usize..30) {
            let mut rng = TestRng::from_seed(seed);
            let mut builder = DagBuilder::new(&mut rng, 3);
            let dag = testing::new_dag();
            for message in builder.random_dag(&mut rng, size) {
                dag.insert_and_index(&message).unwrap();
            }
            for (_, latest) in dag.latest_messages() {
                let metas: Vec<_> = main_chain(&dag, latest).collect();
                for pair in metas.windows(2) {
                    prop_assert!(pair[1].j_rank < pair[0].j_rank);
                    prop_assert!(is_in_main_chain(&dag, &pair[1], &metas[0]).unwrap());
                }
            }
        }
    }
}
