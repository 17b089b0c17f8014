//! The weight ledger: which stakes a block inherits from its main parent.

use super::DagStore;
use crate::{
    components::consensus::{Error, Violation},
    types::{MessageHash, ValidatorId, Weight, WeightMap},
};

/// Returns the weight map that governs votes on `block_hash`: its own map if it has no parents,
/// otherwise its main parent's.
pub fn main_parent_weight_map(
    dag: &DagStore,
    block_hash: &MessageHash,
) -> Result<WeightMap, Error> {
    let meta = dag
        .lookup(block_hash)
        .ok_or(Error::UnknownMessage(*block_hash))?;
    let parent_hash = match meta.main_parent() {
        Some(parent_hash) => *parent_hash,
        None => {
            return meta
                .weight_map()
                .cloned()
                .ok_or(Error::StructuralViolation {
                    hash: *block_hash,
                    violation: Violation::NoWeightMap,
                })
        }
    };
    let parent = dag
        .lookup(&parent_hash)
        .ok_or_else(|| Error::MissingDependency {
            message: *block_hash,
            missing: vec![parent_hash],
        })?;
    parent
        .weight_map()
        .cloned()
        .ok_or(Error::StructuralViolation {
            hash: *block_hash,
            violation: Violation::BallotAsMainParent(parent_hash),
        })
}

/// Returns `validator`'s stake as seen from `block_hash`, or zero if it isn't bonded there.
pub fn weight_from_validator_by_dag(
    dag: &DagStore,
    block_hash: &MessageHash,
    validator: &ValidatorId,
) -> Result<Weight, Error> {
    Ok(main_parent_weight_map(dag, block_hash)?.weight(validator))
}

/// The sum of all stakes in `weights`.
pub fn total_weight(weights: &WeightMap) -> Weight {
    weights.total_weight()
}

#[cfg(test)]
mod tests {
    use highway_types::{testing::TestRng, AccountHash, Digest, ProtocolVersion, SecretKey};

    use super::*;
    use crate::{
        components::consensus::highway_core::{MessageFactory, RoundInfo},
        testing::{self, DagBuilder},
    };

    #[test]
    fn genesis_uses_its_own_map() {
        let mut rng = TestRng::new();
        let mut builder = DagBuilder::with_weights(&mut rng, &[5, 7]);
        let genesis = builder.genesis();
        let dag = testing::insert_all(&[&genesis]);

        let weights = main_parent_weight_map(&dag, genesis.hash()).unwrap();
        assert_eq!(weights, builder.weight_map());
        assert_eq!(total_weight(&weights), Weight(12));
    }

    #[test]
    fn child_inherits_main_parent_map() {
        let mut rng = TestRng::new();
        let mut builder = DagBuilder::with_weights(&mut rng, &[5, 7]);
        let genesis = builder.genesis();
        let a1 = builder.block_with_bonds(0, &[*genesis.hash()], &[(1, 9)]);
        let b1 = builder.block(1, &[*a1.hash()]);
        let dag = testing::insert_all(&[&genesis, &a1, &b1]);

        let alice = builder.validator_id(0);
        let bob = builder.validator_id(1);
        assert_eq!(
            weight_from_validator_by_dag(&dag, a1.hash(), &alice).unwrap(),
            Weight(5)
        );
        assert_eq!(
            weight_from_validator_by_dag(&dag, b1.hash(), &alice).unwrap(),
            Weight(0)
        );
        assert_eq!(
            weight_from_validator_by_dag(&dag, b1.hash(), &bob).unwrap(),
            Weight(9)
        );
        assert_eq!(
            weight_from_validator_by_dag(&dag, b1.hash(), &AccountHash::new([42; 32])).unwrap(),
            Weight(0)
        );
    }

    #[test]
    fn block_on_ballot_never_inherits_weights() {
        let mut rng = TestRng::new();
        let mut builder = DagBuilder::new(&mut rng, 2);
        let genesis = builder.genesis();
        let ballot = builder.ballot(0, *genesis.hash());
        let dag = testing::insert_all(&[&genesis, &ballot]);

        let factory = MessageFactory::new(
            "highway-test".to_string(),
            ProtocolVersion::V1_0_0,
            SecretKey::random(&mut rng),
        );
        let block = factory
            .build_block(
                &dag,
                vec![*ballot.hash()],
                None,
                RoundInfo::default(),
                vec![],
                Digest::hash(b"post-state"),
                vec![],
            )
            .unwrap();
        match dag.insert_and_index(&block) {
            Err(Error::StructuralViolation { hash, violation }) => {
                assert_eq!(hash, *block.hash());
                assert_eq!(violation, Violation::BallotAsMainParent(*ballot.hash()));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            main_parent_weight_map(&dag, block.hash()),
            Err(Error::UnknownMessage(_))
        ));
        assert_eq!(
            main_parent_weight_map(&dag, ballot.hash()).unwrap(),
            builder.weight_map()
        );
    }

    #[test]
    fn unknown_block_is_reported() {
        let mut rng = TestRng::new();
        let mut builder = DagBuilder::new(&mut rng, 1);
        let genesis = builder.genesis();
        let a1 = builder.block(0, &[*genesis.hash()]);
        let dag = testing::insert_all(&[&genesis]);

        match main_parent_weight_map(&dag, a1.hash()) {
            Err(Error::UnknownMessage(hash)) => assert_eq!(hash, *a1.hash()),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
