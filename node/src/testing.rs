//! Testing utilities.
//!
//! [`DagBuilder`] produces signed messages for a fixed set of validators. It keeps its own
//! [`DagStore`] so that every message it builds carries the ranks and sequence numbers a store
//! would derive, and tests are free to insert the messages anywhere, in any causal order.

use rand::Rng;

use highway_types::{testing::TestRng, Digest, ProtocolVersion, SecretKey, Tick};

use crate::{
    components::{
        consensus::highway_core::{DagStore, MessageFactory, RoundInfo},
        storage::InMemStore,
    },
    types::{
        Bond, Justification, Message, MessageHash, MessageRole, ValidatorId, Weight, WeightMap,
    },
};

const CHAIN_NAME: &str = "highway-test";

/// Returns an empty DAG backed by an in-memory store.
pub(crate) fn new_dag() -> DagStore {
    DagStore::new(Box::new(InMemStore::new()))
}

/// Returns a new in-memory DAG holding `messages`, inserted in the given order.
pub(crate) fn insert_all(messages: &[&Message]) -> DagStore {
    let dag = new_dag();
    for message in messages {
        dag.insert_and_index(message)
            .unwrap_or_else(|error| panic!("failed to insert {}: {}", message, error));
    }
    dag
}

/// Returns a hash no builder will ever produce.
pub(crate) fn random_message_hash(rng: &mut TestRng) -> MessageHash {
    MessageHash::new(Digest::from(rng.gen::<[u8; Digest::LENGTH]>()))
}

/// Builds messages for a fixed validator set, indexing each one in a private DAG.
pub(crate) struct DagBuilder {
    factories: Vec<MessageFactory>,
    // Same keys as the factories hold, for re-signing tampered messages.
    secret_keys: Vec<SecretKey>,
    bonds: Vec<Bond>,
    genesis: Option<Message>,
    dag: DagStore,
    clock: u64,
}

impl DagBuilder {
    /// Creates a builder for `validator_count` validators of weight 1.
    pub(crate) fn new(rng: &mut TestRng, validator_count: usize) -> Self {
        DagBuilder::with_weights(rng, &vec![1; validator_count])
    }

    /// Creates a builder with one validator per entry of `weights`.
    pub(crate) fn with_weights(rng: &mut TestRng, weights: &[u64]) -> Self {
        let mut factories = vec![];
        let mut secret_keys = vec![];
        let mut bonds = vec![];
        for weight in weights {
            let seed: [u8; SecretKey::ED25519_LENGTH] = rng.gen();
            let factory = MessageFactory::new(
                CHAIN_NAME.to_string(),
                ProtocolVersion::V1_0_0,
                SecretKey::ed25519_from_bytes(seed).unwrap(),
            );
            bonds.push(Bond {
                validator: *factory.validator_id(),
                stake: Weight(*weight),
            });
            factories.push(factory);
            secret_keys.push(SecretKey::ed25519_from_bytes(seed).unwrap());
        }
        DagBuilder {
            factories,
            secret_keys,
            bonds,
            genesis: None,
            dag: new_dag(),
            clock: 0,
        }
    }

    /// The id of validator `index`.
    pub(crate) fn validator_id(&self, index: usize) -> ValidatorId {
        *self.factories[index].validator_id()
    }

    /// The weights the genesis block bonds.
    pub(crate) fn weight_map(&self) -> WeightMap {
        self.bonds
            .iter()
            .map(|bond| (bond.validator, bond.stake))
            .collect()
    }

    /// The genesis block bonding every validator; the same one on every call.
    pub(crate) fn genesis(&mut self) -> Message {
        if let Some(genesis) = &self.genesis {
            return genesis.clone();
        }
        let genesis = MessageFactory::build_genesis(
            CHAIN_NAME.to_string(),
            ProtocolVersion::V1_0_0,
            Tick::ZERO,
            Digest::hash(b"genesis"),
            self.bonds.clone(),
        )
        .unwrap();
        self.record(&genesis);
        self.genesis = Some(genesis.clone());
        genesis
    }

    /// A block by `validator` on top of `parents`, citing every latest message.
    pub(crate) fn block(&mut self, validator: usize, parents: &[MessageHash]) -> Message {
        let bonds = self.bonds.clone();
        self.build_block(validator, parents, None, bonds)
    }

    /// A block citing only the messages in `justified`.
    pub(crate) fn block_with_justifications(
        &mut self,
        validator: usize,
        parents: &[MessageHash],
        justified: &[MessageHash],
    ) -> Message {
        let justifications = self.justifications(justified);
        let bonds = self.bonds.clone();
        self.build_block(validator, parents, Some(justifications), bonds)
    }

    /// A block changing the bonds to `bonds`, given as `(validator index, stake)`.
    pub(crate) fn block_with_bonds(
        &mut self,
        validator: usize,
        parents: &[MessageHash],
        bonds: &[(usize, u64)],
    ) -> Message {
        let bonds = bonds
            .iter()
            .map(|(index, stake)| Bond {
                validator: self.validator_id(*index),
                stake: Weight(*stake),
            })
            .collect();
        self.build_block(validator, parents, None, bonds)
    }

    /// A ballot by `validator` voting for `parent`, citing every latest message.
    pub(crate) fn ballot(&mut self, validator: usize, parent: MessageHash) -> Message {
        self.build_ballot(validator, parent, None)
    }

    /// A ballot citing only the messages in `justified`.
    pub(crate) fn ballot_with_justifications(
        &mut self,
        validator: usize,
        parent: MessageHash,
        justified: &[MessageHash],
    ) -> Message {
        let justifications = self.justifications(justified);
        self.build_ballot(validator, parent, Some(justifications))
    }

    /// A correctly signed ballot with arbitrary `parents`.  It isn't indexed by the builder.
    pub(crate) fn forged_ballot(
        &mut self,
        validator: usize,
        parents: Vec<MessageHash>,
    ) -> Message {
        let round = self.next_round(MessageRole::Confirmation);
        let mut ballot = self.factories[validator]
            .build_ballot(&self.dag, parents[0], None, round)
            .unwrap();
        if let Message::Ballot(inner) = &mut ballot {
            inner.header.parents = parents;
            inner.hash = inner.header.hash().unwrap();
            inner.signature = self.secret_keys[validator].sign(inner.hash);
        }
        ballot
    }

    /// A correctly signed block declaring the given ranks instead of the real ones.
    pub(crate) fn block_with_declared_ranks(
        &mut self,
        validator: usize,
        parents: &[MessageHash],
        j_rank: u64,
        main_rank: u64,
    ) -> Message {
        let round = self.next_round(MessageRole::Proposal);
        let mut block = self.factories[validator]
            .build_block(
                &self.dag,
                parents.to_vec(),
                None,
                round,
                vec![],
                Digest::hash(round.round_id.to_le_bytes()),
                self.bonds.clone(),
            )
            .unwrap();
        if let Message::Block(inner) = &mut block {
            inner.header.j_rank = j_rank;
            inner.header.main_rank = main_rank;
            inner.hash = inner.header.hash().unwrap();
            inner.signature = Some(self.secret_keys[validator].sign(inner.hash));
        }
        self.record(&block);
        block
    }

    /// Genesis followed by `count - 1` random blocks and ballots, in insertion order.
    ///
    /// Every message cites all latest messages, so each validator's messages form a chain.
    pub(crate) fn random_dag(&mut self, rng: &mut TestRng, count: usize) -> Vec<Message> {
        let genesis = self.genesis();
        let mut blocks = vec![*genesis.hash()];
        let mut messages = vec![genesis];
        while messages.len() < count {
            let validator = rng.gen_range(0..self.factories.len());
            let main_parent = blocks[rng.gen_range(0..blocks.len())];
            let message = if rng.gen_bool(0.6) {
                let mut parents = vec![main_parent];
                let other = blocks[rng.gen_range(0..blocks.len())];
                if other != main_parent && rng.gen_bool(0.3) {
                    parents.push(other);
                }
                let block = self.block(validator, &parents);
                blocks.push(*block.hash());
                block
            } else {
                self.ballot(validator, main_parent)
            };
            messages.push(message);
        }
        messages
    }

    fn build_block(
        &mut self,
        validator: usize,
        parents: &[MessageHash],
        justifications: Option<Vec<Justification>>,
        bonds: Vec<Bond>,
    ) -> Message {
        let round = self.next_round(MessageRole::Proposal);
        let block = self.factories[validator]
            .build_block(
                &self.dag,
                parents.to_vec(),
                justifications,
                round,
                vec![],
                Digest::hash(round.round_id.to_le_bytes()),
                bonds,
            )
            .unwrap();
        self.record(&block);
        block
    }

    fn build_ballot(
        &mut self,
        validator: usize,
        parent: MessageHash,
        justifications: Option<Vec<Justification>>,
    ) -> Message {
        let round = self.next_round(MessageRole::Confirmation);
        let ballot = self.factories[validator]
            .build_ballot(&self.dag, parent, justifications, round)
            .unwrap();
        self.record(&ballot);
        ballot
    }

    fn justifications(&self, justified: &[MessageHash]) -> Vec<Justification> {
        justified
            .iter()
            .map(|hash| Justification {
                validator: self
                    .dag
                    .lookup(hash)
                    .unwrap_or_else(|| panic!("{} is not known to the builder", hash))
                    .validator_id,
                latest_hash: *hash,
            })
            .collect()
    }

    fn next_round(&mut self, role: MessageRole) -> RoundInfo {
        self.clock += 1;
        RoundInfo {
            timestamp: Tick::from(self.clock),
            round_id: self.clock,
            key_block_hash: None,
            role: Some(role),
            magic_bit: false,
        }
    }

    fn record(&self, message: &Message) {
        self.dag
            .insert_and_index(message)
            .unwrap_or_else(|error| panic!("builder failed to index {}: {}", message, error));
    }
}
