//! Building and signing new messages.

use highway_types::{AccountHash, Digest, ProtocolVersion, PublicKey, SecretKey, Tick};

use super::DagStore;
use crate::{
    components::consensus::Error,
    types::{
        Ballot, Block, BlockBody, Bond, Deploy, GlobalState, Header, Justification, Message,
        MessageHash, MessageRole, MessageType, ValidatorId,
    },
};

/// The round-specific header fields of a new message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoundInfo {
    /// Creation time.
    pub timestamp: Tick,
    /// The round the message belongs to.
    pub round_id: u64,
    /// The era's key block.
    pub key_block_hash: Option<MessageHash>,
    /// The message's part in its round.
    pub role: Option<MessageRole>,
    /// Reserved bit.
    pub magic_bit: bool,
}

/// Everything a new message takes from the DAG.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivedInputs {
    /// Ordered parents.
    pub parents: Vec<MessageHash>,
    /// Cited latest messages.
    pub justifications: Vec<Justification>,
    /// The j-rank the store will assign.
    pub j_rank: u64,
    /// The main rank the store will assign.
    pub main_rank: u64,
    /// The sequence number the store will assign.
    pub seq_num: u32,
    /// The validator's latest message so far.
    pub validator_prev_hash: Option<MessageHash>,
    /// The main parent's post-state, i.e. the new message's pre-state.
    pub parent_post_state_hash: Digest,
}

/// Builds messages signed by one validator.
#[derive(Debug)]
pub struct MessageFactory {
    chain_name: String,
    protocol_version: ProtocolVersion,
    secret_key: SecretKey,
    public_key: PublicKey,
    validator_id: ValidatorId,
}

impl MessageFactory {
    /// Creates a factory for the validator holding `secret_key`.
    pub fn new(
        chain_name: String,
        protocol_version: ProtocolVersion,
        secret_key: SecretKey,
    ) -> Self {
        let public_key = secret_key.public_key();
        MessageFactory {
            chain_name,
            protocol_version,
            validator_id: public_key.to_account_hash(),
            secret_key,
            public_key,
        }
    }

    /// The validator this factory signs for.
    pub fn validator_id(&self) -> &ValidatorId {
        &self.validator_id
    }

    /// The validator's public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Computes the DAG-derived fields of a new message with these `parents`.
    ///
    /// Without explicit `justifications`, the message cites every validator's latest message.
    pub fn derive_inputs(
        &self,
        dag: &DagStore,
        parents: Vec<MessageHash>,
        justifications: Option<Vec<Justification>>,
    ) -> Result<DerivedInputs, Error> {
        derive_inputs(dag, &self.validator_id, parents, justifications)
    }

    /// Builds and signs a block executing `deploys` on top of `parents`.
    #[allow(clippy::too_many_arguments)]
    pub fn build_block(
        &self,
        dag: &DagStore,
        parents: Vec<MessageHash>,
        justifications: Option<Vec<Justification>>,
        round: RoundInfo,
        deploys: Vec<Deploy>,
        post_state_hash: Digest,
        bonds: Vec<Bond>,
    ) -> Result<Message, Error> {
        let inputs = self.derive_inputs(dag, parents, justifications)?;
        let body = BlockBody { deploys };
        let state = GlobalState {
            pre_state_hash: inputs.parent_post_state_hash,
            post_state_hash,
            bonds,
        };
        let header = self.header(MessageType::Block, inputs, state, body.hash()?, round);
        let hash = header.hash()?;
        let signature = self.secret_key.sign(hash);
        Ok(Message::Block(Block {
            hash,
            header,
            body,
            signature: Some(signature),
        }))
    }

    /// Builds and signs a ballot voting for `parent`.  The ballot leaves the global state as it
    /// was after `parent`.
    pub fn build_ballot(
        &self,
        dag: &DagStore,
        parent: MessageHash,
        justifications: Option<Vec<Justification>>,
        round: RoundInfo,
    ) -> Result<Message, Error> {
        let inputs = self.derive_inputs(dag, vec![parent], justifications)?;
        let state = GlobalState {
            pre_state_hash: inputs.parent_post_state_hash,
            post_state_hash: inputs.parent_post_state_hash,
            bonds: vec![],
        };
        let body_hash = BlockBody::default().hash()?;
        let header = self.header(MessageType::Ballot, inputs, state, body_hash, round);
        let hash = header.hash()?;
        let signature = self.secret_key.sign(hash);
        Ok(Message::Ballot(Ballot {
            hash,
            header,
            signature,
        }))
    }

    fn header(
        &self,
        message_type: MessageType,
        inputs: DerivedInputs,
        state: GlobalState,
        body_hash: Digest,
        round: RoundInfo,
    ) -> Header {
        Header {
            message_type,
            protocol_version: self.protocol_version,
            timestamp: round.timestamp,
            chain_name: self.chain_name.clone(),
            parents: inputs.parents,
            justifications: inputs.justifications,
            state,
            j_rank: inputs.j_rank,
            main_rank: inputs.main_rank,
            validator_public_key: Some(self.public_key),
            validator_id: self.validator_id,
            validator_seq_num: inputs.seq_num,
            validator_prev_message_hash: inputs.validator_prev_hash,
            body_hash,
            key_block_hash: round.key_block_hash,
            round_id: round.round_id,
            magic_bit: round.magic_bit,
            message_role: round.role,
        }
    }

    /// Builds the unsigned genesis block: no parents, no justifications, rank zero.
    pub fn build_genesis(
        chain_name: String,
        protocol_version: ProtocolVersion,
        timestamp: Tick,
        post_state_hash: Digest,
        bonds: Vec<Bond>,
    ) -> Result<Message, Error> {
        let body = BlockBody::default();
        let header = Header {
            message_type: MessageType::Block,
            protocol_version,
            timestamp,
            chain_name,
            parents: vec![],
            justifications: vec![],
            state: GlobalState {
                pre_state_hash: Digest::default(),
                post_state_hash,
                bonds,
            },
            j_rank: 0,
            main_rank: 0,
            validator_public_key: None,
            validator_id: AccountHash::new([0; 32]),
            validator_seq_num: 1,
            validator_prev_message_hash: None,
            body_hash: body.hash()?,
            key_block_hash: None,
            round_id: 0,
            magic_bit: false,
            message_role: None,
        };
        let hash = header.hash()?;
        Ok(Message::Block(Block {
            hash,
            header,
            body,
            signature: None,
        }))
    }
}

/// Computes the DAG-derived fields of a new message by `validator_id`.
fn derive_inputs(
    dag: &DagStore,
    validator_id: &ValidatorId,
    parents: Vec<MessageHash>,
    justifications: Option<Vec<Justification>>,
) -> Result<DerivedInputs, Error> {
    let justifications = match justifications {
        Some(justifications) => justifications,
        None => dag
            .latest_messages()
            .into_iter()
            .map(|(validator, latest)| Justification {
                validator,
                latest_hash: latest.hash,
            })
            .collect(),
    };
    let derived = dag
        .derive_fields(validator_id, &parents, &justifications)
        .map_err(|missing| Error::MissingDependency {
            // The new message has no hash yet; report the main parent as the referrer.
            message: parents.first().copied().unwrap_or_default(),
            missing,
        })?;
    let parent_post_state_hash = parents
        .first()
        .and_then(|hash| dag.lookup(hash))
        .map(|parent| parent.post_state_hash)
        .unwrap_or_default();
    Ok(DerivedInputs {
        parents,
        justifications,
        j_rank: derived.j_rank,
        main_rank: derived.main_rank,
        seq_num: derived.seq_num,
        validator_prev_hash: derived.validator_prev_hash,
        parent_post_state_hash,
    })
}
