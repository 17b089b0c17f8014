//! The consensus message DAG's vertices: blocks and ballots.

use std::{
    collections::BTreeSet,
    fmt::{self, Debug, Display, Formatter},
};

use datasize::DataSize;
use derive_more::From;
use hex_fmt::HexFmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use highway_types::{
    bytesrepr::{self, FromBytes, ToBytes, U8_SERIALIZED_LENGTH},
    crypto, AccountHash, Digest, ProtocolVersion, PublicKey, Signature, Tick,
};

use super::{Deploy, Weight, WeightMap};

/// Identifies the validator that produced a message: the hash of its public key.
pub type ValidatorId = AccountHash;

/// The hash of a message's header, which is also the message's identity.
#[derive(
    Copy,
    Clone,
    DataSize,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    From,
)]
pub struct MessageHash(Digest);

impl MessageHash {
    /// Constructs a new `MessageHash`.
    pub fn new(hash: Digest) -> Self {
        MessageHash(hash)
    }

    /// Returns the wrapped inner hash.
    pub fn inner(&self) -> &Digest {
        &self.0
    }
}

impl Display for MessageHash {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "message-hash({:10})", HexFmt(&self.0))
    }
}

impl Debug for MessageHash {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "MessageHash({})", HexFmt(&self.0))
    }
}

impl AsRef<[u8]> for MessageHash {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl ToBytes for MessageHash {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        self.0.to_bytes()
    }

    fn serialized_length(&self) -> usize {
        self.0.serialized_length()
    }

    fn write_bytes(&self, writer: &mut Vec<u8>) -> Result<(), bytesrepr::Error> {
        self.0.write_bytes(writer)
    }
}

impl FromBytes for MessageHash {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (hash, remainder) = Digest::from_bytes(bytes)?;
        Ok((MessageHash(hash), remainder))
    }
}

const BLOCK_TAG: u8 = 0;
const BALLOT_TAG: u8 = 1;

/// The variant tag written into a message header.
#[derive(Copy, Clone, DataSize, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// A block: may execute deploys and carries the validators' weights.
    Block,
    /// A ballot: a vote without a body.
    Ballot,
}

impl Display for MessageType {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        match self {
            MessageType::Block => formatter.write_str("block"),
            MessageType::Ballot => formatter.write_str("ballot"),
        }
    }
}

impl ToBytes for MessageType {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        match self {
            MessageType::Block => BLOCK_TAG.to_bytes(),
            MessageType::Ballot => BALLOT_TAG.to_bytes(),
        }
    }

    fn serialized_length(&self) -> usize {
        U8_SERIALIZED_LENGTH
    }
}

impl FromBytes for MessageType {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (tag, remainder) = u8::from_bytes(bytes)?;
        match tag {
            BLOCK_TAG => Ok((MessageType::Block, remainder)),
            BALLOT_TAG => Ok((MessageType::Ballot, remainder)),
            _ => Err(bytesrepr::Error::Formatting),
        }
    }
}

/// The part a message plays in its round.
#[derive(Copy, Clone, DataSize, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageRole {
    /// The round leader's block.
    Proposal,
    /// A vote for the round's proposal.
    Confirmation,
    /// The end-of-round vote.
    Witness,
}

impl ToBytes for MessageRole {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let tag: u8 = match self {
            MessageRole::Proposal => 0,
            MessageRole::Confirmation => 1,
            MessageRole::Witness => 2,
        };
        tag.to_bytes()
    }

    fn serialized_length(&self) -> usize {
        U8_SERIALIZED_LENGTH
    }
}

impl FromBytes for MessageRole {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (tag, remainder) = u8::from_bytes(bytes)?;
        let role = match tag {
            0 => MessageRole::Proposal,
            1 => MessageRole::Confirmation,
            2 => MessageRole::Witness,
            _ => return Err(bytesrepr::Error::Formatting),
        };
        Ok((role, remainder))
    }
}

/// A validator's latest message, as known to the author of the citing message.
#[derive(
    Copy, Clone, DataSize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Justification {
    /// The cited validator.
    pub validator: ValidatorId,
    /// Its latest message known to the author.
    pub latest_hash: MessageHash,
}

impl ToBytes for Justification {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let mut buffer = bytesrepr::allocate_buffer(self)?;
        self.validator.write_bytes(&mut buffer)?;
        self.latest_hash.write_bytes(&mut buffer)?;
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        self.validator.serialized_length() + self.latest_hash.serialized_length()
    }
}

impl FromBytes for Justification {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (validator, remainder) = ValidatorId::from_bytes(bytes)?;
        let (latest_hash, remainder) = MessageHash::from_bytes(remainder)?;
        Ok((
            Justification {
                validator,
                latest_hash,
            },
            remainder,
        ))
    }
}

/// A bonded validator and its stake.
#[derive(Copy, Clone, DataSize, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    /// The validator.
    pub validator: ValidatorId,
    /// Its stake.
    pub stake: Weight,
}

impl ToBytes for Bond {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let mut buffer = bytesrepr::allocate_buffer(self)?;
        self.validator.write_bytes(&mut buffer)?;
        self.stake.write_bytes(&mut buffer)?;
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        self.validator.serialized_length() + self.stake.serialized_length()
    }
}

impl FromBytes for Bond {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (validator, remainder) = ValidatorId::from_bytes(bytes)?;
        let (stake, remainder) = Weight::from_bytes(remainder)?;
        Ok((Bond { validator, stake }, remainder))
    }
}

/// Global state hashes before and after a message, and the bonds valid afterwards.
#[derive(Clone, DataSize, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    /// State root the message was executed against.
    pub pre_state_hash: Digest,
    /// State root after execution.
    pub post_state_hash: Digest,
    /// Bonded validators.
    pub bonds: Vec<Bond>,
}

impl GlobalState {
    /// Collects the bonds into a weight map.
    pub fn weight_map(&self) -> WeightMap {
        self.bonds
            .iter()
            .map(|bond| (bond.validator, bond.stake))
            .collect()
    }
}

impl ToBytes for GlobalState {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let mut buffer = bytesrepr::allocate_buffer(self)?;
        self.pre_state_hash.write_bytes(&mut buffer)?;
        self.post_state_hash.write_bytes(&mut buffer)?;
        self.bonds.write_bytes(&mut buffer)?;
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        self.pre_state_hash.serialized_length()
            + self.post_state_hash.serialized_length()
            + self.bonds.serialized_length()
    }
}

impl FromBytes for GlobalState {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (pre_state_hash, remainder) = Digest::from_bytes(bytes)?;
        let (post_state_hash, remainder) = Digest::from_bytes(remainder)?;
        let (bonds, remainder) = Vec::<Bond>::from_bytes(remainder)?;
        Ok((
            GlobalState {
                pre_state_hash,
                post_state_hash,
                bonds,
            },
            remainder,
        ))
    }
}

/// A message header. Its canonical encoding is what gets hashed and signed.
#[derive(Clone, DataSize, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Block or ballot.
    pub message_type: MessageType,
    /// Protocol version the message was created under.
    pub protocol_version: ProtocolVersion,
    /// Creation time.
    pub timestamp: Tick,
    /// Name of the chain this message belongs to.
    pub chain_name: String,
    /// Parent hashes; the first one is the main parent.
    pub parents: Vec<MessageHash>,
    /// At most one latest message per validator.
    pub justifications: Vec<Justification>,
    /// Global state before and after.
    pub state: GlobalState,
    /// Justification rank, as declared by the producer.
    pub j_rank: u64,
    /// Main-chain rank, as declared by the producer.
    pub main_rank: u64,
    /// The producer's public key; `None` for genesis.
    pub validator_public_key: Option<PublicKey>,
    /// The hash of the producer's public key.
    pub validator_id: ValidatorId,
    /// The producer's sequence number for this message, as declared.
    pub validator_seq_num: u32,
    /// The producer's previous message.
    pub validator_prev_message_hash: Option<MessageHash>,
    /// Hash of the body.
    pub body_hash: Digest,
    /// The key block of the era.
    pub key_block_hash: Option<MessageHash>,
    /// The round this message belongs to.
    pub round_id: u64,
    /// Reserved bit.
    pub magic_bit: bool,
    /// The message's part in its round.
    pub message_role: Option<MessageRole>,
}

impl Header {
    /// Returns the hash of the canonical encoding of this header.
    pub fn hash(&self) -> Result<MessageHash, bytesrepr::Error> {
        Ok(MessageHash(Digest::hash(self.to_bytes()?)))
    }
}

impl ToBytes for Header {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let mut buffer = bytesrepr::allocate_buffer(self)?;
        self.message_type.write_bytes(&mut buffer)?;
        self.protocol_version.write_bytes(&mut buffer)?;
        self.timestamp.write_bytes(&mut buffer)?;
        self.chain_name.write_bytes(&mut buffer)?;
        self.parents.write_bytes(&mut buffer)?;
        self.justifications.write_bytes(&mut buffer)?;
        self.state.write_bytes(&mut buffer)?;
        self.j_rank.write_bytes(&mut buffer)?;
        self.main_rank.write_bytes(&mut buffer)?;
        self.validator_public_key.write_bytes(&mut buffer)?;
        self.validator_id.write_bytes(&mut buffer)?;
        self.validator_seq_num.write_bytes(&mut buffer)?;
        self.validator_prev_message_hash.write_bytes(&mut buffer)?;
        self.body_hash.write_bytes(&mut buffer)?;
        self.key_block_hash.write_bytes(&mut buffer)?;
        self.round_id.write_bytes(&mut buffer)?;
        self.magic_bit.write_bytes(&mut buffer)?;
        self.message_role.write_bytes(&mut buffer)?;
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        self.message_type.serialized_length()
            + self.protocol_version.serialized_length()
            + self.timestamp.serialized_length()
            + self.chain_name.serialized_length()
            + self.parents.serialized_length()
            + self.justifications.serialized_length()
            + self.state.serialized_length()
            + self.j_rank.serialized_length()
            + self.main_rank.serialized_length()
            + self.validator_public_key.serialized_length()
            + self.validator_id.serialized_length()
            + self.validator_seq_num.serialized_length()
            + self.validator_prev_message_hash.serialized_length()
            + self.body_hash.serialized_length()
            + self.key_block_hash.serialized_length()
            + self.round_id.serialized_length()
            + self.magic_bit.serialized_length()
            + self.message_role.serialized_length()
    }
}

impl FromBytes for Header {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (message_type, remainder) = MessageType::from_bytes(bytes)?;
        let (protocol_version, remainder) = ProtocolVersion::from_bytes(remainder)?;
        let (timestamp, remainder) = Tick::from_bytes(remainder)?;
        let (chain_name, remainder) = String::from_bytes(remainder)?;
        let (parents, remainder) = Vec::<MessageHash>::from_bytes(remainder)?;
        let (justifications, remainder) = Vec::<Justification>::from_bytes(remainder)?;
        let (state, remainder) = GlobalState::from_bytes(remainder)?;
        let (j_rank, remainder) = u64::from_bytes(remainder)?;
        let (main_rank, remainder) = u64::from_bytes(remainder)?;
        let (validator_public_key, remainder) = Option::<PublicKey>::from_bytes(remainder)?;
        let (validator_id, remainder) = ValidatorId::from_bytes(remainder)?;
        let (validator_seq_num, remainder) = u32::from_bytes(remainder)?;
        let (validator_prev_message_hash, remainder) =
            Option::<MessageHash>::from_bytes(remainder)?;
        let (body_hash, remainder) = Digest::from_bytes(remainder)?;
        let (key_block_hash, remainder) = Option::<MessageHash>::from_bytes(remainder)?;
        let (round_id, remainder) = u64::from_bytes(remainder)?;
        let (magic_bit, remainder) = bool::from_bytes(remainder)?;
        let (message_role, remainder) = Option::<MessageRole>::from_bytes(remainder)?;
        let header = Header {
            message_type,
            protocol_version,
            timestamp,
            chain_name,
            parents,
            justifications,
            state,
            j_rank,
            main_rank,
            validator_public_key,
            validator_id,
            validator_seq_num,
            validator_prev_message_hash,
            body_hash,
            key_block_hash,
            round_id,
            magic_bit,
            message_role,
        };
        Ok((header, remainder))
    }
}

/// The deploys a block executes. Ballots carry the empty body.
#[derive(Clone, DataSize, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBody {
    /// Deploys, in execution order.
    pub deploys: Vec<Deploy>,
}

impl BlockBody {
    /// Returns the hash of the canonical encoding of this body.
    pub fn hash(&self) -> Result<Digest, bytesrepr::Error> {
        Ok(Digest::hash(self.to_bytes()?))
    }
}

impl ToBytes for BlockBody {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        self.deploys.to_bytes()
    }

    fn serialized_length(&self) -> usize {
        self.deploys.serialized_length()
    }
}

impl FromBytes for BlockBody {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (deploys, remainder) = Vec::<Deploy>::from_bytes(bytes)?;
        Ok((BlockBody { deploys }, remainder))
    }
}

/// A block. Genesis is the only unsigned one.
#[derive(Clone, DataSize, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub(crate) hash: MessageHash,
    pub(crate) header: Header,
    pub(crate) body: BlockBody,
    pub(crate) signature: Option<Signature>,
}

impl Block {
    /// The block's body.
    pub fn body(&self) -> &BlockBody {
        &self.body
    }
}

/// A ballot: a signed vote for its single parent.
#[derive(Clone, DataSize, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub(crate) hash: MessageHash,
    pub(crate) header: Header,
    pub(crate) signature: Signature,
}

/// Why a message failed verification.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// The header's body hash doesn't match the body.
    #[error("body hash mismatch: header has {in_header}, body hashes to {computed}")]
    BodyHashMismatch {
        /// From the header.
        in_header: Digest,
        /// Recomputed.
        computed: Digest,
    },
    /// The stored hash doesn't match the header.
    #[error("message hash mismatch: stored {stored}, header hashes to {computed}")]
    HashMismatch {
        /// As carried.
        stored: MessageHash,
        /// Recomputed.
        computed: MessageHash,
    },
    /// The header type tag doesn't match the variant.
    #[error("{variant} carries a {in_header} header")]
    TypeMismatch {
        /// The variant.
        variant: MessageType,
        /// The header's tag.
        in_header: MessageType,
    },
    /// A message other than genesis lacks a signature or key.
    #[error("non-genesis message is unsigned")]
    Unsigned,
    /// The validator id isn't the hash of the declared key.
    #[error("validator id {validator_id} is not the hash of the declared public key")]
    ValidatorIdMismatch {
        /// As declared.
        validator_id: ValidatorId,
    },
    /// The signature doesn't verify.
    #[error("invalid signature: {0}")]
    Signature(#[from] crypto::Error),
    /// Encoding failed.
    #[error("encoding error: {0}")]
    Encoding(#[from] bytesrepr::Error),
}

/// A vertex of the consensus DAG.
#[derive(Clone, DataSize, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// A block.
    Block(Block),
    /// A ballot.
    Ballot(Ballot),
}

impl Message {
    /// The message's hash.
    pub fn hash(&self) -> &MessageHash {
        match self {
            Message::Block(block) => &block.hash,
            Message::Ballot(ballot) => &ballot.hash,
        }
    }

    /// The message's header.
    pub fn header(&self) -> &Header {
        match self {
            Message::Block(block) => &block.header,
            Message::Ballot(ballot) => &ballot.header,
        }
    }

    /// Block or ballot.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Block(_) => MessageType::Block,
            Message::Ballot(_) => MessageType::Ballot,
        }
    }

    /// The producing validator.
    pub fn validator_id(&self) -> &ValidatorId {
        &self.header().validator_id
    }

    /// Ordered parents.
    pub fn parents(&self) -> &[MessageHash] {
        &self.header().parents
    }

    /// The first parent, if any.
    pub fn main_parent(&self) -> Option<&MessageHash> {
        self.parents().first()
    }

    /// The cited latest messages.
    pub fn justifications(&self) -> &[Justification] {
        &self.header().justifications
    }

    /// The distinct hashes this message depends on: its parents and justified messages.
    pub fn dependencies(&self) -> BTreeSet<MessageHash> {
        self.parents()
            .iter()
            .copied()
            .chain(self.justifications().iter().map(|j| j.latest_hash))
            .collect()
    }

    /// The declared justification rank.
    pub fn j_rank(&self) -> u64 {
        self.header().j_rank
    }

    /// The declared main rank.
    pub fn main_rank(&self) -> u64 {
        self.header().main_rank
    }

    /// The declared sequence number.
    pub fn validator_seq_num(&self) -> u32 {
        self.header().validator_seq_num
    }

    /// The message's timestamp.
    pub fn timestamp(&self) -> Tick {
        self.header().timestamp
    }

    /// The message's round id.
    pub fn round_id(&self) -> u64 {
        self.header().round_id
    }

    /// The signature, absent only on genesis.
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Message::Block(block) => block.signature.as_ref(),
            Message::Ballot(ballot) => Some(&ballot.signature),
        }
    }

    /// The weight map a block carries; ballots never carry one.
    pub fn weight_map(&self) -> Option<WeightMap> {
        match self {
            Message::Block(block) => Some(block.header.state.weight_map()),
            Message::Ballot(_) => None,
        }
    }

    /// Global state after this message.
    pub fn post_state_hash(&self) -> &Digest {
        &self.header().state.post_state_hash
    }

    /// Returns `true` if the message has neither parents nor justifications.
    pub fn is_genesis_like(&self) -> bool {
        self.parents().is_empty() && self.justifications().is_empty()
    }

    /// Checks the body hash, the message hash and, except for genesis, the signature.
    pub fn verify(&self) -> Result<(), VerificationError> {
        let header = self.header();
        if header.message_type != self.message_type() {
            return Err(VerificationError::TypeMismatch {
                variant: self.message_type(),
                in_header: header.message_type,
            });
        }
        let body_hash = match self {
            Message::Block(block) => block.body.hash()?,
            Message::Ballot(_) => BlockBody::default().hash()?,
        };
        if body_hash != header.body_hash {
            return Err(VerificationError::BodyHashMismatch {
                in_header: header.body_hash,
                computed: body_hash,
            });
        }
        let computed = header.hash()?;
        if computed != *self.hash() {
            return Err(VerificationError::HashMismatch {
                stored: *self.hash(),
                computed,
            });
        }
        match (self.signature(), header.validator_public_key.as_ref()) {
            (None, None) if self.is_genesis_like() => Ok(()),
            (Some(signature), Some(public_key)) => {
                if public_key.to_account_hash() != header.validator_id {
                    return Err(VerificationError::ValidatorIdMismatch {
                        validator_id: header.validator_id,
                    });
                }
                signature.verify(self.hash(), public_key)?;
                Ok(())
            }
            _ => Err(VerificationError::Unsigned),
        }
    }
}

impl Display for Message {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(
            formatter,
            "{} {} by {} (seq {}, j-rank {})",
            self.message_type(),
            self.hash(),
            self.validator_id(),
            self.validator_seq_num(),
            self.j_rank()
        )
    }
}
