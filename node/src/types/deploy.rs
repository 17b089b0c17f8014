//! Deploys: signed requests to run payment and session code.

use std::fmt::{self, Debug, Display, Formatter};

use datasize::DataSize;
use derive_more::From;
use hex_fmt::HexFmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use highway_types::{
    bytesrepr::{self, Bytes, FromBytes, ToBytes},
    crypto, Digest, ExecutableDeployItem, PublicKey, SecretKey, Signature, SignatureAlgorithm, Tick,
    TimeDiff,
};

/// The hash of a deploy's header.
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
pub struct DeployHash(Digest);

impl DeployHash {
    /// Constructs a new `DeployHash`.
    pub fn new(hash: Digest) -> Self {
        DeployHash(hash)
    }

    /// Returns the wrapped inner hash.
    pub fn inner(&self) -> &Digest {
        &self.0
    }
}

impl Display for DeployHash {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "deploy-hash({:10})", HexFmt(&self.0))
    }
}

impl Debug for DeployHash {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "DeployHash({})", HexFmt(&self.0))
    }
}

impl AsRef<[u8]> for DeployHash {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl ToBytes for DeployHash {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        self.0.to_bytes()
    }

    fn serialized_length(&self) -> usize {
        self.0.serialized_length()
    }
}

impl FromBytes for DeployHash {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        Digest::from_bytes(bytes).map(|(inner, remainder)| (DeployHash(inner), remainder))
    }
}

/// The header portion of a deploy.
#[derive(Clone, DataSize, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct DeployHeader {
    /// The account paying for the deploy.
    pub account: PublicKey,
    /// Creation time.
    pub timestamp: Tick,
    /// How long the deploy stays valid.
    pub ttl: TimeDiff,
    /// Price per unit of gas.
    pub gas_price: u64,
    /// Hash of the payment and session items.
    pub body_hash: Digest,
    /// Deploys that must execute first.
    pub dependencies: Vec<DeployHash>,
    /// Name of the target chain.
    pub chain_name: String,
}

impl ToBytes for DeployHeader {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let mut buffer = bytesrepr::allocate_buffer(self)?;
        self.account.write_bytes(&mut buffer)?;
        self.timestamp.write_bytes(&mut buffer)?;
        self.ttl.write_bytes(&mut buffer)?;
        self.gas_price.write_bytes(&mut buffer)?;
        self.body_hash.write_bytes(&mut buffer)?;
        self.dependencies.write_bytes(&mut buffer)?;
        self.chain_name.write_bytes(&mut buffer)?;
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        self.account.serialized_length()
            + self.timestamp.serialized_length()
            + self.ttl.serialized_length()
            + self.gas_price.serialized_length()
            + self.body_hash.serialized_length()
            + self.dependencies.serialized_length()
            + self.chain_name.serialized_length()
    }
}

impl FromBytes for DeployHeader {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (account, remainder) = PublicKey::from_bytes(bytes)?;
        let (timestamp, remainder) = Tick::from_bytes(remainder)?;
        let (ttl, remainder) = TimeDiff::from_bytes(remainder)?;
        let (gas_price, remainder) = u64::from_bytes(remainder)?;
        let (body_hash, remainder) = Digest::from_bytes(remainder)?;
        let (dependencies, remainder) = Vec::<DeployHash>::from_bytes(remainder)?;
        let (chain_name, remainder) = String::from_bytes(remainder)?;
        let header = DeployHeader {
            account,
            timestamp,
            ttl,
            gas_price,
            body_hash,
            dependencies,
            chain_name,
        };
        Ok((header, remainder))
    }
}

/// A signature over the deploy hash by one of the authorizing keys.
///
/// The approver's key is kept as raw bytes; the signature's algorithm name says how to read it.
#[derive(Clone, DataSize, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug)]
pub struct Approval {
    approver_public_key: Bytes,
    signature: Signature,
}

impl Approval {
    /// Creates an approval of `deploy_hash` signed with `secret_key`.
    pub fn create(deploy_hash: &DeployHash, secret_key: &SecretKey) -> Self {
        let signature = secret_key.sign(deploy_hash);
        Approval {
            approver_public_key: Bytes::from(secret_key.public_key().as_bytes().to_vec()),
            signature,
        }
    }

    /// Creates an approval from its parts without checking them.
    pub fn from_parts(approver_public_key: Bytes, signature: Signature) -> Self {
        Approval {
            approver_public_key,
            signature,
        }
    }

    /// The approver's raw public key.
    pub fn approver_public_key(&self) -> &Bytes {
        &self.approver_public_key
    }

    /// The approver's signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

impl ToBytes for Approval {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let mut buffer = bytesrepr::allocate_buffer(self)?;
        self.approver_public_key.write_bytes(&mut buffer)?;
        self.signature.write_bytes(&mut buffer)?;
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        self.approver_public_key.serialized_length() + self.signature.serialized_length()
    }
}

impl FromBytes for Approval {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (approver_public_key, remainder) = Bytes::from_bytes(bytes)?;
        let (signature, remainder) = Signature::from_bytes(remainder)?;
        Ok((
            Approval {
                approver_public_key,
                signature,
            },
            remainder,
        ))
    }
}

/// A deploy whose hashes don't match its contents.
#[derive(Debug, Error)]
pub enum DeployValidationError {
    /// The header's body hash doesn't match the payment and session items.
    #[error("invalid body hash in {deploy_hash}")]
    InvalidBodyHash {
        /// The deploy.
        deploy_hash: DeployHash,
    },
    /// The deploy hash doesn't match the header.
    #[error("invalid deploy hash {deploy_hash}")]
    InvalidDeployHash {
        /// The deploy.
        deploy_hash: DeployHash,
    },
    /// The deploy carries no approvals.
    #[error("{deploy_hash} has no approvals")]
    NoApprovals {
        /// The deploy.
        deploy_hash: DeployHash,
    },
    /// An approval failed to verify.
    #[error("approval {index} of {deploy_hash} is invalid: {error}")]
    InvalidApproval {
        /// The deploy.
        deploy_hash: DeployHash,
        /// Position in the approvals list.
        index: usize,
        /// The failure.
        error: crypto::Error,
    },
    /// Encoding failed.
    #[error(transparent)]
    Encoding(#[from] bytesrepr::Error),
}

/// A deploy: payment and session code plus the approvals authorizing them.
#[derive(Clone, DataSize, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct Deploy {
    hash: DeployHash,
    header: DeployHeader,
    payment: ExecutableDeployItem,
    session: ExecutableDeployItem,
    approvals: Vec<Approval>,
}

impl Deploy {
    /// Constructs a new deploy approved by `secret_key`, whose public key becomes the account.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: Tick,
        ttl: TimeDiff,
        gas_price: u64,
        dependencies: Vec<DeployHash>,
        chain_name: String,
        payment: ExecutableDeployItem,
        session: ExecutableDeployItem,
        secret_key: &SecretKey,
    ) -> Result<Deploy, bytesrepr::Error> {
        let body_hash = body_hash(&payment, &session)?;
        let header = DeployHeader {
            account: secret_key.public_key(),
            timestamp,
            ttl,
            gas_price,
            body_hash,
            dependencies,
            chain_name,
        };
        let hash = DeployHash::new(Digest::hash(header.to_bytes()?));
        let approval = Approval::create(&hash, secret_key);
        Ok(Deploy {
            hash,
            header,
            payment,
            session,
            approvals: vec![approval],
        })
    }

    /// Returns the hash uniquely identifying this deploy.
    pub fn id(&self) -> &DeployHash {
        &self.hash
    }

    /// Returns a reference to the `DeployHeader` of this `Deploy`.
    pub fn header(&self) -> &DeployHeader {
        &self.header
    }

    /// Returns the payment code.
    pub fn payment(&self) -> &ExecutableDeployItem {
        &self.payment
    }

    /// Returns the session code.
    pub fn session(&self) -> &ExecutableDeployItem {
        &self.session
    }

    /// Returns the approvals.
    pub fn approvals(&self) -> &[Approval] {
        &self.approvals
    }

    /// Adds a further approval.
    pub fn push_approval(&mut self, approval: Approval) {
        self.approvals.push(approval);
    }

    /// Signs the deploy hash with `secret_key` and adds the approval.
    pub fn sign(&mut self, secret_key: &SecretKey) {
        let approval = Approval::create(&self.hash, secret_key);
        self.approvals.push(approval);
    }

    /// Checks both hashes and every approval.
    pub fn is_valid(&self) -> Result<(), DeployValidationError> {
        let deploy_hash = self.hash;
        if body_hash(&self.payment, &self.session)? != self.header.body_hash {
            return Err(DeployValidationError::InvalidBodyHash { deploy_hash });
        }
        if Digest::hash(self.header.to_bytes()?) != *deploy_hash.inner() {
            return Err(DeployValidationError::InvalidDeployHash { deploy_hash });
        }
        if self.approvals.is_empty() {
            return Err(DeployValidationError::NoApprovals { deploy_hash });
        }
        for (index, approval) in self.approvals.iter().enumerate() {
            let verified = approval
                .signature
                .algorithm
                .parse::<SignatureAlgorithm>()
                .and_then(|algorithm| {
                    PublicKey::from_algorithm_bytes(
                        algorithm,
                        approval.approver_public_key.as_ref(),
                    )
                })
                .and_then(|public_key| approval.signature.verify(&deploy_hash, &public_key));
            if let Err(error) = verified {
                return Err(DeployValidationError::InvalidApproval {
                    deploy_hash,
                    index,
                    error,
                });
            }
        }
        Ok(())
    }
}

fn body_hash(
    payment: &ExecutableDeployItem,
    session: &ExecutableDeployItem,
) -> Result<Digest, bytesrepr::Error> {
    Ok(Digest::hash_pair(payment.to_bytes()?, session.to_bytes()?))
}

impl Display for Deploy {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(
            formatter,
            "deploy {} from {} with {} approvals",
            self.hash,
            self.header.account,
            self.approvals.len()
        )
    }
}

impl ToBytes for Deploy {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let mut buffer = bytesrepr::allocate_buffer(self)?;
        self.hash.write_bytes(&mut buffer)?;
        self.header.write_bytes(&mut buffer)?;
        self.payment.write_bytes(&mut buffer)?;
        self.session.write_bytes(&mut buffer)?;
        self.approvals.write_bytes(&mut buffer)?;
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        self.hash.serialized_length()
            + self.header.serialized_length()
            + self.payment.serialized_length()
            + self.session.serialized_length()
            + self.approvals.serialized_length()
    }
}

impl FromBytes for Deploy {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (hash, remainder) = DeployHash::from_bytes(bytes)?;
        let (header, remainder) = DeployHeader::from_bytes(remainder)?;
        let (payment, remainder) = ExecutableDeployItem::from_bytes(remainder)?;
        let (session, remainder) = ExecutableDeployItem::from_bytes(remainder)?;
        let (approvals, remainder) = Vec::<Approval>::from_bytes(remainder)?;
        let deploy = Deploy {
            hash,
            header,
            payment,
            session,
            approvals,
        };
        Ok((deploy, remainder))
    }
}

#[cfg(test)]
mod tests {
    use highway_types::{bytesrepr::Bytes, testing::TestRng, RuntimeArgs};

    use super::*;

    fn transfer(rng: &mut TestRng) -> Deploy {
        let secret_key = SecretKey::random(rng);
        let mut args = RuntimeArgs::new();
        args.insert("amount", 1_000u64).unwrap();
        let session = ExecutableDeployItem::Transfer {
            args: Bytes::from(args.to_bytes().unwrap()),
        };
        let payment = ExecutableDeployItem::ModuleBytes {
            module_bytes: Bytes::new(),
            args: Bytes::from(RuntimeArgs::new().to_bytes().unwrap()),
        };
        Deploy::new(
            Tick::from(1_000),
            TimeDiff::from_seconds(60),
            1,
            vec![],
            "highway-test".to_string(),
            payment,
            session,
            &secret_key,
        )
        .unwrap()
    }

    #[test]
    fn new_deploy_is_valid() {
        let mut rng = TestRng::new();
        let deploy = transfer(&mut rng);
        deploy.is_valid().unwrap();
        bytesrepr::test_serialization_roundtrip(&deploy);
    }

    #[test]
    fn header_and_approval_bytesrepr_roundtrip() {
        let mut rng = TestRng::new();
        let mut deploy = transfer(&mut rng);
        deploy.header.dependencies = vec![DeployHash::new(Digest::hash(b"dependency"))];
        bytesrepr::test_serialization_roundtrip(deploy.header());
        bytesrepr::test_serialization_roundtrip(&deploy.approvals()[0]);

        let bytes = deploy.header.to_bytes().unwrap();
        let (decoded, remainder) = DeployHeader::from_bytes(&bytes).unwrap();
        assert!(remainder.is_empty());
        assert_eq!(decoded.account, deploy.header.account);
    }

    #[test]
    fn tampered_header_is_detected() {
        let mut rng = TestRng::new();
        let mut deploy = transfer(&mut rng);
        deploy.header.gas_price = 2;
        assert!(matches!(
            deploy.is_valid(),
            Err(DeployValidationError::InvalidDeployHash { .. })
        ));
    }

    #[test]
    fn approval_by_unknown_algorithm_is_rejected() {
        let mut rng = TestRng::new();
        let mut deploy = transfer(&mut rng);
        let mut signature = deploy.approvals[0].signature.clone();
        signature.algorithm = "secp256k1".to_string();
        deploy.push_approval(Approval::from_parts(
            deploy.approvals[0].approver_public_key.clone(),
            signature,
        ));
        match deploy.is_valid() {
            Err(DeployValidationError::InvalidApproval { index, error, .. }) => {
                assert_eq!(index, 1);
                assert!(matches!(error, crypto::Error::UnknownAlgorithm(_)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
