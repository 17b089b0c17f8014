use std::collections::BTreeSet;

use datasize::DataSize;
use serde::{Deserialize, Serialize};

use highway_types::{
    bytesrepr::{self, FromBytes, ToBytes, U64_SERIALIZED_LENGTH},
    AccountHash, ExecutableDeployItem, SignatureAlgorithm,
};

use super::Error;
use crate::types::{Deploy, DeployHash};

/// A deploy as the execution engine sees it.
#[derive(Clone, DataSize, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployItem {
    /// The account the deploy runs as.
    pub address: AccountHash,
    /// Session code.
    pub session: ExecutableDeployItem,
    /// Payment code.
    pub payment: ExecutableDeployItem,
    /// Gas price offered by the account.
    pub gas_price: u64,
    /// Hashes of every key that approved the deploy.
    pub authorization_keys: BTreeSet<AccountHash>,
    /// The deploy's identity.
    pub deploy_hash: DeployHash,
}

impl ToBytes for DeployItem {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let mut buffer = bytesrepr::allocate_buffer(self)?;
        self.address.write_bytes(&mut buffer)?;
        self.session.write_bytes(&mut buffer)?;
        self.payment.write_bytes(&mut buffer)?;
        self.gas_price.write_bytes(&mut buffer)?;
        self.authorization_keys
            .iter()
            .collect::<Vec<_>>()
            .write_bytes(&mut buffer)?;
        self.deploy_hash.write_bytes(&mut buffer)?;
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        self.address.serialized_length()
            + self.session.serialized_length()
            + self.payment.serialized_length()
            + U64_SERIALIZED_LENGTH
            + self
                .authorization_keys
                .iter()
                .collect::<Vec<_>>()
                .serialized_length()
            + self.deploy_hash.serialized_length()
    }
}

impl FromBytes for DeployItem {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (address, remainder) = AccountHash::from_bytes(bytes)?;
        let (session, remainder) = ExecutableDeployItem::from_bytes(remainder)?;
        let (payment, remainder) = ExecutableDeployItem::from_bytes(remainder)?;
        let (gas_price, remainder) = u64::from_bytes(remainder)?;
        let (authorization_keys, remainder) = Vec::<AccountHash>::from_bytes(remainder)?;
        let (deploy_hash, remainder) = DeployHash::from_bytes(remainder)?;
        let item = DeployItem {
            address,
            session,
            payment,
            gas_price,
            authorization_keys: authorization_keys.into_iter().collect(),
            deploy_hash,
        };
        Ok((item, remainder))
    }
}

impl Deploy {
    /// Translates this deploy into the engine's input format.
    ///
    /// Fails if an approval names an unknown signature algorithm or if the payment or session
    /// arguments don't decode.
    pub fn to_deploy_item(&self) -> Result<DeployItem, Error> {
        let authorization_keys = self
            .approvals()
            .iter()
            .map(|approval| {
                let algorithm = approval
                    .signature()
                    .algorithm
                    .parse::<SignatureAlgorithm>()
                    .map_err(Error::Approval)?;
                Ok(AccountHash::from_public_key(
                    algorithm.name(),
                    approval.approver_public_key(),
                ))
            })
            .collect::<Result<BTreeSet<_>, Error>>()?;
        self.payment()
            .clone()
            .into_runtime_args()
            .map_err(Error::Args)?;
        self.session()
            .clone()
            .into_runtime_args()
            .map_err(Error::Args)?;
        Ok(DeployItem {
            address: self.header().account.to_account_hash(),
            session: self.session().clone(),
            payment: self.payment().clone(),
            gas_price: self.header().gas_price,
            authorization_keys,
            deploy_hash: *self.id(),
        })
    }
}

#[cfg(test)]
mod tests {
    use highway_types::{
        bytesrepr::Bytes, crypto, testing::TestRng, RuntimeArgs, SecretKey, Signature, Tick,
        TimeDiff,
    };

    use super::*;
    use crate::types::Approval;

    fn transfer(amount: u64) -> ExecutableDeployItem {
        let mut args = RuntimeArgs::new();
        args.insert("amount", amount).unwrap();
        ExecutableDeployItem::Transfer {
            args: Bytes::from(args.to_bytes().unwrap()),
        }
    }

    fn deploy(rng: &mut TestRng, session: ExecutableDeployItem) -> (Deploy, SecretKey) {
        let secret_key = SecretKey::random(rng);
        let deploy = Deploy::new(
            Tick::from(1_000),
            TimeDiff::from_seconds(60),
            1,
            vec![],
            "highway-test".to_string(),
            transfer(10),
            session,
            &secret_key,
        )
        .unwrap();
        (deploy, secret_key)
    }

    #[test]
    fn authorization_keys_come_from_approvals() {
        let mut rng = TestRng::new();
        let (mut deploy, secret_key) = deploy(&mut rng, transfer(500));
        let other_key = SecretKey::random(&mut rng);
        deploy.sign(&other_key);

        let item = deploy.to_deploy_item().unwrap();
        assert_eq!(item.address, secret_key.public_key().to_account_hash());
        assert_eq!(item.deploy_hash, *deploy.id());
        let expected: BTreeSet<_> = vec![
            secret_key.public_key().to_account_hash(),
            other_key.public_key().to_account_hash(),
        ]
        .into_iter()
        .collect();
        assert_eq!(item.authorization_keys, expected);
        bytesrepr::test_serialization_roundtrip(&item);
    }

    #[test]
    fn malformed_args_are_rejected() {
        let mut rng = TestRng::new();
        let session = ExecutableDeployItem::StoredContractByName {
            name: "faucet".to_string(),
            entry_point: "claim".to_string(),
            args: Bytes::from(vec![9, 9, 9]),
        };
        let (deploy, _) = deploy(&mut rng, session);
        assert!(matches!(deploy.to_deploy_item(), Err(Error::Args(_))));
    }

    #[test]
    fn unknown_approval_algorithm_is_rejected() {
        let mut rng = TestRng::new();
        let (mut deploy, _) = deploy(&mut rng, transfer(1));
        let signature = Signature {
            algorithm: "secp256k1".to_string(),
            bytes: Bytes::from(vec![0; 64]),
        };
        deploy.push_approval(Approval::from_parts(Bytes::from(vec![0; 33]), signature));
        match deploy.to_deploy_item() {
            Err(Error::Approval(crypto::Error::UnknownAlgorithm(name))) => {
                assert_eq!(name, "secp256k1")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
