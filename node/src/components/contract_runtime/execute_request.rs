use std::mem;

use datasize::DataSize;
use serde::{Deserialize, Serialize};

use highway_types::{
    bytesrepr::{self, FromBytes, ToBytes},
    Digest, ProtocolVersion, Tick,
};

use super::{DeployItem, Error};

/// A batch of deploys to execute on top of one global state.
#[derive(Clone, DataSize, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// The state the first deploy runs against.
    pub parent_state_hash: Digest,
    /// Timestamp of the block being executed.
    pub block_time: Tick,
    /// Deploys in execution order.
    pub deploys: Vec<DeployItem>,
    /// Protocol version to execute under.
    pub protocol_version: ProtocolVersion,
}

impl ExecuteRequest {
    /// Creates a request.
    pub fn new(
        parent_state_hash: Digest,
        block_time: Tick,
        deploys: Vec<DeployItem>,
        protocol_version: ProtocolVersion,
    ) -> Self {
        Self {
            parent_state_hash,
            block_time,
            deploys,
            protocol_version,
        }
    }

    /// Splits `deploys` into requests that each serialize to strictly fewer than
    /// `max_request_size` bytes, keeping their order.
    ///
    /// Every request shares `parent_state_hash`; callers executing them in sequence replace it
    /// with the previous request's post-state.  An empty input yields no requests.
    pub fn batches(
        parent_state_hash: Digest,
        block_time: Tick,
        deploys: Vec<DeployItem>,
        protocol_version: ProtocolVersion,
        max_request_size: usize,
    ) -> Result<Vec<ExecuteRequest>, Error> {
        let empty = ExecuteRequest::new(parent_state_hash, block_time, vec![], protocol_version);
        // The deploy count prefix has a fixed width, so the base size never changes.
        let base_size = empty.serialized_length();

        let mut requests = vec![];
        let mut current = empty.clone();
        let mut current_size = base_size;
        for deploy in deploys {
            let deploy_size = deploy.serialized_length();
            if base_size + deploy_size >= max_request_size {
                return Err(Error::DeployTooLarge {
                    deploy_hash: deploy.deploy_hash,
                    size: base_size + deploy_size,
                    max_request_size,
                });
            }
            if current_size + deploy_size >= max_request_size {
                requests.push(mem::replace(&mut current, empty.clone()));
                current_size = base_size;
            }
            current_size += deploy_size;
            current.deploys.push(deploy);
        }
        if !current.deploys.is_empty() {
            requests.push(current);
        }
        Ok(requests)
    }
}

impl ToBytes for ExecuteRequest {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let mut buffer = bytesrepr::allocate_buffer(self)?;
        self.parent_state_hash.write_bytes(&mut buffer)?;
        self.block_time.write_bytes(&mut buffer)?;
        self.deploys.write_bytes(&mut buffer)?;
        self.protocol_version.write_bytes(&mut buffer)?;
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        self.parent_state_hash.serialized_length()
            + self.block_time.serialized_length()
            + self.deploys.serialized_length()
            + self.protocol_version.serialized_length()
    }
}

impl FromBytes for ExecuteRequest {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (parent_state_hash, remainder) = Digest::from_bytes(bytes)?;
        let (block_time, remainder) = Tick::from_bytes(remainder)?;
        let (deploys, remainder) = Vec::<DeployItem>::from_bytes(remainder)?;
        let (protocol_version, remainder) = ProtocolVersion::from_bytes(remainder)?;
        let request = ExecuteRequest::new(parent_state_hash, block_time, deploys, protocol_version);
        Ok((request, remainder))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use highway_types::{bytesrepr::Bytes, AccountHash, ExecutableDeployItem};

    use super::*;
    use crate::types::DeployHash;

    fn item(index: u8, module_size: usize) -> DeployItem {
        DeployItem {
            address: AccountHash::new([index; 32]),
            session: ExecutableDeployItem::ModuleBytes {
                module_bytes: Bytes::from(vec![index; module_size]),
                args: Bytes::from(vec![0, 0, 0, 0]),
            },
            payment: ExecutableDeployItem::Transfer {
                args: Bytes::from(vec![0, 0, 0, 0]),
            },
            gas_price: 1,
            authorization_keys: BTreeSet::new(),
            deploy_hash: DeployHash::new(Digest::hash([index])),
        }
    }

    fn batches(items: Vec<DeployItem>, limit: usize) -> Result<Vec<ExecuteRequest>, Error> {
        ExecuteRequest::batches(
            Digest::hash(b"pre-state"),
            Tick::from(42),
            items,
            ProtocolVersion::V1_0_0,
            limit,
        )
    }

    fn base_size() -> usize {
        ExecuteRequest::new(
            Digest::default(),
            Tick::ZERO,
            vec![],
            ProtocolVersion::V1_0_0,
        )
        .serialized_length()
    }

    #[test]
    fn empty_input_yields_no_requests() {
        assert!(batches(vec![], 1024).unwrap().is_empty());
    }

    #[test]
    fn limit_is_exclusive() {
        let items = vec![item(1, 10), item(2, 10)];
        let exact = base_size() + items[0].serialized_length() + items[1].serialized_length();

        let together = batches(items.clone(), exact + 1).unwrap();
        assert_eq!(together.len(), 1);
        assert_eq!(together[0].serialized_length(), exact);

        let split = batches(items, exact).unwrap();
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn oversized_deploy_is_reported() {
        let big = item(7, 500);
        let size = base_size() + big.serialized_length();
        match batches(vec![item(1, 1), big.clone()], size) {
            Err(Error::DeployTooLarge {
                deploy_hash,
                size: reported,
                max_request_size,
            }) => {
                assert_eq!(deploy_hash, big.deploy_hash);
                assert_eq!(reported, size);
                assert_eq!(max_request_size, size);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn request_encoding_matches_length() {
        let request = ExecuteRequest::new(
            Digest::hash(b"state"),
            Tick::from(9),
            vec![item(3, 17), item(4, 0)],
            ProtocolVersion::V1_0_0,
        );
        bytesrepr::test_serialization_roundtrip(&request);
    }

    proptest! {
        #[test]
        fn batches_stay_below_limit_and_keep_order(
            sizes in prop::collection::vec(0usize..300, 1..40),
            slack in 1usize..2_000,
        ) {
            let items: Vec<_> = sizes
                .iter()
                .enumerate()
                .map(|(index, size)| item(index as u8, *size))
                .collect();
            let largest = items.iter().map(ToBytes::serialized_length).max().unwrap_or(0);
            let limit = base_size() + largest + slack;

            let requests = batches(items.clone(), limit).unwrap();
            for request in &requests {
                prop_assert!(!request.deploys.is_empty());
                prop_assert!(request.serialized_length() < limit);
                prop_assert_eq!(request.to_bytes().unwrap().len(), request.serialized_length());
            }
            let rejoined: Vec<_> = requests
                .into_iter()
                .flat_map(|request| request.deploys)
                .collect();
            prop_assert_eq!(rejoined, items);
        }
    }
}
