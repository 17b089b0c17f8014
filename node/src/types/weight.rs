use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    iter::{FromIterator, Sum},
    ops::{Div, Mul},
};

use datasize::DataSize;
use derive_more::{Add, AddAssign, From, Into, Sub, SubAssign};
use serde::{Deserialize, Serialize};

use highway_types::bytesrepr::{self, FromBytes, ToBytes};

use super::ValidatorId;

/// A validator's bonded stake, used as its vote weight.
#[derive(
    Copy,
    Clone,
    DataSize,
    Default,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Add,
    Sub,
    AddAssign,
    SubAssign,
    From,
    Into,
    Serialize,
    Deserialize,
)]
pub struct Weight(pub u64);

impl Weight {
    /// Checked addition. Returns `None` if overflow occurred.
    pub fn checked_add(self, rhs: Weight) -> Option<Weight> {
        Some(Weight(self.0.checked_add(rhs.0)?))
    }

    /// Addition capped at `u64::MAX`.
    pub fn saturating_add(self, rhs: Weight) -> Weight {
        Weight(self.0.saturating_add(rhs.0))
    }

    /// Returns `true` for zero weight.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Display for Weight {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Sum for Weight {
    fn sum<I: Iterator<Item = Weight>>(iter: I) -> Self {
        iter.fold(Weight(0), Weight::saturating_add)
    }
}

impl<'a> Sum<&'a Weight> for Weight {
    fn sum<I: Iterator<Item = &'a Weight>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Mul<u64> for Weight {
    type Output = Self;

    fn mul(self, rhs: u64) -> Self {
        Weight(self.0 * rhs)
    }
}

impl Div<u64> for Weight {
    type Output = Self;

    fn div(self, rhs: u64) -> Self {
        Weight(self.0 / rhs)
    }
}

impl From<Weight> for u128 {
    fn from(Weight(w): Weight) -> u128 {
        u128::from(w)
    }
}

impl ToBytes for Weight {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        self.0.to_bytes()
    }

    fn serialized_length(&self) -> usize {
        self.0.serialized_length()
    }
}

impl FromBytes for Weight {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (inner, remainder) = u64::from_bytes(bytes)?;
        Ok((Weight(inner), remainder))
    }
}

/// The bonded stake of each validator, as carried by a block.
#[derive(Clone, DataSize, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightMap(BTreeMap<ValidatorId, Weight>);

impl WeightMap {
    /// Returns the stake of `validator`, or zero if it is not bonded.
    pub fn weight(&self, validator: &ValidatorId) -> Weight {
        self.0.get(validator).copied().unwrap_or_default()
    }

    /// The sum of all stakes.
    pub fn total_weight(&self) -> Weight {
        self.0.values().sum()
    }

    /// Iterates over validators with their stakes, in validator order.
    pub fn iter(&self) -> impl Iterator<Item = (&ValidatorId, &Weight)> {
        self.0.iter()
    }

    /// Iterates over the validators with non-zero stake.
    pub fn bonded_validators(&self) -> impl Iterator<Item = &ValidatorId> {
        self.0
            .iter()
            .filter(|(_, weight)| !weight.is_zero())
            .map(|(validator, _)| validator)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(ValidatorId, Weight)> for WeightMap {
    fn from_iter<I: IntoIterator<Item = (ValidatorId, Weight)>>(iter: I) -> Self {
        WeightMap(iter.into_iter().collect())
    }
}

impl From<BTreeMap<ValidatorId, Weight>> for WeightMap {
    fn from(map: BTreeMap<ValidatorId, Weight>) -> Self {
        WeightMap(map)
    }
}

#[cfg(test)]
mod tests {
    use highway_types::AccountHash;

    use super::*;

    #[test]
    fn unbonded_validator_has_zero_weight() {
        let alice = AccountHash::new([1; 32]);
        let bob = AccountHash::new([2; 32]);
        let carol = AccountHash::new([3; 32]);
        let map: WeightMap = vec![(alice, Weight(5)), (bob, Weight(0))]
            .into_iter()
            .collect();

        assert_eq!(map.weight(&alice), Weight(5));
        assert_eq!(map.weight(&carol), Weight(0));
        assert_eq!(map.bonded_validators().collect::<Vec<_>>(), vec![&alice]);
    }

    #[test]
    fn total_weight_saturates() {
        let map: WeightMap = vec![
            (AccountHash::new([1; 32]), Weight(u64::MAX)),
            (AccountHash::new([2; 32]), Weight(7)),
        ]
        .into_iter()
        .collect();
        assert_eq!(map.total_weight(), Weight(u64::MAX));
        assert_eq!(WeightMap::default().total_weight(), Weight(0));
    }
}
