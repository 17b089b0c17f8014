//! Named arguments passed along with a deploy.

use datasize::DataSize;
use serde::{Deserialize, Serialize};

use crate::bytesrepr::{self, Bytes, Error, FromBytes, ToBytes};

/// A single named argument; the value is already in canonical byte form.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Serialize, Deserialize, Debug, DataSize)]
pub struct NamedArg(String, Bytes);

impl NamedArg {
    /// ctor
    pub fn new(name: String, value: Bytes) -> Self {
        NamedArg(name, value)
    }

    /// returns `name`
    pub fn name(&self) -> &str {
        &self.0
    }

    /// returns the serialized value
    pub fn value(&self) -> &Bytes {
        &self.1
    }
}

impl ToBytes for NamedArg {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut result = bytesrepr::allocate_buffer(self)?;
        self.0.write_bytes(&mut result)?;
        self.1.write_bytes(&mut result)?;
        Ok(result)
    }

    fn serialized_length(&self) -> usize {
        self.0.serialized_length() + self.1.serialized_length()
    }
}

impl FromBytes for NamedArg {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (name, remainder) = String::from_bytes(bytes)?;
        let (value, remainder) = Bytes::from_bytes(remainder)?;
        Ok((NamedArg(name, value), remainder))
    }
}

/// Represents a collection of arguments passed to a smart contract.
#[derive(
    PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Serialize, Deserialize, Debug, Default, DataSize,
)]
pub struct RuntimeArgs(Vec<NamedArg>);

impl RuntimeArgs {
    /// Create an empty [`RuntimeArgs`] instance.
    pub fn new() -> RuntimeArgs {
        RuntimeArgs::default()
    }

    /// Gets an argument's serialized value by its name.
    pub fn get(&self, name: &str) -> Option<&Bytes> {
        self.0.iter().find_map(|NamedArg(named_name, named_value)| {
            if named_name == name {
                Some(named_value)
            } else {
                None
            }
        })
    }

    /// Get length of the collection.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if collection of arguments is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serializes `value` and appends it under `key`.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Result<(), Error>
    where
        K: Into<String>,
        V: ToBytes,
    {
        let value = Bytes::from(value.into_bytes()?);
        self.0.push(NamedArg(key.into(), value));
        Ok(())
    }

    /// Returns an iterator of references over all arguments in insertion order.
    pub fn named_args(&self) -> impl Iterator<Item = &NamedArg> {
        self.0.iter()
    }
}

impl From<Vec<NamedArg>> for RuntimeArgs {
    fn from(values: Vec<NamedArg>) -> Self {
        RuntimeArgs(values)
    }
}

impl From<RuntimeArgs> for Vec<NamedArg> {
    fn from(args: RuntimeArgs) -> Self {
        args.0
    }
}

impl ToBytes for RuntimeArgs {
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        self.0.to_bytes()
    }

    fn serialized_length(&self) -> usize {
        self.0.serialized_length()
    }
}

impl FromBytes for RuntimeArgs {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), Error> {
        let (args, remainder) = Vec::<NamedArg>::from_bytes(bytes)?;
        Ok((RuntimeArgs(args), remainder))
    }
}
