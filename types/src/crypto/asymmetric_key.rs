use std::{
    cmp::Ordering,
    convert::TryFrom,
    fmt::{self, Debug, Display, Formatter},
    fs,
    hash::{Hash, Hasher},
    path::Path,
    str::FromStr,
};

use datasize::DataSize;
use ed25519_dalek::{
    ExpandedSecretKey, PublicKey as Ed25519PublicKey, SecretKey as Ed25519SecretKey,
    Signature as Ed25519Signature,
};
use hex_fmt::HexFmt;
use pem::Pem;
#[cfg(any(feature = "testing", test))]
use rand::RngCore;
use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serialize, Serializer};

use super::Error;
#[cfg(any(feature = "testing", test))]
use crate::testing::TestRng;
use crate::{
    bytesrepr::{self, Bytes, FromBytes, ToBytes, U8_SERIALIZED_LENGTH},
    AccountHash,
};

const ED25519_TAG: u8 = 1;
const ED25519: &str = "ed25519";

const ED25519_PEM_SECRET_KEY_TAG: &str = "PRIVATE KEY";
// PKCS#8 wrapping of a raw Ed25519 seed (RFC 8410): the DER bytes up to the 32-byte key.
const ED25519_PKCS8_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

/// A signature algorithm, selected by the name embedded in every signature.
#[derive(DataSize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignatureAlgorithm {
    /// EdDSA over Curve25519.
    Ed25519,
}

impl SignatureAlgorithm {
    /// The name carried verbatim in signatures and hashed into account hashes.
    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Ed25519 => ED25519,
        }
    }

    /// Signs `data`, typically a message's header hash, with `secret_key`.
    pub fn sign<T: AsRef<[u8]>>(&self, data: T, secret_key: &SecretKey) -> Signature {
        match (self, secret_key) {
            (SignatureAlgorithm::Ed25519, SecretKey::Ed25519(secret_key)) => {
                let public_key = Ed25519PublicKey::from(secret_key);
                let expanded = ExpandedSecretKey::from(secret_key);
                let signature = expanded.sign(data.as_ref(), &public_key);
                Signature {
                    algorithm: self.name().to_string(),
                    bytes: Bytes::from(signature.to_bytes().to_vec()),
                }
            }
        }
    }

    /// Verifies raw signature bytes over `data` against `public_key`.
    pub fn verify<T: AsRef<[u8]>>(
        &self,
        data: T,
        signature: &[u8],
        public_key: &PublicKey,
    ) -> Result<(), Error> {
        match (self, public_key) {
            (SignatureAlgorithm::Ed25519, PublicKey::Ed25519(public_key)) => {
                let signature = Ed25519Signature::try_from(signature)?;
                public_key
                    .verify_strict(data.as_ref(), &signature)
                    .map_err(|_| {
                        Error::AsymmetricKey(String::from("failed to verify Ed25519 signature"))
                    })
            }
        }
    }

    /// Returns the hash identifying the holder of `public_key`.
    pub fn public_key_hash(&self, public_key: &PublicKey) -> AccountHash {
        AccountHash::from_public_key(self.name(), public_key.as_bytes())
    }
}

impl Display for SignatureAlgorithm {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            ED25519 => Ok(SignatureAlgorithm::Ed25519),
            other => Err(Error::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// A secret or private asymmetric key.
pub enum SecretKey {
    /// Ed25519 secret key.
    Ed25519(Ed25519SecretKey),
}

impl SecretKey {
    /// The length in bytes of an Ed25519 secret key.
    pub const ED25519_LENGTH: usize = ed25519_dalek::SECRET_KEY_LENGTH;

    /// Constructs a new Ed25519 variant from a byte slice.
    pub fn ed25519_from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, Error> {
        Ok(SecretKey::Ed25519(Ed25519SecretKey::from_bytes(
            bytes.as_ref(),
        )?))
    }

    /// The algorithm this key signs with.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            SecretKey::Ed25519(_) => SignatureAlgorithm::Ed25519,
        }
    }

    /// Returns the matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(self)
    }

    /// Signs `data` with this key's own algorithm.
    pub fn sign<T: AsRef<[u8]>>(&self, data: T) -> Signature {
        self.algorithm().sign(data, self)
    }

    /// PEM encodes the key.
    pub fn to_pem(&self) -> String {
        let contents = match self {
            SecretKey::Ed25519(secret_key) => {
                let mut der = ED25519_PKCS8_PREFIX.to_vec();
                der.extend_from_slice(secret_key.as_bytes());
                der
            }
        };
        pem::encode(&Pem {
            tag: ED25519_PEM_SECRET_KEY_TAG.to_string(),
            contents,
        })
    }

    /// Decodes a key from a PEM-encoded slice.
    pub fn from_pem<T: AsRef<[u8]>>(input: T) -> Result<Self, Error> {
        let pem = pem::parse(input).map_err(|error| Error::FromPem(format!("{:?}", error)))?;
        if pem.tag != ED25519_PEM_SECRET_KEY_TAG {
            return Err(Error::FromPem(format!(
                "invalid tag: expected {}, got {}",
                ED25519_PEM_SECRET_KEY_TAG, pem.tag
            )));
        }
        match pem.contents.strip_prefix(&ED25519_PKCS8_PREFIX[..]) {
            Some(raw) if raw.len() == Self::ED25519_LENGTH => Self::ed25519_from_bytes(raw),
            _ => Err(Error::FromPem(String::from(
                "not a PKCS#8 encoded Ed25519 key",
            ))),
        }
    }

    /// Attempts to write the key as PEM to the given path.
    pub fn to_file<P: AsRef<Path>>(&self, file: P) -> Result<(), Error> {
        fs::write(file.as_ref(), self.to_pem()).map_err(|error| Error::WriteKeyFile {
            path: file.as_ref().to_path_buf(),
            error,
        })
    }

    /// Attempts to read a PEM encoded key from the given path.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self, Error> {
        let data = fs::read(file.as_ref()).map_err(|error| Error::ReadKeyFile {
            path: file.as_ref().to_path_buf(),
            error,
        })?;
        Self::from_pem(data)
    }

    /// Generates a random instance using a `TestRng`.
    #[cfg(any(feature = "testing", test))]
    pub fn random(rng: &mut TestRng) -> Self {
        let mut bytes = [0u8; Self::ED25519_LENGTH];
        rng.fill_bytes(&mut bytes[..]);
        // Any 32 bytes form a valid Ed25519 seed.
        SecretKey::Ed25519(
            Ed25519SecretKey::from_bytes(&bytes).expect("should create secret key"),
        )
    }
}

impl Debug for SecretKey {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "SecretKey::{}(..)", self.algorithm())
    }
}

/// A public asymmetric key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PublicKey {
    /// Ed25519 public key.
    Ed25519(Ed25519PublicKey),
}

impl PublicKey {
    /// The length in bytes of an Ed25519 public key.
    pub const ED25519_LENGTH: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;

    /// The algorithm signatures by this key are made with.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            PublicKey::Ed25519(_) => SignatureAlgorithm::Ed25519,
        }
    }

    /// Returns the raw key bytes, without algorithm tag.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PublicKey::Ed25519(public_key) => public_key.as_bytes(),
        }
    }

    /// Parses raw key bytes for the given algorithm.
    pub fn from_algorithm_bytes(
        algorithm: SignatureAlgorithm,
        bytes: &[u8],
    ) -> Result<Self, Error> {
        match algorithm {
            SignatureAlgorithm::Ed25519 => {
                Ok(PublicKey::Ed25519(Ed25519PublicKey::from_bytes(bytes)?))
            }
        }
    }

    /// Returns the account hash of this key.
    pub fn to_account_hash(&self) -> AccountHash {
        self.algorithm().public_key_hash(self)
    }

    fn tag(&self) -> u8 {
        match self {
            PublicKey::Ed25519(_) => ED25519_TAG,
        }
    }

    fn from_tagged(tag: u8, bytes: &[u8]) -> Result<Self, Error> {
        match tag {
            ED25519_TAG => PublicKey::from_algorithm_bytes(SignatureAlgorithm::Ed25519, bytes),
            other => Err(Error::AsymmetricKey(format!(
                "invalid public key tag {}",
                other
            ))),
        }
    }

    fn to_hex(&self) -> String {
        format!("{:02x}{}", self.tag(), base16::encode_lower(self.as_bytes()))
    }

    fn from_hex(input: &str) -> Result<Self, Error> {
        let bytes = hex::decode(input).map_err(|error| Error::AsymmetricKey(error.to_string()))?;
        match bytes.split_first() {
            Some((tag, key)) => PublicKey::from_tagged(*tag, key),
            None => Err(Error::AsymmetricKey(String::from("empty public key"))),
        }
    }
}

impl From<&SecretKey> for PublicKey {
    fn from(secret_key: &SecretKey) -> PublicKey {
        match secret_key {
            SecretKey::Ed25519(secret_key) => {
                PublicKey::Ed25519(Ed25519PublicKey::from(secret_key))
            }
        }
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.tag(), self.as_bytes()).cmp(&(other.tag(), other.as_bytes()))
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        self.as_bytes().hash(state);
    }
}

impl DataSize for PublicKey {
    const IS_DYNAMIC: bool = false;
    const STATIC_HEAP_SIZE: usize = 0;

    fn estimate_heap_size(&self) -> usize {
        0
    }
}

impl Display for PublicKey {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "PubKey::{}({:10})", self.algorithm(), HexFmt(self.as_bytes()))
    }
}

impl Debug for PublicKey {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "PubKey::{}({})", self.algorithm(), HexFmt(self.as_bytes()))
    }
}

impl ToBytes for PublicKey {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let mut buffer = bytesrepr::allocate_buffer(self)?;
        buffer.push(self.tag());
        buffer.extend_from_slice(self.as_bytes());
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        U8_SERIALIZED_LENGTH + self.as_bytes().len()
    }
}

impl FromBytes for PublicKey {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (tag, remainder) = u8::from_bytes(bytes)?;
        let length = match tag {
            ED25519_TAG => Self::ED25519_LENGTH,
            _ => return Err(bytesrepr::Error::Formatting),
        };
        let (key, remainder) = bytesrepr::safe_split_at(remainder, length)?;
        let public_key =
            PublicKey::from_tagged(tag, key).map_err(|_| bytesrepr::Error::Formatting)?;
        Ok((public_key, remainder))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            self.to_hex().serialize(serializer)
        } else {
            (self.tag(), self.as_bytes()).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let hex_string = String::deserialize(deserializer)?;
            PublicKey::from_hex(&hex_string).map_err(SerdeError::custom)
        } else {
            let (tag, bytes) = <(u8, Vec<u8>)>::deserialize(deserializer)?;
            PublicKey::from_tagged(tag, &bytes).map_err(SerdeError::custom)
        }
    }
}

/// A detached signature together with the name of the algorithm that produced it.
#[derive(DataSize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug)]
pub struct Signature {
    /// The algorithm name, e.g. `ed25519`.
    pub algorithm: String,
    /// The raw signature bytes.
    pub bytes: Bytes,
}

impl Signature {
    /// Verifies this signature over `data`, choosing the verifier by the embedded name.
    pub fn verify<T: AsRef<[u8]>>(&self, data: T, public_key: &PublicKey) -> Result<(), Error> {
        let algorithm = SignatureAlgorithm::from_str(&self.algorithm)?;
        if algorithm != public_key.algorithm() {
            return Err(Error::AsymmetricKey(format!(
                "type mismatch between {} signature and {}",
                algorithm, public_key
            )));
        }
        algorithm.verify(data, &self.bytes, public_key)
    }
}

impl Display for Signature {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(formatter, "Sig::{}({:10})", self.algorithm, HexFmt(&self.bytes))
    }
}

impl ToBytes for Signature {
    fn to_bytes(&self) -> Result<Vec<u8>, bytesrepr::Error> {
        let mut buffer = bytesrepr::allocate_buffer(self)?;
        self.algorithm.write_bytes(&mut buffer)?;
        self.bytes.write_bytes(&mut buffer)?;
        Ok(buffer)
    }

    fn serialized_length(&self) -> usize {
        self.algorithm.serialized_length() + self.bytes.serialized_length()
    }
}

impl FromBytes for Signature {
    fn from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), bytesrepr::Error> {
        let (algorithm, remainder) = String::from_bytes(bytes)?;
        let (bytes, remainder) = Bytes::from_bytes(remainder)?;
        Ok((Signature { algorithm, bytes }, remainder))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn algorithm_is_chosen_by_name() {
        assert_eq!(
            "ed25519".parse::<SignatureAlgorithm>().unwrap(),
            SignatureAlgorithm::Ed25519
        );
        match "secp256k1".parse::<SignatureAlgorithm>() {
            Err(Error::UnknownAlgorithm(name)) => assert_eq!(name, "secp256k1"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn should_sign_and_verify() {
        let mut rng = TestRng::new();
        let secret_key = SecretKey::random(&mut rng);
        let public_key = secret_key.public_key();
        let data = b"header hash";

        let signature = secret_key.sign(data);
        assert_eq!(signature.algorithm, "ed25519");
        assert_eq!(signature.bytes.len(), ed25519_dalek::SIGNATURE_LENGTH);
        signature.verify(data, &public_key).unwrap();

        assert!(signature.verify(b"other data", &public_key).is_err());
        let other_key = SecretKey::random(&mut rng).public_key();
        assert!(signature.verify(data, &other_key).is_err());
    }

    #[test]
    fn should_reject_unknown_algorithm_in_signature() {
        let mut rng = TestRng::new();
        let secret_key = SecretKey::random(&mut rng);
        let mut signature = secret_key.sign(b"data");
        signature.algorithm = "rsa".to_string();
        assert!(matches!(
            signature.verify(b"data", &secret_key.public_key()),
            Err(Error::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn public_key_hash_depends_on_algorithm_name() {
        let secret_key = SecretKey::ed25519_from_bytes([7u8; SecretKey::ED25519_LENGTH]).unwrap();
        let public_key = secret_key.public_key();
        let expected = AccountHash::from_public_key("ed25519", public_key.as_bytes());
        assert_eq!(
            SignatureAlgorithm::Ed25519.public_key_hash(&public_key),
            expected
        );
        assert_ne!(
            expected,
            AccountHash::from_public_key("other", public_key.as_bytes())
        );
    }

    #[test]
    fn secret_key_pem_file_roundtrip() {
        let mut rng = TestRng::new();
        let secret_key = SecretKey::random(&mut rng);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("secret_key.pem");

        secret_key.to_file(&path).unwrap();
        let decoded = SecretKey::from_file(&path).unwrap();
        assert_eq!(decoded.public_key(), secret_key.public_key());

        assert!(matches!(
            SecretKey::from_file(temp_dir.path().join("missing.pem")),
            Err(Error::ReadKeyFile { .. })
        ));
    }

    #[test]
    fn public_key_encodings() {
        let mut rng = TestRng::new();
        let public_key = SecretKey::random(&mut rng).public_key();
        bytesrepr::test_serialization_roundtrip(&public_key);

        let json = serde_json::to_string(&public_key).unwrap();
        assert!(json.starts_with("\"01"));
        assert_eq!(serde_json::from_str::<PublicKey>(&json).unwrap(), public_key);

        let encoded = bincode::serialize(&public_key).unwrap();
        assert_eq!(bincode::deserialize::<PublicKey>(&encoded).unwrap(), public_key);
    }

    #[test]
    fn raw_key_bytes_need_the_algorithm() {
        let mut rng = TestRng::new();
        let public_key = SecretKey::random(&mut rng).public_key();
        let raw = public_key.as_bytes();
        assert_eq!(
            PublicKey::from_algorithm_bytes(SignatureAlgorithm::Ed25519, raw).unwrap(),
            public_key
        );
        assert!(PublicKey::from_algorithm_bytes(SignatureAlgorithm::Ed25519, &raw[1..]).is_err());

        let tagged = public_key.to_bytes().unwrap();
        let (decoded, remainder) = <PublicKey as FromBytes>::from_bytes(&tagged).unwrap();
        assert_eq!(decoded, public_key);
        assert!(remainder.is_empty());
    }
}
