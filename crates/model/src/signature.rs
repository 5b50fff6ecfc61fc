use {
    crate::{keccak256, DomainSeparator},
    primitive_types::{H160, H256},
    secp256k1::{
        ecdsa::{RecoverableSignature, RecoveryId},
        Message, Secp256k1, SecretKey,
    },
    serde::{de, Deserialize, Serialize},
    std::fmt,
};

/// How the order digest was wrapped before signing. `Eip712` signs the bare
/// `\x19\x01` digest, `EthSign` additionally wraps it in the personal-sign
/// envelope wallets produce for `eth_sign`.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default, Deserialize, Serialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SigningScheme {
    #[default]
    Eip712,
    EthSign,
}

impl SigningScheme {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Eip712 => 0,
            Self::EthSign => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Eip712),
            1 => Some(Self::EthSign),
            _ => None,
        }
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Default, Hash)]
pub struct EcdsaSignature {
    pub r: H256,
    pub s: H256,
    pub v: u8,
}

pub fn hashed_eip712_message(
    domain_separator: &DomainSeparator,
    struct_hash: &[u8; 32],
) -> [u8; 32] {
    let mut message = [0u8; 66];
    message[0..2].copy_from_slice(&[0x19, 0x01]);
    message[2..34].copy_from_slice(&domain_separator.0);
    message[34..66].copy_from_slice(struct_hash);
    keccak256(&message)
}

fn hashed_ethsign_message(domain_separator: &DomainSeparator, struct_hash: &[u8; 32]) -> [u8; 32] {
    let mut message = [0u8; 60];
    message[..28].copy_from_slice(b"\x19Ethereum Signed Message:\n32");
    message[28..].copy_from_slice(&hashed_eip712_message(domain_separator, struct_hash));
    keccak256(&message)
}

fn hashed_signing_message(
    signing_scheme: SigningScheme,
    domain_separator: &DomainSeparator,
    struct_hash: &[u8; 32],
) -> [u8; 32] {
    match signing_scheme {
        SigningScheme::Eip712 => hashed_eip712_message(domain_separator, struct_hash),
        SigningScheme::EthSign => hashed_ethsign_message(domain_separator, struct_hash),
    }
}

pub fn public_key_address(key: &secp256k1::PublicKey) -> H160 {
    // Uncompressed encoding is 0x04 followed by the 64 byte key; the address
    // is the low 20 bytes of its keccak hash.
    let serialized = key.serialize_uncompressed();
    H160::from_slice(&keccak256(&serialized[1..])[12..])
}

impl EcdsaSignature {
    /// r + s + v
    pub fn to_bytes(self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(self.r.as_bytes());
        bytes[32..64].copy_from_slice(self.s.as_bytes());
        bytes[64] = self.v;
        bytes
    }

    pub fn from_bytes(bytes: &[u8; 65]) -> Self {
        Self {
            r: H256::from_slice(&bytes[..32]),
            s: H256::from_slice(&bytes[32..64]),
            v: bytes[64],
        }
    }

    fn recoverable(&self) -> Option<RecoverableSignature> {
        let recovery_id = match self.v {
            0 | 1 => self.v as i32,
            27 | 28 => (self.v - 27) as i32,
            _ => return None,
        };
        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(self.r.as_bytes());
        compact[32..].copy_from_slice(self.s.as_bytes());
        RecoverableSignature::from_compact(&compact, RecoveryId::from_i32(recovery_id).ok()?).ok()
    }

    /// Recovers the address that signed the given order struct hash under the
    /// given scheme and domain. `None` if the signature is malformed or does
    /// not decode to a valid curve point.
    pub fn recover(
        &self,
        signing_scheme: SigningScheme,
        domain_separator: &DomainSeparator,
        struct_hash: &[u8; 32],
    ) -> Option<H160> {
        let message = hashed_signing_message(signing_scheme, domain_separator, struct_hash);
        let message = Message::from_slice(&message).ok()?;
        let public_key = Secp256k1::verification_only()
            .recover_ecdsa(&message, &self.recoverable()?)
            .ok()?;
        Some(public_key_address(&public_key))
    }

    pub fn sign(
        signing_scheme: SigningScheme,
        domain_separator: &DomainSeparator,
        struct_hash: &[u8; 32],
        key: &SecretKey,
    ) -> Self {
        let message = hashed_signing_message(signing_scheme, domain_separator, struct_hash);
        // Unwrap because a 32 byte digest is always a valid message.
        let message = Message::from_slice(&message).unwrap();
        let (recovery_id, compact) = Secp256k1::signing_only()
            .sign_ecdsa_recoverable(&message, key)
            .serialize_compact();
        Self {
            r: H256::from_slice(&compact[..32]),
            s: H256::from_slice(&compact[32..]),
            v: recovery_id.to_i32() as u8 + 27,
        }
    }
}

impl Serialize for EcdsaSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut bytes = [0u8; 2 + 65 * 2];
        bytes[..2].copy_from_slice(b"0x");
        // Can only fail if the buffer size does not match but we know it is
        // correct.
        hex::encode_to_slice(self.to_bytes(), &mut bytes[2..]).unwrap();
        // Hex encoding is always valid utf8.
        let str = std::str::from_utf8(&bytes).unwrap();
        serializer.serialize_str(str)
    }
}

impl<'de> Deserialize<'de> for EcdsaSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor {}
        impl de::Visitor<'_> for Visitor {
            type Value = EcdsaSignature;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "the 65 signature bytes as a hex encoded string")
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let s = s.strip_prefix("0x").ok_or_else(|| {
                    de::Error::custom(format!(
                        "{s:?} can't be decoded as hex signature because it does not start with \
                         '0x'"
                    ))
                })?;
                let mut bytes = [0u8; 65];
                hex::decode_to_slice(s, &mut bytes).map_err(|err| {
                    de::Error::custom(format!("failed to decode {s:?} as hex signature: {err}"))
                })?;
                Ok(EcdsaSignature::from_bytes(&bytes))
            }
        }

        deserializer.deserialize_str(Visitor {})
    }
}
