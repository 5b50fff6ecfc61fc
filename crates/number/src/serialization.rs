use {
    primitive_types::U256,
    serde::{de, Deserializer, Serializer},
    serde_with::{DeserializeAs, SerializeAs},
    std::fmt,
};

/// Serialize [`U256`] as a decimal string, accept either a decimal or a
/// `0x`-prefixed hexadecimal string when deserializing.
#[derive(Debug)]
pub struct HexOrDecimalU256;

impl<'de> DeserializeAs<'de, U256> for HexOrDecimalU256 {
    fn deserialize_as<D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl de::Visitor<'_> for Visitor {
            type Value = U256;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    formatter,
                    "a u256 encoded either as a decimal or a 0x prefixed hexadecimal string"
                )
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match s.strip_prefix("0x") {
                    Some(hex) => U256::from_str_radix(hex, 16).map_err(|err| {
                        de::Error::custom(format!("failed to decode {s:?} as hex u256: {err}"))
                    }),
                    None => U256::from_dec_str(s).map_err(|err| {
                        de::Error::custom(format!("failed to decode {s:?} as decimal u256: {err}"))
                    }),
                }
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(value.into())
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

impl SerializeAs<U256> for HexOrDecimalU256 {
    fn serialize_as<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde::Deserialize, serde_with::serde_as};

    #[serde_as]
    #[derive(Debug, PartialEq, Deserialize)]
    struct Amount(#[serde_as(as = "HexOrDecimalU256")] U256);

    #[test]
    fn deserializes_all_encodings() {
        for json in ["\"42\"", "\"0x2a\"", "42"] {
            let amount: Amount = serde_json::from_str(json).unwrap();
            assert_eq!(amount, Amount(42.into()));
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(serde_json::from_str::<Amount>("\"0xzz\"").is_err());
        assert!(serde_json::from_str::<Amount>("\"12a\"").is_err());
    }
}
