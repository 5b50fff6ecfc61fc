use {
    crate::{
        keccak256,
        signature::{public_key_address, EcdsaSignature, SigningScheme},
        DomainSeparator,
    },
    number::serialization::HexOrDecimalU256,
    primitive_types::{H160, H256, U256},
    secp256k1::SecretKey,
    serde::{Deserialize, Serialize},
    serde_with::serde_as,
};

#[derive(Eq, PartialEq, Clone, Copy, Debug, Default, Deserialize, Serialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Buy,
    Sell,
}

impl Side {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Buy => 0,
            Self::Sell => 1,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// A signed limit order. Immutable once created; the field set and order is
/// normative for hashing.
///
/// A `BUY` order offers `maker_amount` of collateral (token 0) for
/// `taker_amount` of the outcome token; a `SELL` order offers `maker_amount`
/// of the outcome token for `taker_amount` of collateral.
#[serde_as]
#[derive(Eq, PartialEq, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde_as(as = "HexOrDecimalU256")]
    pub salt: U256,
    pub maker: H160,
    pub signer: H160,
    /// Zero address means anyone may take the order.
    pub taker: H160,
    pub market_id: H256,
    #[serde_as(as = "HexOrDecimalU256")]
    pub token_id: U256,
    pub side: Side,
    #[serde_as(as = "HexOrDecimalU256")]
    pub maker_amount: U256,
    #[serde_as(as = "HexOrDecimalU256")]
    pub taker_amount: U256,
    /// Unix seconds; zero means the order never expires.
    #[serde_as(as = "HexOrDecimalU256")]
    pub expiration: U256,
    #[serde_as(as = "HexOrDecimalU256")]
    pub nonce: U256,
    #[serde_as(as = "HexOrDecimalU256")]
    pub fee_rate_bps: U256,
    pub sig_type: SigningScheme,
    pub signature: EcdsaSignature,
}

const ORDER_TYPE: &[u8] = b"Order(uint256 salt,address maker,address signer,address taker,\
    bytes32 marketId,uint256 tokenId,uint8 side,uint256 makerAmount,uint256 takerAmount,\
    uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 sigType)";

impl Order {
    /// EIP-712 struct hash over the normative field order.
    pub fn struct_hash(&self) -> [u8; 32] {
        // 14 words: type hash plus the 13 signed fields, each padded to a
        // 32 byte word (addresses and u8 discriminants right aligned).
        let mut buffer = [0u8; 448];
        buffer[0..32].copy_from_slice(&keccak256(ORDER_TYPE));
        self.salt.to_big_endian(&mut buffer[32..64]);
        buffer[76..96].copy_from_slice(self.maker.as_bytes());
        buffer[108..128].copy_from_slice(self.signer.as_bytes());
        buffer[140..160].copy_from_slice(self.taker.as_bytes());
        buffer[160..192].copy_from_slice(self.market_id.as_bytes());
        self.token_id.to_big_endian(&mut buffer[192..224]);
        buffer[255] = self.side.as_u8();
        self.maker_amount.to_big_endian(&mut buffer[256..288]);
        self.taker_amount.to_big_endian(&mut buffer[288..320]);
        self.expiration.to_big_endian(&mut buffer[320..352]);
        self.nonce.to_big_endian(&mut buffer[352..384]);
        self.fee_rate_bps.to_big_endian(&mut buffer[384..416]);
        buffer[447] = self.sig_type.as_u8();
        keccak256(&buffer)
    }

    /// The canonical order hash: the signed EIP-712 digest. Doubles as the
    /// order's identity everywhere in the engine.
    pub fn hash(&self, domain_separator: &DomainSeparator) -> H256 {
        H256(crate::signature::hashed_eip712_message(
            domain_separator,
            &self.struct_hash(),
        ))
    }

    pub fn recover_signer(&self, domain_separator: &DomainSeparator) -> Option<H160> {
        self.signature
            .recover(self.sig_type, domain_separator, &self.struct_hash())
    }

    /// The core signing contract: the recovered address must be the declared
    /// signer and the signer must be the maker itself.
    pub fn verify_signature(&self, domain_separator: &DomainSeparator) -> bool {
        self.recover_signer(domain_separator) == Some(self.signer) && self.signer == self.maker
    }

    pub fn is_expired(&self, now_unix: u64) -> bool {
        !self.expiration.is_zero() && self.expiration < U256::from(now_unix)
    }
}

/// Test and tooling helper to assemble signed orders.
#[derive(Debug, Default)]
pub struct OrderBuilder(Order);

impl OrderBuilder {
    pub fn with_salt(mut self, salt: U256) -> Self {
        self.0.salt = salt;
        self
    }

    pub fn with_market_id(mut self, market_id: H256) -> Self {
        self.0.market_id = market_id;
        self
    }

    pub fn with_token_id(mut self, token_id: U256) -> Self {
        self.0.token_id = token_id;
        self
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.0.side = side;
        self
    }

    pub fn with_maker_amount(mut self, amount: U256) -> Self {
        self.0.maker_amount = amount;
        self
    }

    pub fn with_taker_amount(mut self, amount: U256) -> Self {
        self.0.taker_amount = amount;
        self
    }

    pub fn with_expiration(mut self, expiration: U256) -> Self {
        self.0.expiration = expiration;
        self
    }

    pub fn with_nonce(mut self, nonce: U256) -> Self {
        self.0.nonce = nonce;
        self
    }

    pub fn with_fee_rate_bps(mut self, bps: U256) -> Self {
        self.0.fee_rate_bps = bps;
        self
    }

    /// Sets maker and signer to the key's address and signs.
    pub fn sign_with(
        mut self,
        scheme: SigningScheme,
        domain_separator: &DomainSeparator,
        key: &SecretKey,
    ) -> Self {
        let address = {
            let secp = secp256k1::Secp256k1::signing_only();
            public_key_address(&secp256k1::PublicKey::from_secret_key(&secp, key))
        };
        self.0.maker = address;
        self.0.signer = address;
        self.0.sig_type = scheme;
        self.0.signature =
            EcdsaSignature::sign(scheme, domain_separator, &self.0.struct_hash(), key);
        self
    }

    pub fn build(self) -> Order {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> DomainSeparator {
        DomainSeparator::new(137, H160::from_low_u64_be(0xeeee))
    }

    fn signed_order() -> Order {
        OrderBuilder::default()
            .with_salt(42.into())
            .with_market_id(H256::from_low_u64_be(7))
            .with_token_id(1.into())
            .with_side(Side::Buy)
            .with_maker_amount(U256::exp10(18))
            .with_taker_amount(U256::exp10(18) * 2)
            .with_nonce(0.into())
            .sign_with(
                SigningScheme::Eip712,
                &domain(),
                &SecretKey::from_slice(&[0x42; 32]).unwrap(),
            )
            .build()
    }

    #[test]
    fn accepts_valid_signature() {
        assert!(signed_order().verify_signature(&domain()));
    }

    #[test]
    fn rejects_any_field_mutation() {
        let order = signed_order();
        let mutations: Vec<Order> = vec![
            Order {
                salt: order.salt + 1,
                ..order.clone()
            },
            Order {
                taker: H160::from_low_u64_be(9),
                ..order.clone()
            },
            Order {
                market_id: H256::from_low_u64_be(8),
                ..order.clone()
            },
            Order {
                token_id: order.token_id + 1,
                ..order.clone()
            },
            Order {
                side: Side::Sell,
                ..order.clone()
            },
            Order {
                maker_amount: order.maker_amount + 1,
                ..order.clone()
            },
            Order {
                taker_amount: order.taker_amount + 1,
                ..order.clone()
            },
            Order {
                expiration: 1.into(),
                ..order.clone()
            },
            Order {
                nonce: order.nonce + 1,
                ..order.clone()
            },
            Order {
                fee_rate_bps: order.fee_rate_bps + 1,
                ..order.clone()
            },
        ];
        for mutated in mutations {
            assert!(!mutated.verify_signature(&domain()));
        }
    }

    #[test]
    fn rejects_signer_other_than_maker() {
        let mut order = signed_order();
        order.maker = H160::from_low_u64_be(1234);
        assert!(!order.verify_signature(&domain()));
    }

    #[test]
    fn hash_is_domain_bound() {
        let order = signed_order();
        let other = DomainSeparator::new(1, H160::from_low_u64_be(0xeeee));
        assert_ne!(order.hash(&domain()), order.hash(&other));
    }

    #[test]
    fn expiration_semantics() {
        let mut order = signed_order();
        assert!(!order.is_expired(u64::MAX));
        order.expiration = 100.into();
        assert!(order.is_expired(101));
        assert!(!order.is_expired(100));
    }

    #[test]
    fn wire_serde_round_trip() {
        let order = signed_order();
        let json = serde_json::to_value(&order).unwrap();
        assert!(json.get("makerAmount").is_some());
        assert!(json.get("feeRateBps").is_some());
        let decoded: Order = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, order);
        assert_eq!(decoded.hash(&domain()), order.hash(&domain()));
    }
}
