//! Wire model for signed orders and the trades they produce.

pub mod order;
pub mod signature;
pub mod trade;

use {
    primitive_types::H160,
    tiny_keccak::{Hasher, Keccak},
};

pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut output = [0u8; 32];
    let mut hasher = Keccak::v256();
    hasher.update(bytes);
    hasher.finalize(&mut output);
    output
}

/// The EIP-712 domain separator the exchange binds every order signature to.
#[derive(Copy, Clone, Default, Eq, PartialEq, Debug)]
pub struct DomainSeparator(pub [u8; 32]);

impl DomainSeparator {
    const DOMAIN_TYPE_HASH: &'static [u8] =
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
    const NAME: &'static [u8] = b"CTFExchange";
    const VERSION: &'static [u8] = b"1";

    pub fn new(chain_id: u64, verifying_contract: H160) -> Self {
        let mut buffer = [0u8; 160];
        buffer[0..32].copy_from_slice(&keccak256(Self::DOMAIN_TYPE_HASH));
        buffer[32..64].copy_from_slice(&keccak256(Self::NAME));
        buffer[64..96].copy_from_slice(&keccak256(Self::VERSION));
        buffer[120..128].copy_from_slice(&chain_id.to_be_bytes());
        buffer[140..160].copy_from_slice(verifying_contract.as_bytes());
        Self(keccak256(&buffer))
    }
}
