//! ERC-20 transfer construction and signing.

use std::sync::Arc;

use alloy::consensus::TxLegacy;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::blockchain::client::LedgerClient;
use crate::blockchain::types::BlockchainResult;
use crate::blockchain::wallet::{SignedTransfer, Wallet};

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
    }
}

/// ABI-encode `transfer(to, amount)`.
pub fn encode_transfer(to: Address, amount: U256) -> Bytes {
    Bytes::from(IERC20::transferCall { to, amount }.abi_encode())
}

/// Recipient embedded in call data at bytes `[4..36]`, if the input is long enough.
pub fn embedded_recipient(input: &[u8]) -> Option<Address> {
    if input.len() < 36 {
        return None;
    }
    Some(Address::from_word(B256::from_slice(&input[4..36])))
}

/// Suggested fee raised by `bump_percent` for every attempt after the first.
/// Never below `suggested`, even where the product overflows.
pub fn bumped_fee(suggested: u128, bump_percent: u64, attempt: u32) -> u128 {
    let factor = u128::from(bump_percent)
        .saturating_mul(u128::from(attempt))
        .saturating_add(100);
    let bumped = match suggested.checked_mul(factor) {
        Some(product) => product / 100,
        None => (suggested / 100).saturating_mul(factor),
    };
    bumped.max(suggested)
}

/// A signed transfer plus the inputs it was built from.
#[derive(Debug, Clone)]
pub struct PreparedTransfer {
    pub signed: SignedTransfer,
    pub call_data: Bytes,
    pub fee: u128,
}

/// Builds and signs token transfers from the disbursing account.
#[derive(Clone)]
pub struct TransferTxBuilder {
    client: Arc<dyn LedgerClient>,
    wallet: Wallet,
    gas_limit: u64,
    fee_bump_percent: u64,
}

impl TransferTxBuilder {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        wallet: Wallet,
        gas_limit: u64,
        fee_bump_percent: u64,
    ) -> Self {
        Self {
            client,
            wallet,
            gas_limit,
            fee_bump_percent,
        }
    }

    /// The account every transfer is sent from.
    pub fn sender(&self) -> Address {
        self.wallet.address()
    }

    /// Fetch the fee (and the nonce, unless `nonce` pins one), then sign
    /// `transfer(recipient, amount)` on `contract`.
    ///
    /// `attempt` is zero-based; each later attempt pays a higher fee so it can
    /// replace an earlier one carrying the same nonce.
    pub async fn prepare(
        &self,
        contract: Address,
        recipient: Address,
        amount: U256,
        attempt: u32,
        nonce: Option<u64>,
    ) -> BlockchainResult<PreparedTransfer> {
        let nonce = match nonce {
            Some(pinned) => pinned,
            None => self.client.nonce_of(self.sender()).await?,
        };
        let suggested = self.client.suggested_fee().await?;
        let fee = bumped_fee(suggested, self.fee_bump_percent, attempt);
        let call_data = encode_transfer(recipient, amount);

        let tx = TxLegacy {
            chain_id: Some(self.wallet.chain_id()),
            nonce,
            gas_price: fee,
            gas_limit: self.gas_limit,
            to: TxKind::Call(contract),
            value: U256::ZERO,
            input: call_data.clone(),
        };

        let signed = self.wallet.sign_transaction(tx)?;
        tracing::debug!(
            tx_hash = %signed.hash,
            nonce = nonce,
            fee = %fee,
            attempt = attempt,
            "Transfer signed"
        );

        Ok(PreparedTransfer {
            signed,
            call_data,
            fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_bump_is_cumulative() {
        assert_eq!(bumped_fee(1_000, 20, 0), 1_000);
        assert_eq!(bumped_fee(1_000, 20, 1), 1_200);
        assert_eq!(bumped_fee(1_000, 20, 2), 1_400);
    }

    #[test]
    fn test_fee_bump_never_lowers_a_huge_fee() {
        assert_eq!(bumped_fee(u128::MAX, 20, 2), u128::MAX);
        assert_eq!(bumped_fee(u128::MAX, 20, 0), u128::MAX);

        let large = u128::MAX / 2;
        let bumped = bumped_fee(large, 20, 1);
        assert!(bumped > large);
        assert_eq!(bumped, (large / 100) * 120);
    }

    #[test]
    fn test_transfer_calldata_layout() {
        let to = Address::repeat_byte(0xab);
        let data = encode_transfer(to, U256::from(1_000u64));

        // selector of transfer(address,uint256)
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data.len(), 68);
        assert_eq!(embedded_recipient(&data), Some(to));
    }

    #[test]
    fn test_embedded_recipient_needs_36_bytes() {
        assert_eq!(embedded_recipient(&[0u8; 35]), None);
        assert_eq!(embedded_recipient(&[0u8; 36]), Some(Address::ZERO));
    }
}
