use ethers_core::types::U256;
use tracing::debug;

/// EIP-1559 fee quote shared by every transaction of a batch
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FeeQuote {
    pub max_fee: U256,
    pub max_priority_fee: U256,
}

impl FeeQuote {
    pub fn new(max_fee: U256, max_priority_fee: U256) -> Self {
        Self {
            max_fee,
            max_priority_fee,
        }
    }
}

/// Boosts both components of a fee quote by `numerator / denominator`.
/// Used when a dropped transaction is re-queued.
pub(crate) fn boost_fee(fee: &FeeQuote, numerator: u32, denominator: u32) -> FeeQuote {
    let boosted = FeeQuote {
        max_fee: apply_multiplier(&fee.max_fee, numerator, denominator),
        max_priority_fee: apply_multiplier(&fee.max_priority_fee, numerator, denominator),
    };
    debug!(old_fee = ?fee, ?boosted, "Boosted fee for resubmission");
    boosted
}

/// Gas limit to submit with, given the raw estimate from the node.
pub(crate) fn apply_gas_margin(estimate: U256, numerator: u32, denominator: u32) -> U256 {
    apply_multiplier(&estimate, numerator, denominator)
}

fn apply_multiplier(value: &U256, numerator: u32, denominator: u32) -> U256 {
    let numerator = U256::from(numerator);
    let denominator = U256::from(denominator.max(1));
    value.saturating_mul(numerator).div_mod(denominator).0
}
