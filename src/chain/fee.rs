use crate::chain::client::ChainQueryClient;
use crate::chain::error::ClientResult;
use crate::chain::messages::TxMessage;
use crate::chain::tx_builder::TxBuilder;
use crate::chain::types::Fee;
use crate::config::{ChainConfig, GasPriceTier};

/// Turns a simulated gas figure into a fee: gas limit is the estimate times
/// the safety multiplier, amount is the limit times the gas price, both
/// rounded to the nearest integer.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeEstimator {
    gas_multiplier: f64,
    gas_price: f64,
    denom: String,
}

impl FeeEstimator {
    pub fn new(gas_multiplier: f64, gas_price: f64, denom: &str) -> Self {
        Self {
            gas_multiplier,
            gas_price,
            denom: denom.to_string(),
        }
    }

    /// Average tier in the chain's minimal denom.
    pub fn from_config(chain: &ChainConfig) -> Self {
        Self::new(
            chain.gas_multiplier,
            chain.gas_prices.price(GasPriceTier::Average),
            &chain.coin_minimal_denom,
        )
    }

    pub fn fee_for_gas(&self, gas_used: u64) -> Fee {
        let gas_limit = (gas_used as f64 * self.gas_multiplier).round() as u64;
        let amount = (gas_limit as f64 * self.gas_price).round() as u64;

        Fee {
            gas_limit,
            gas_price: self.gas_price,
            amount: amount.to_string(),
            denom: self.denom.clone(),
        }
    }

    /// Simulate `messages` as `builder` would sign them and price the result.
    pub async fn estimate(
        &self,
        query: &ChainQueryClient,
        builder: &TxBuilder<'_>,
        messages: &[TxMessage],
    ) -> ClientResult<Fee> {
        let unsigned = builder.build_unsigned(messages);
        let gas = query.simulate(&unsigned).await?;
        let fee = self.fee_for_gas(gas.gas_used);

        log::debug!(
            "Simulated {} gas, limit {}, fee {}{}",
            gas.gas_used,
            fee.gas_limit,
            fee.amount,
            fee.denom
        );
        Ok(fee)
    }
}
