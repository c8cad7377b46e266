use super::*;

pub trait FeeEstimator: Send + Sync {
  /// Fee rate expected to confirm within `conf_target` blocks. Errors when
  /// no estimate is available, in which case callers must not guess.
  fn estimate(&self, conf_target: u32) -> anyhow::Result<FeeRate>;
}

pub trait Broadcaster: Send + Sync {
  fn broadcast(&self, transaction: &Transaction) -> anyhow::Result<Txid>;
}

/// Estimates the same fee rate for every confirmation target.
#[derive(Debug, Clone, Copy)]
pub struct FixedFeeRate(pub FeeRate);

impl FeeEstimator for FixedFeeRate {
  fn estimate(&self, _conf_target: u32) -> anyhow::Result<FeeRate> {
    Ok(self.0)
  }
}
