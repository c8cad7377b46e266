use super::*;

/// Fee rate in sat/vB.
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy, Deserialize)]
#[serde(try_from = "f64")]
pub struct FeeRate(f64);

impl FromStr for FeeRate {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::try_from(f64::from_str(s)?)
  }
}

impl TryFrom<f64> for FeeRate {
  type Error = Error;

  fn try_from(rate: f64) -> Result<Self, Self::Error> {
    if rate.is_sign_negative() | rate.is_nan() | rate.is_infinite() {
      bail!("invalid fee rate: {rate}")
    }
    Ok(Self(rate))
  }
}

impl Display for FeeRate {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    write!(f, "{} sat/vB", self.0)
  }
}

impl FeeRate {
  pub const MIN_RELAY: Self = Self(1.0);

  /// Converts a rate in BTC/kvB, as reported by Bitcoin Core.
  pub fn from_btc_per_kvb(rate: Amount) -> Self {
    #[allow(clippy::cast_precision_loss)]
    Self(rate.to_sat() as f64 / 1000.0)
  }

  pub fn exceeds(&self, sat_per_vbyte: u64) -> bool {
    #[allow(clippy::cast_precision_loss)]
    let limit = sat_per_vbyte as f64;
    self.0 > limit
  }

  pub fn fee(&self, vsize: usize) -> Amount {
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    #[allow(clippy::cast_precision_loss)]
    Amount::from_sat((self.0 * vsize as f64).round() as u64)
  }
}
