use super::*;

/// A `ADDRESS:SATS` command line destination.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Destination {
  address: Address<NetworkUnchecked>,
  amount: Amount,
}

impl FromStr for Destination {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (address, sats) = s
      .rsplit_once(':')
      .ok_or_else(|| anyhow!("destination `{s}` must be formatted `ADDRESS:SATS`"))?;

    Ok(Self {
      address: address
        .parse()
        .with_context(|| format!("invalid destination address `{address}`"))?,
      amount: Amount::from_sat(
        sats
          .parse()
          .with_context(|| format!("invalid destination amount `{sats}`"))?,
      ),
    })
  }
}

#[derive(Debug, Parser)]
pub(crate) struct CreateSpend {
  #[arg(
    long = "destination",
    required = true,
    help = "Pay <DESTINATION>, formatted `ADDRESS:SATS`. May be repeated."
  )]
  destinations: Vec<Destination>,
  #[arg(
    long = "outpoint",
    help = "Spend <OUTPOINT> instead of selecting coins automatically. May be repeated."
  )]
  outpoints: Vec<OutPoint>,
  #[arg(
    long,
    default_value_t = 6,
    help = "Pay a fee rate expected to confirm within <CONF_TARGET> blocks."
  )]
  conf_target: u32,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Output {
  pub txid: Txid,
  pub psbt: String,
  pub fee: u64,
  pub change_index: Option<u32>,
  pub change_vout: Option<u32>,
}

impl CreateSpend {
  pub(crate) fn run(self, settings: Settings) -> SubcommandResult {
    let fee_estimator: Box<dyn FeeEstimator> = match settings.fee_rate() {
      Some(fee_rate) => Box::new(FixedFeeRate(fee_rate)),
      None => Box::new(Node::connect(&settings)?),
    };

    let wallet = open_wallet(settings)?;

    let destinations = self
      .destinations
      .into_iter()
      .map(|destination| (destination.address, destination.amount))
      .collect::<Vec<(Address<NetworkUnchecked>, Amount)>>();

    let proposal = wallet.create_spend(
      fee_estimator.as_ref(),
      &destinations,
      (!self.outpoints.is_empty()).then_some(self.outpoints.as_slice()),
      self.conf_target,
    )?;

    Ok(Some(Box::new(Output {
      txid: proposal.txid,
      psbt: base64_encode(&proposal.psbt.serialize()),
      fee: proposal.psbt.fee()?.to_sat(),
      change_index: proposal.change_index,
      change_vout: proposal.change_vout,
    })))
  }
}
