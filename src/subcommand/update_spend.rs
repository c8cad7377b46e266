use super::*;

#[derive(Debug, Parser)]
pub(crate) struct UpdateSpend {
  #[arg(help = "Merge signatures from base64 encoded <PSBT>.")]
  psbt: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Output {
  pub txid: Txid,
  pub status: SpendStatus,
  pub unsigned_inputs: Vec<usize>,
}

impl UpdateSpend {
  pub(crate) fn run(self, settings: Settings) -> SubcommandResult {
    let psbt = Psbt::deserialize(&base64_decode(&self.psbt)?).context("invalid PSBT")?;

    let txid = psbt.unsigned_tx.compute_txid();

    let wallet = open_wallet(settings)?;

    let (status, unsigned_inputs) = match wallet.submit_signed(psbt) {
      Ok(status) => (status, Vec::new()),
      Err(wallet::Error::IncompleteSignature { inputs, .. }) => (SpendStatus::Created, inputs),
      Err(err) => return Err(err.into()),
    };

    Ok(Some(Box::new(Output {
      txid,
      status,
      unsigned_inputs,
    })))
  }
}
