use super::*;

#[derive(Debug, Parser)]
pub(crate) struct DelSpendTx {
  #[arg(help = "Abandon spend <TXID> and release its coins.")]
  txid: Txid,
}

impl DelSpendTx {
  pub(crate) fn run(self, settings: Settings) -> SubcommandResult {
    open_wallet(settings)?.abandon(self.txid)?;
    Ok(None)
  }
}
