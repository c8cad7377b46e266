use super::*;

#[derive(Debug, Parser)]
pub(crate) struct ListCoins {
  #[arg(long, help = "Only list unspent coins.")]
  unspent: bool,
  #[arg(long = "outpoint", help = "Only list the coin at <OUTPOINT>.")]
  outpoints: Vec<OutPoint>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Output {
  pub coins: Vec<Coin>,
}

impl ListCoins {
  pub(crate) fn run(self, settings: Settings) -> SubcommandResult {
    let wallet = open_wallet(settings)?;

    let mut coins = if self.outpoints.is_empty() {
      wallet.list_coins(None)?
    } else {
      wallet.coins_by_outpoints(&self.outpoints)?
    };

    if self.unspent {
      coins.retain(|coin| !coin.is_spent());
    }

    Ok(Some(Box::new(Output { coins })))
  }
}
