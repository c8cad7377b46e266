use super::*;

#[derive(Debug, Parser)]
pub(crate) struct BroadcastSpend {
  #[arg(help = "Broadcast the signed spend <TXID>.")]
  txid: Txid,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Output {
  pub txid: Txid,
}

impl BroadcastSpend {
  pub(crate) fn run(self, settings: Settings) -> SubcommandResult {
    let node = Node::connect(&settings)?;

    let txid = open_wallet(settings)?.broadcast(&node, self.txid)?;

    Ok(Some(Box::new(Output { txid })))
  }
}
