use super::*;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct SpendTx {
  pub txid: Txid,
  pub psbt: String,
  pub status: SpendStatus,
  pub change_index: Option<u32>,
  pub change_vout: Option<u32>,
  pub created_at: u64,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Output {
  pub spend_txs: Vec<SpendTx>,
}

pub(crate) fn run(settings: Settings) -> SubcommandResult {
  let spend_txs = open_wallet(settings)?
    .list_proposals()?
    .into_iter()
    .map(|proposal| SpendTx {
      txid: proposal.txid,
      psbt: base64_encode(&proposal.psbt.serialize()),
      status: proposal.status,
      change_index: proposal.change_index,
      change_vout: proposal.change_vout,
      created_at: proposal.created_at,
    })
    .collect();

  Ok(Some(Box::new(Output { spend_txs })))
}
