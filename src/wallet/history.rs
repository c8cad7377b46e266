use {super::*, std::collections::BTreeMap, std::ops::RangeInclusive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HistoryKind {
  Receive,
  Spend,
}

/// A confirmed payment into or out of the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
  pub kind: HistoryKind,
  pub height: u32,
  pub txid: Txid,
  /// Received value, or value paid to outputs other than change.
  #[serde(with = "bitcoin::amount::serde::as_sat")]
  pub amount: Amount,
  /// Known only for spends this wallet built.
  #[serde(default, with = "bitcoin::amount::serde::as_sat::opt")]
  pub miner_fee: Option<Amount>,
  pub coins: Vec<OutPoint>,
}

impl Wallet {
  /// Receives and spends confirmed within `heights`, most recent first.
  /// Change returning to the wallet is not a receive.
  pub fn history(&self, heights: RangeInclusive<u32>, limit: usize) -> Result<Vec<HistoryEvent>> {
    let rtx = self.database.begin_read()?;
    let coins = load_coins(&rtx.open_table(OUTPOINT_TO_COIN)?)?;
    let proposals = rtx.open_table(TXID_TO_SPEND)?;

    let mut events = Vec::new();
    let mut spends = BTreeMap::<Txid, (u32, Vec<&Coin>)>::new();

    for coin in &coins {
      if let Some(height) = coin.block_height {
        if !coin.is_change && heights.contains(&height) {
          events.push(HistoryEvent {
            kind: HistoryKind::Receive,
            height,
            txid: coin.outpoint.txid,
            amount: coin.amount,
            miner_fee: None,
            coins: vec![coin.outpoint],
          });
        }
      }

      if let Some(SpendInfo {
        txid,
        height: Some(height),
      }) = coin.spend_info
      {
        if heights.contains(&height) {
          spends
            .entry(txid)
            .or_insert_with(|| (height, Vec::new()))
            .1
            .push(coin);
        }
      }
    }

    for (txid, (height, spent)) in spends {
      let spent_total = total(spent.iter().map(|coin| coin.amount));

      let (amount, miner_fee) = match proposals.get(&txid.store())? {
        Some(entry) => {
          let proposal = SpendEntry::load(entry.value()).proposal(txid)?;
          let outputs = total(
            proposal
              .psbt
              .unsigned_tx
              .output
              .iter()
              .map(|output| output.value),
          );
          (
            total(proposal.destinations().iter().map(|output| output.value)),
            spent_total.checked_sub(outputs),
          )
        }
        None => {
          let change = total(
            coins
              .iter()
              .filter(|coin| coin.outpoint.txid == txid && coin.is_change)
              .map(|coin| coin.amount),
          );
          (spent_total.checked_sub(change).unwrap_or(Amount::ZERO), None)
        }
      };

      events.push(HistoryEvent {
        kind: HistoryKind::Spend,
        height,
        txid,
        amount,
        miner_fee,
        coins: spent.iter().map(|coin| coin.outpoint).collect(),
      });
    }

    events.sort_by(|a, b| {
      b.height
        .cmp(&a.height)
        .then_with(|| a.txid.cmp(&b.txid))
    });

    events.truncate(limit);

    Ok(events)
  }
}
