use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
  pub outpoint: OutPoint,
  #[serde(with = "bitcoin::amount::serde::as_sat")]
  pub amount: Amount,
  pub derivation_index: u32,
  pub is_change: bool,
  pub block_height: Option<u32>,
  pub spend_info: Option<SpendInfo>,
}

impl Coin {
  pub fn branch(&self) -> Branch {
    Branch::from(self.is_change)
  }

  pub fn is_confirmed(&self) -> bool {
    self.block_height.is_some()
  }

  pub fn is_spent(&self) -> bool {
    self.spend_info.is_some()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendInfo {
  pub txid: Txid,
  pub height: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
  pub outpoint: OutPoint,
  #[serde(with = "bitcoin::amount::serde::as_sat")]
  pub amount: Amount,
  pub derivation_index: u32,
  pub is_change: bool,
  pub height: Option<u32>,
}

fn live_coin(outpoint: &OutPointValue, entry: CoinEntryValue) -> Option<Coin> {
  let entry = CoinEntry::load(entry);

  if entry.dropped {
    return None;
  }

  Some(entry.coin(OutPoint::load(*outpoint)))
}

/// Coins in outpoint key order, leaving out outputs of dropped transactions.
pub(super) fn load_coins(
  coins: &impl ReadableTable<&'static OutPointValue, CoinEntryValue>,
) -> Result<Vec<Coin>> {
  let mut loaded = Vec::new();

  for result in coins.iter()? {
    let (outpoint, entry) = result?;
    loaded.extend(live_coin(outpoint.value(), entry.value()));
  }

  Ok(loaded)
}

/// A consistent read snapshot of the coin ledger.
pub struct CoinSnapshot {
  coins: ReadOnlyTable<&'static OutPointValue, CoinEntryValue>,
}

impl CoinSnapshot {
  /// Iterates over every coin in outpoint key order. Each call starts a new
  /// pass over the same snapshot.
  pub fn iter(&self) -> Result<impl Iterator<Item = Result<Coin>> + '_> {
    Ok(self.coins.iter()?.filter_map(|result| match result {
      Ok((outpoint, entry)) => live_coin(outpoint.value(), entry.value()).map(Ok),
      Err(err) => Some(Err(err.into())),
    }))
  }

  pub fn len(&self) -> Result<u64> {
    self.iter()?.try_fold(0, |len, coin| coin.map(|_| len + 1))
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }
}

/// Coin mutations inside a caller-owned write transaction.
pub(super) struct Ledger<'a> {
  wtx: &'a WriteTransaction,
}

impl<'a> Ledger<'a> {
  pub(super) fn new(wtx: &'a WriteTransaction) -> Self {
    Self { wtx }
  }

  fn entry(&self, outpoint: OutPoint) -> Result<Option<CoinEntry>> {
    Ok(
      self
        .wtx
        .open_table(OUTPOINT_TO_COIN)?
        .get(&outpoint.store())?
        .map(|entry| CoinEntry::load(entry.value())),
    )
  }

  pub(super) fn get(&self, outpoint: OutPoint) -> Result<Option<Coin>> {
    Ok(
      self
        .entry(outpoint)?
        .filter(|entry| !entry.dropped)
        .map(|entry| entry.coin(outpoint)),
    )
  }

  pub(super) fn coins(&self) -> Result<Vec<Coin>> {
    load_coins(&self.wtx.open_table(OUTPOINT_TO_COIN)?)
  }

  fn insert(&self, outpoint: OutPoint, entry: CoinEntry) -> Result {
    self
      .wtx
      .open_table(OUTPOINT_TO_COIN)?
      .insert(&outpoint.store(), entry.store())?;

    Ok(())
  }

  fn put(&self, coin: Coin) -> Result {
    self.insert(
      coin.outpoint,
      CoinEntry {
        amount: coin.amount,
        block_height: coin.block_height,
        derivation_index: coin.derivation_index,
        dropped: false,
        is_change: coin.is_change,
        spend_info: coin.spend_info,
      },
    )
  }

  /// Returns whether a new coin was recorded. Recording a known outpoint
  /// only fills in a confirmation height that was not known before, or
  /// restores the output of a transaction reported again after being
  /// dropped.
  pub(super) fn record_deposit(&self, deposit: Deposit) -> Result<bool> {
    if let Some(entry) = self.entry(deposit.outpoint)? {
      if entry.dropped {
        self.insert(
          deposit.outpoint,
          CoinEntry {
            block_height: deposit.height,
            dropped: false,
            ..entry
          },
        )?;

        log::info!("Restored output {} of reappeared transaction", deposit.outpoint);

        return Ok(true);
      }

      if let Some(height) = deposit.height {
        return self.confirm(entry.coin(deposit.outpoint), height);
      }

      return Ok(false);
    }

    self.put(Coin {
      outpoint: deposit.outpoint,
      amount: deposit.amount,
      derivation_index: deposit.derivation_index,
      is_change: deposit.is_change,
      block_height: deposit.height,
      spend_info: None,
    })?;

    log::info!(
      "Recorded {} sat deposit to {} index {} at {}",
      deposit.amount.to_sat(),
      Branch::from(deposit.is_change),
      deposit.derivation_index,
      deposit.outpoint,
    );

    Ok(true)
  }

  pub(super) fn confirm_deposit(&self, outpoint: OutPoint, height: u32) -> Result<bool> {
    match self.get(outpoint)? {
      Some(coin) => self.confirm(coin, height),
      None => {
        log::debug!("Ignoring confirmation of unknown output {outpoint}");
        Ok(false)
      }
    }
  }

  fn confirm(&self, mut coin: Coin, height: u32) -> Result<bool> {
    if coin.block_height.is_some() {
      return Ok(false);
    }

    coin.block_height = Some(height);
    self.put(coin)?;

    log::info!("Deposit {} confirmed at height {height}", coin.outpoint);

    Ok(true)
  }

  /// Returns whether the coin's spend info changed.
  pub(super) fn record_spend(
    &self,
    outpoint: OutPoint,
    txid: Txid,
    height: Option<u32>,
  ) -> Result<bool> {
    let Some(mut coin) = self.get(outpoint)? else {
      log::debug!("Ignoring spend of unknown output {outpoint} by {txid}");
      return Ok(false);
    };

    match coin.spend_info {
      Some(info) if info.txid == txid => {
        if info.height.is_some() || height.is_none() {
          return Ok(false);
        }
        log::info!("Spend {txid} of {outpoint} confirmed");
      }
      Some(info) if info.height.is_none() && height.is_some() => {
        log::warn!(
          "Confirmed spend {txid} of {outpoint} replaces unconfirmed spend {}",
          info.txid
        );
      }
      Some(info) => {
        log::warn!(
          "Ignoring spend {txid} of {outpoint}, already spent by {}",
          info.txid
        );
        return Ok(false);
      }
      None => log::info!("Output {outpoint} spent by {txid}"),
    }

    coin.spend_info = Some(SpendInfo { txid, height });
    self.put(coin)?;

    self
      .wtx
      .open_multimap_table(OUTPOINT_TO_RESERVATION)?
      .remove_all(&outpoint.store())?;

    Ok(true)
  }

  /// Clears the spend info of `outpoint` if it still points at `txid`.
  pub(super) fn unset_spend(&self, outpoint: OutPoint, txid: Txid) -> Result<bool> {
    let Some(mut coin) = self.get(outpoint)? else {
      log::debug!("Ignoring unspend of unknown output {outpoint}");
      return Ok(false);
    };

    if coin.spend_info.map(|info| info.txid) != Some(txid) {
      return Ok(false);
    }

    coin.spend_info = None;
    self.put(coin)?;

    log::info!("Output {outpoint} no longer spent by {txid}");

    Ok(true)
  }

  /// Marks the outputs of `txid` as no longer existing. They stay stored so
  /// that a later report of the same transaction restores them.
  pub(super) fn drop_outputs(&self, txid: Txid) -> Result<bool> {
    let mut dropped = Vec::new();

    for result in self.wtx.open_table(OUTPOINT_TO_COIN)?.iter()? {
      let (outpoint, entry) = result?;
      let outpoint = OutPoint::load(*outpoint.value());
      let entry = CoinEntry::load(entry.value());

      if outpoint.txid == txid && !entry.dropped {
        dropped.push((outpoint, entry));
      }
    }

    for (outpoint, entry) in &dropped {
      self.insert(
        *outpoint,
        CoinEntry {
          dropped: true,
          ..*entry
        },
      )?;

      log::info!("Output {outpoint} dropped with its transaction");
    }

    Ok(!dropped.is_empty())
  }

  /// Forgets confirmations above `height`, after the blocks that carried them
  /// left the best chain.
  pub(super) fn rollback(&self, height: u32) -> Result<bool> {
    let mut changed = false;

    for mut coin in self.coins()? {
      let mut rolled_back = false;

      if coin.block_height.is_some_and(|block| block > height) {
        coin.block_height = None;
        rolled_back = true;
      }

      if let Some(info) = coin.spend_info.as_mut() {
        if info.height.is_some_and(|block| block > height) {
          info.height = None;
          rolled_back = true;
        }
      }

      if rolled_back {
        self.put(coin)?;
        log::info!("Rolled back confirmations of {} above {height}", coin.outpoint);
        changed = true;
      }
    }

    Ok(changed)
  }
}

impl Wallet {
  pub fn record_deposit(&self, deposit: Deposit) -> Result<bool> {
    self.write(|wtx| Ledger::new(wtx).record_deposit(deposit))
  }

  pub fn confirm_deposit(&self, outpoint: OutPoint, height: u32) -> Result<bool> {
    self.write(|wtx| Ledger::new(wtx).confirm_deposit(outpoint, height))
  }

  pub fn record_spend(&self, outpoint: OutPoint, txid: Txid, height: Option<u32>) -> Result<bool> {
    self.write(|wtx| Ledger::new(wtx).record_spend(outpoint, txid, height))
  }

  pub fn unset_spend(&self, outpoint: OutPoint, txid: Txid) -> Result<bool> {
    self.write(|wtx| Ledger::new(wtx).unset_spend(outpoint, txid))
  }

  pub fn list_coins(&self, filter: Option<&dyn Fn(&Coin) -> bool>) -> Result<Vec<Coin>> {
    let mut coins = load_coins(&self.database.begin_read()?.open_table(OUTPOINT_TO_COIN)?)?;

    if let Some(filter) = filter {
      coins.retain(|coin| filter(coin));
    }

    Ok(coins)
  }

  pub fn unspent_coins(&self) -> Result<Vec<Coin>> {
    self.list_coins(Some(&|coin: &Coin| !coin.is_spent()))
  }

  /// Looks up `outpoints` in order, skipping unknown ones.
  pub fn coins_by_outpoints(&self, outpoints: &[OutPoint]) -> Result<Vec<Coin>> {
    let rtx = self.database.begin_read()?;
    let coins = rtx.open_table(OUTPOINT_TO_COIN)?;

    let mut found = Vec::new();
    for outpoint in outpoints {
      if let Some(entry) = coins.get(&outpoint.store())? {
        found.extend(live_coin(&outpoint.store(), entry.value()));
      }
    }

    Ok(found)
  }

  pub fn snapshot(&self) -> Result<CoinSnapshot> {
    Ok(CoinSnapshot {
      coins: self.database.begin_read()?.open_table(OUTPOINT_TO_COIN)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn deposit(n: u64, sats: u64) -> Deposit {
    Deposit {
      outpoint: outpoint(n),
      amount: Amount::from_sat(sats),
      derivation_index: 0,
      is_change: false,
      height: None,
    }
  }

  #[test]
  fn record_deposit_is_idempotent() {
    let context = Context::new();

    assert!(context.wallet.record_deposit(deposit(1, 1_000)).unwrap());
    assert!(!context.wallet.record_deposit(deposit(1, 1_000)).unwrap());

    assert_eq!(context.wallet.list_coins(None).unwrap().len(), 1);
  }

  #[test]
  fn repeated_deposit_fills_in_height() {
    let context = Context::new();

    context.wallet.record_deposit(deposit(1, 1_000)).unwrap();
    context
      .wallet
      .record_deposit(Deposit {
        height: Some(10),
        ..deposit(1, 1_000)
      })
      .unwrap();
    context
      .wallet
      .record_deposit(Deposit {
        height: Some(11),
        ..deposit(1, 1_000)
      })
      .unwrap();

    assert_eq!(
      context.wallet.list_coins(None).unwrap()[0].block_height,
      Some(10)
    );
  }

  #[test]
  fn confirm_deposit() {
    let context = Context::new();

    assert!(!context.wallet.confirm_deposit(outpoint(1), 5).unwrap());

    context.wallet.record_deposit(deposit(1, 1_000)).unwrap();

    assert!(context.wallet.confirm_deposit(outpoint(1), 5).unwrap());
    assert!(!context.wallet.confirm_deposit(outpoint(1), 6).unwrap());
    assert!(context.wallet.list_coins(None).unwrap()[0].is_confirmed());
  }

  #[test]
  fn spend_of_unknown_outpoint_is_ignored() {
    let context = Context::new();

    assert!(!context
      .wallet
      .record_spend(outpoint(1), txid(2), None)
      .unwrap());
    assert!(context.wallet.list_coins(None).unwrap().is_empty());
  }

  #[test]
  fn spend_info_is_set_once() {
    let context = Context::new();

    context.wallet.record_deposit(deposit(1, 1_000)).unwrap();

    assert!(context
      .wallet
      .record_spend(outpoint(1), txid(2), None)
      .unwrap());
    assert!(!context
      .wallet
      .record_spend(outpoint(1), txid(2), None)
      .unwrap());
    assert!(!context
      .wallet
      .record_spend(outpoint(1), txid(3), None)
      .unwrap());

    assert_eq!(
      context.wallet.list_coins(None).unwrap()[0].spend_info,
      Some(SpendInfo {
        txid: txid(2),
        height: None,
      }),
    );

    assert!(context
      .wallet
      .record_spend(outpoint(1), txid(2), Some(7))
      .unwrap());

    assert_eq!(
      context.wallet.list_coins(None).unwrap()[0].spend_info,
      Some(SpendInfo {
        txid: txid(2),
        height: Some(7),
      }),
    );
  }

  #[test]
  fn confirmed_conflict_replaces_unconfirmed_spend() {
    let context = Context::new();

    context.wallet.record_deposit(deposit(1, 1_000)).unwrap();
    context
      .wallet
      .record_spend(outpoint(1), txid(2), None)
      .unwrap();

    assert!(context
      .wallet
      .record_spend(outpoint(1), txid(3), Some(9))
      .unwrap());
    assert!(!context
      .wallet
      .record_spend(outpoint(1), txid(4), Some(10))
      .unwrap());

    assert_eq!(
      context.wallet.list_coins(None).unwrap()[0]
        .spend_info
        .unwrap()
        .txid,
      txid(3)
    );
  }

  #[test]
  fn unset_spend_requires_matching_txid() {
    let context = Context::new();

    context.wallet.record_deposit(deposit(1, 1_000)).unwrap();
    context
      .wallet
      .record_spend(outpoint(1), txid(2), None)
      .unwrap();

    assert!(!context.wallet.unset_spend(outpoint(1), txid(3)).unwrap());
    assert!(context.wallet.unset_spend(outpoint(1), txid(2)).unwrap());
    assert!(!context.wallet.unset_spend(outpoint(1), txid(2)).unwrap());

    assert_eq!(context.wallet.unspent_coins().unwrap().len(), 1);
  }

  #[test]
  fn list_coins_filters() {
    let context = Context::new();

    context.wallet.record_deposit(deposit(1, 1_000)).unwrap();
    context.wallet.record_deposit(deposit(2, 2_000)).unwrap();
    context.wallet.record_deposit(deposit(3, 3_000)).unwrap();
    context
      .wallet
      .record_spend(outpoint(2), txid(4), None)
      .unwrap();

    assert_eq!(
      context
        .wallet
        .unspent_coins()
        .unwrap()
        .into_iter()
        .map(|coin| coin.outpoint)
        .collect::<Vec<OutPoint>>(),
      [outpoint(1), outpoint(3)],
    );

    assert_eq!(
      context
        .wallet
        .list_coins(Some(&|coin: &Coin| coin.amount > Amount::from_sat(1_500)))
        .unwrap()
        .len(),
      2
    );
  }

  #[test]
  fn coins_by_outpoints_preserves_request_order() {
    let context = Context::new();

    context.wallet.record_deposit(deposit(1, 1_000)).unwrap();
    context.wallet.record_deposit(deposit(2, 2_000)).unwrap();

    assert_eq!(
      context
        .wallet
        .coins_by_outpoints(&[outpoint(2), outpoint(5), outpoint(1)])
        .unwrap()
        .into_iter()
        .map(|coin| coin.outpoint)
        .collect::<Vec<OutPoint>>(),
      [outpoint(2), outpoint(1)],
    );
  }

  #[test]
  fn snapshot_is_consistent_and_restartable() {
    let context = Context::new();

    context.wallet.record_deposit(deposit(1, 1_000)).unwrap();

    let snapshot = context.wallet.snapshot().unwrap();

    context.wallet.record_deposit(deposit(2, 2_000)).unwrap();

    assert_eq!(snapshot.len().unwrap(), 1);

    for _ in 0..2 {
      assert_eq!(
        snapshot
          .iter()
          .unwrap()
          .map(|coin| coin.unwrap().outpoint)
          .collect::<Vec<OutPoint>>(),
        [outpoint(1)],
      );
    }

    assert_eq!(context.wallet.snapshot().unwrap().len().unwrap(), 2);
  }
}
