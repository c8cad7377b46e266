use super::*;

/// Chain activity reported to the wallet. Every event is idempotent:
/// delivering it twice leaves the wallet as delivering it once.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainEvent {
  /// An output paying a wallet script, reported by an external scanner.
  Deposit(Deposit),
  /// A transaction seen in the mempool (`height` is `None`) or in a block.
  Transaction {
    transaction: Transaction,
    height: Option<u32>,
  },
  /// A wallet output spent by `txid`.
  Spend {
    outpoint: OutPoint,
    txid: Txid,
    height: Option<u32>,
  },
  /// A previously seen transaction is no longer observable. Its outputs stop
  /// being coins until the transaction is reported again.
  Dropped { txid: Txid },
  /// Blocks above `height` left the best chain.
  Rollback { height: u32 },
}

impl Wallet {
  /// Applies `event` in a single write transaction and returns whether the
  /// wallet changed.
  pub fn apply(&self, event: ChainEvent) -> Result<bool> {
    self.write(|wtx| match event {
      ChainEvent::Deposit(deposit) => self.apply_deposit(wtx, deposit),
      ChainEvent::Transaction {
        transaction,
        height,
      } => self.apply_transaction(wtx, &transaction, height),
      ChainEvent::Spend {
        outpoint,
        txid,
        height,
      } => Ledger::new(wtx).record_spend(outpoint, txid, height),
      ChainEvent::Dropped { txid } => Self::apply_dropped(wtx, txid),
      ChainEvent::Rollback { height } => Ledger::new(wtx).rollback(height),
    })
  }

  fn apply_deposit(&self, wtx: &WriteTransaction, deposit: Deposit) -> Result<bool> {
    Allocator::new(wtx, &self.descriptor)
      .observe(Branch::from(deposit.is_change), deposit.derivation_index)?;

    Ledger::new(wtx).record_deposit(deposit)
  }

  fn apply_transaction(
    &self,
    wtx: &WriteTransaction,
    transaction: &Transaction,
    height: Option<u32>,
  ) -> Result<bool> {
    let txid = transaction.compute_txid();
    let ledger = Ledger::new(wtx);
    let allocator = Allocator::new(wtx, &self.descriptor);

    let mut changed = false;

    if !transaction.is_coinbase() {
      for input in &transaction.input {
        changed |= ledger.record_spend(input.previous_output, txid, height)?;
      }
    }

    for (vout, output) in (0..).zip(&transaction.output) {
      let Some((branch, index)) = allocator.derivation(&output.script_pubkey)? else {
        continue;
      };

      changed |= ledger.record_deposit(Deposit {
        outpoint: OutPoint { txid, vout },
        amount: output.value,
        derivation_index: index,
        is_change: branch.is_change(),
        height,
      })?;
    }

    changed |= Tracker::new(wtx).set_status(txid, SpendStatus::Broadcast)?;

    Ok(changed)
  }

  fn apply_dropped(wtx: &WriteTransaction, txid: Txid) -> Result<bool> {
    let ledger = Ledger::new(wtx);

    let mut changed = false;

    for coin in ledger.coins()? {
      if coin.spend_info.map(|info| info.txid) == Some(txid) {
        changed |= ledger.unset_spend(coin.outpoint, txid)?;
      }
    }

    changed |= ledger.drop_outputs(txid)?;

    let tracker = Tracker::new(wtx);

    if let Some(entry) = tracker.get(txid)? {
      if entry.status == SpendStatus::Broadcast {
        let outpoints = entry.proposal(txid)?.selected_outpoints();
        tracker.set_status(txid, SpendStatus::Signed)?;
        tracker.reserve(&outpoints, txid)?;
        changed = true;
      }
    }

    Ok(changed)
  }
}
