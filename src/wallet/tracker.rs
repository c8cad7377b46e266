use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpendStatus {
  Created,
  Signed,
  Broadcast,
}

impl Display for SpendStatus {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    match self {
      Self::Created => write!(f, "created"),
      Self::Signed => write!(f, "signed"),
      Self::Broadcast => write!(f, "broadcast"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpendProposal {
  pub txid: Txid,
  pub psbt: Psbt,
  pub change_index: Option<u32>,
  pub change_vout: Option<u32>,
  pub created_at: u64,
  pub status: SpendStatus,
}

impl SpendProposal {
  pub fn selected_outpoints(&self) -> Vec<OutPoint> {
    self
      .psbt
      .unsigned_tx
      .input
      .iter()
      .map(|input| input.previous_output)
      .collect()
  }

  /// Outputs other than change, in caller order.
  pub fn destinations(&self) -> Vec<TxOut> {
    self
      .psbt
      .unsigned_tx
      .output
      .iter()
      .enumerate()
      .filter(|(vout, _)| u32::try_from(*vout).ok() != self.change_vout)
      .map(|(_, output)| output.clone())
      .collect()
  }
}

/// Proposal and reservation bookkeeping inside a caller-owned write
/// transaction.
pub(super) struct Tracker<'a> {
  wtx: &'a WriteTransaction,
}

impl<'a> Tracker<'a> {
  pub(super) fn new(wtx: &'a WriteTransaction) -> Self {
    Self { wtx }
  }

  pub(super) fn get(&self, txid: Txid) -> Result<Option<SpendEntry>> {
    Ok(
      self
        .wtx
        .open_table(TXID_TO_SPEND)?
        .get(&txid.store())?
        .map(|entry| SpendEntry::load(entry.value())),
    )
  }

  pub(super) fn put(&self, txid: Txid, entry: SpendEntry) -> Result {
    self
      .wtx
      .open_table(TXID_TO_SPEND)?
      .insert(&txid.store(), entry.store())?;
    Ok(())
  }

  /// Records a freshly built proposal and reserves its inputs. A proposal
  /// for the same unsigned transaction is kept, with its reservation renewed.
  pub(super) fn register(
    &self,
    psbt: Psbt,
    change: Option<(u32, u32)>,
    now: u64,
  ) -> Result<SpendProposal> {
    let txid = psbt.unsigned_tx.compute_txid();

    let entry = match self.get(txid)? {
      Some(existing) => {
        log::info!("Spend {txid} already exists, renewing reservation");
        SpendEntry {
          created_at: now,
          ..existing
        }
      }
      None => SpendEntry {
        change_index: change.map(|(index, _)| index),
        change_vout: change.map(|(_, vout)| vout),
        created_at: now,
        psbt: psbt.serialize(),
        status: SpendStatus::Created,
      },
    };

    self.put(txid, entry.clone())?;

    let proposal = entry.proposal(txid)?;

    self.reserve(&proposal.selected_outpoints(), txid)?;

    Ok(proposal)
  }

  pub(super) fn remove(&self, txid: Txid) -> Result<Option<SpendEntry>> {
    let Some(entry) = self
      .wtx
      .open_table(TXID_TO_SPEND)?
      .remove(&txid.store())?
      .map(|entry| SpendEntry::load(entry.value()))
    else {
      return Ok(None);
    };

    self.release(&entry.clone().proposal(txid)?.selected_outpoints(), txid)?;

    Ok(Some(entry))
  }

  pub(super) fn reserve(&self, outpoints: &[OutPoint], txid: Txid) -> Result {
    let mut reservations = self.wtx.open_multimap_table(OUTPOINT_TO_RESERVATION)?;

    for outpoint in outpoints {
      reservations.insert(&outpoint.store(), &txid.store())?;
    }

    Ok(())
  }

  pub(super) fn release(&self, outpoints: &[OutPoint], txid: Txid) -> Result {
    let mut reservations = self.wtx.open_multimap_table(OUTPOINT_TO_RESERVATION)?;

    for outpoint in outpoints {
      reservations.remove(&outpoint.store(), &txid.store())?;
    }

    Ok(())
  }

  pub(super) fn holds(&self, outpoint: OutPoint) -> Result<Vec<Hold>> {
    let txids = self
      .wtx
      .open_multimap_table(OUTPOINT_TO_RESERVATION)?
      .get(&outpoint.store())?
      .map(|txid| Ok(Txid::load(*txid?.value())))
      .collect::<Result<Vec<Txid>>>()?;

    let mut holds = Vec::new();

    for txid in txids {
      match self.get(txid)? {
        Some(entry) => holds.push(Hold {
          created_at: entry.created_at,
          status: entry.status,
          txid,
        }),
        None => log::warn!("Reservation of {outpoint} by unknown spend {txid}"),
      }
    }

    Ok(holds)
  }

  pub(super) fn set_status(&self, txid: Txid, status: SpendStatus) -> Result<bool> {
    let Some(entry) = self.get(txid)? else {
      return Ok(false);
    };

    if entry.status == status {
      return Ok(false);
    }

    log::info!("Spend {txid} {} -> {status}", entry.status);

    self.put(txid, SpendEntry { status, ..entry })?;

    Ok(true)
  }
}

pub(super) fn load_proposals(
  spends: &impl ReadableTable<&'static TxidValue, SpendEntryValue>,
) -> Result<Vec<SpendProposal>> {
  spends
    .iter()?
    .map(|result| {
      let (txid, entry) = result?;
      SpendEntry::load(entry.value()).proposal(Txid::load(*txid.value()))
    })
    .collect()
}

impl Wallet {
  fn unsatisfied_inputs(&self, wtx: &WriteTransaction, psbt: &Psbt) -> Result<Vec<usize>> {
    let ledger = Ledger::new(wtx);

    let mut unsatisfied = Vec::new();

    for (i, input) in psbt.unsigned_tx.input.iter().enumerate() {
      let outpoint = input.previous_output;

      let coin = ledger
        .get(outpoint)?
        .ok_or(Error::UnknownOutpoint { outpoint })?;

      let derived = self
        .descriptor
        .derive(coin.branch(), coin.derivation_index)?;

      if derived
        .get_satisfaction(PsbtInputSatisfier::new(psbt, i))
        .is_err()
      {
        unsatisfied.push(i);
      }
    }

    Ok(unsatisfied)
  }

  /// Merges the signatures in `psbt` into the stored proposal for the same
  /// unsigned transaction. The merged signatures are persisted even if they
  /// do not yet satisfy every input, in which case `IncompleteSignature` is
  /// returned and the proposal stays `Created`.
  pub fn submit_signed(&self, psbt: Psbt) -> Result<SpendStatus> {
    let txid = psbt.unsigned_tx.compute_txid();

    let wtx = self.begin_write()?;
    let tracker = Tracker::new(&wtx);

    let entry = tracker.get(txid)?.ok_or(Error::UnknownProposal { txid })?;

    let mut merged = entry.clone().proposal(txid)?.psbt;

    merged.combine(psbt).map_err(|err| Error::Psbt {
      message: err.to_string(),
    })?;

    let unsatisfied = self.unsatisfied_inputs(&wtx, &merged)?;

    let status = if unsatisfied.is_empty() && entry.status == SpendStatus::Created {
      SpendStatus::Signed
    } else {
      entry.status
    };

    tracker.put(
      txid,
      SpendEntry {
        psbt: merged.serialize(),
        status,
        ..entry
      },
    )?;

    wtx.commit()?;

    if !unsatisfied.is_empty() {
      log::info!(
        "Stored partial signatures for spend {txid}, {} inputs unsatisfied",
        unsatisfied.len()
      );
      return Err(Error::IncompleteSignature {
        txid,
        inputs: unsatisfied,
      });
    }

    log::info!("Spend {txid} is {status}");

    Ok(status)
  }

  /// Finalizes a signed proposal and hands it to `broadcaster`. The status
  /// only becomes `Broadcast` once the broadcaster accepted the transaction.
  pub fn broadcast(&self, broadcaster: &dyn Broadcaster, txid: Txid) -> Result<Txid> {
    let transaction = {
      let wtx = self.begin_write()?;

      let proposal = Tracker::new(&wtx)
        .get(txid)?
        .filter(|entry| entry.status != SpendStatus::Created)
        .ok_or(Error::UnknownProposal { txid })?
        .proposal(txid)?;

      let ledger = Ledger::new(&wtx);

      for outpoint in proposal.selected_outpoints() {
        if let Some(info) = ledger.get(outpoint)?.and_then(|coin| coin.spend_info) {
          if info.txid != txid {
            return Err(Error::AlreadySpent {
              outpoint,
              txid: info.txid,
            });
          }
        }
      }

      wtx.abort()?;

      let mut psbt = proposal.psbt;

      psbt
        .finalize_mut(&self.secp)
        .map_err(|errors| Error::SpendFinalization {
          txid,
          message: errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<String>>()
            .join(", "),
        })?;

      psbt.extract_tx_unchecked_fee_rate()
    };

    broadcaster
      .broadcast(&transaction)
      .map_err(|err| Error::Broadcast {
        txid,
        message: format!("{err:#}"),
      })?;

    log::info!("Broadcast spend {txid}");

    self.write(|wtx| {
      if !Tracker::new(wtx).set_status(txid, SpendStatus::Broadcast)?
        && Tracker::new(wtx).get(txid)?.is_none()
      {
        log::warn!("Spend {txid} was abandoned while being broadcast");
      }
      Ok(())
    })?;

    Ok(txid)
  }

  /// Deletes a proposal that has not been broadcast and releases its
  /// reservations. The change index it used stays allocated.
  pub fn abandon(&self, txid: Txid) -> Result {
    self.write(|wtx| {
      let tracker = Tracker::new(wtx);

      match tracker.get(txid)? {
        None => Err(Error::UnknownProposal { txid }),
        Some(entry) if entry.status == SpendStatus::Broadcast => {
          Err(Error::ProposalBroadcast { txid })
        }
        Some(_) => {
          tracker.remove(txid)?;
          log::info!("Abandoned spend {txid}");
          Ok(())
        }
      }
    })
  }

  pub fn proposal(&self, txid: Txid) -> Result<Option<SpendProposal>> {
    self
      .database
      .begin_read()?
      .open_table(TXID_TO_SPEND)?
      .get(&txid.store())?
      .map(|entry| SpendEntry::load(entry.value()).proposal(txid))
      .transpose()
  }

  pub fn list_proposals(&self) -> Result<Vec<SpendProposal>> {
    load_proposals(&self.database.begin_read()?.open_table(TXID_TO_SPEND)?)
  }
}
