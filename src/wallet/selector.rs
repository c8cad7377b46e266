use super::*;

/// A proposal's claim on a coin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Hold {
  pub(super) created_at: u64,
  pub(super) status: SpendStatus,
  pub(super) txid: Txid,
}

impl Hold {
  /// Signed and broadcast proposals hold their coins until the spend is
  /// observed or the proposal is abandoned.
  fn is_firm(self) -> bool {
    self.status != SpendStatus::Created
  }

  fn is_live(self, now: u64, timeout: Duration) -> bool {
    self.is_firm() || now.saturating_sub(self.created_at) < timeout.as_secs()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Candidate {
  pub(super) coin: Coin,
  pub(super) holds: Vec<Hold>,
}

pub(super) struct CoinSelector<'a> {
  pub(super) candidates: &'a [Candidate],
  pub(super) fee_rate: FeeRate,
  pub(super) now: u64,
  pub(super) outputs: &'a [TxOut],
  pub(super) reservation_timeout: Duration,
  pub(super) satisfaction_weight: Weight,
}

impl CoinSelector<'_> {
  pub(super) fn select(&self, requested: Option<&[OutPoint]>) -> Result<Vec<Coin>> {
    match requested {
      Some(outpoints) => self.explicit(outpoints),
      None => self.automatic(),
    }
  }

  fn needed(&self, inputs: usize) -> Amount {
    let fee = self.fee_rate.fee(estimate_vsize(
      inputs,
      self.outputs,
      self.satisfaction_weight,
    ));

    total(
      self
        .outputs
        .iter()
        .map(|output| output.value)
        .chain([fee]),
    )
  }

  fn explicit(&self, outpoints: &[OutPoint]) -> Result<Vec<Coin>> {
    if outpoints.is_empty() {
      return Err(Error::NoOutpoint);
    }

    let candidates = self
      .candidates
      .iter()
      .map(|candidate| (candidate.coin.outpoint, candidate))
      .collect::<HashMap<OutPoint, &Candidate>>();

    let mut seen = HashSet::new();
    let mut selected = Vec::new();

    for &outpoint in outpoints {
      if !seen.insert(outpoint) {
        return Err(Error::DuplicateOutpoint { outpoint });
      }

      let candidate = candidates
        .get(&outpoint)
        .ok_or(Error::UnknownOutpoint { outpoint })?;

      if let Some(info) = candidate.coin.spend_info {
        return Err(Error::AlreadySpent {
          outpoint,
          txid: info.txid,
        });
      }

      if let Some(hold) = candidate.holds.iter().find(|hold| hold.is_firm()) {
        return Err(Error::CoinReserved {
          outpoint,
          txid: hold.txid,
        });
      }

      selected.push(candidate.coin);
    }

    let available = total(selected.iter().map(|coin| coin.amount));
    let needed = self.needed(selected.len());

    if available < needed {
      return Err(Error::InsufficientFunds { available, needed });
    }

    Ok(selected)
  }

  fn automatic(&self) -> Result<Vec<Coin>> {
    let mut eligible = self
      .candidates
      .iter()
      .filter(|candidate| {
        candidate.coin.is_confirmed()
          && !candidate.coin.is_spent()
          && !candidate
            .holds
            .iter()
            .any(|hold| hold.is_live(self.now, self.reservation_timeout))
      })
      .map(|candidate| candidate.coin)
      .collect::<Vec<Coin>>();

    eligible.sort_by(|a, b| {
      b.amount
        .cmp(&a.amount)
        .then_with(|| a.outpoint.cmp(&b.outpoint))
    });

    let mut selected = Vec::new();
    let mut available = Amount::ZERO;

    for coin in eligible {
      selected.push(coin);
      available = total([available, coin.amount]);

      let needed = self.needed(selected.len());

      if available >= needed {
        log::debug!(
          "Selected {} coins worth {} sat to cover {} sat",
          selected.len(),
          available.to_sat(),
          needed.to_sat(),
        );
        return Ok(selected);
      }

      log::debug!(
        "Added {} sat coin {}, {} sat short",
        coin.amount.to_sat(),
        coin.outpoint,
        (needed - available).to_sat(),
      );
    }

    Err(Error::InsufficientFunds {
      available,
      needed: self.needed(selected.len().max(1)),
    })
  }
}

impl Wallet {
  /// Coins a spend to `destinations` would use at `fee_rate`, without
  /// reserving them.
  pub fn select_coins(
    &self,
    destinations: &[(Address<NetworkUnchecked>, Amount)],
    outpoints: Option<&[OutPoint]>,
    fee_rate: FeeRate,
  ) -> Result<Vec<Coin>> {
    let outputs = self.destination_outputs(destinations)?;

    let wtx = self.begin_write()?;

    let selected = CoinSelector {
      candidates: &self.candidates(&wtx)?,
      fee_rate,
      now: unix_time(),
      outputs: &outputs,
      reservation_timeout: self.policy.reservation_timeout,
      satisfaction_weight: self.descriptor.max_satisfaction_weight()?,
    }
    .select(outpoints);

    wtx.abort()?;

    selected
  }

  pub(super) fn candidates(&self, wtx: &WriteTransaction) -> Result<Vec<Candidate>> {
    let coins = Ledger::new(wtx).coins()?;
    let tracker = Tracker::new(wtx);

    coins
      .into_iter()
      .map(|coin| {
        Ok(Candidate {
          holds: tracker.holds(coin.outpoint)?,
          coin,
        })
      })
      .collect()
  }
}
