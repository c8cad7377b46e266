//! Spend construction.
//!
//! `SpendBuilder` turns a selection of coins and an ordered list of
//! destination outputs into an unsigned PSBT. It pays the fee implied by the
//! fee rate and the worst-case satisfaction size of the wallet descriptor, and
//! decides whether leftover value is returned to a change output or left to
//! miners.
//!
//! Each step of the pipeline is a method consuming and returning the builder,
//! and `build` checks the result against the fee sanity limits before handing
//! back the PSBT.

use super::*;

pub(super) const MAX_FEE: Amount = Amount::ONE_BTC;
pub(super) const MAX_FEE_RATE: u64 = 1_000;

/// Size of the transaction under construction once every input carries its
/// worst-case satisfaction.
pub(super) fn estimate_vsize(
  inputs: usize,
  outputs: &[TxOut],
  satisfaction_weight: Weight,
) -> usize {
  let transaction = Transaction {
    version: Version(2),
    lock_time: LockTime::ZERO,
    input: (0..inputs)
      .map(|_| TxIn {
        previous_output: OutPoint::null(),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
        witness: Witness::new(),
      })
      .collect(),
    output: outputs.to_vec(),
  };

  let satisfaction = transaction
    .input
    .iter()
    .fold(Weight::ZERO, |weight, _| weight + satisfaction_weight);

  let weight = transaction.weight() + SEGWIT_MARKER_WEIGHT + satisfaction;

  usize::try_from(weight.to_vbytes_ceil()).unwrap_or(usize::MAX)
}

const SEGWIT_MARKER_WEIGHT: Weight = Weight::from_wu(2);

/// Sum of `amounts`, or `Amount::MAX` if it does not fit.
pub(super) fn total(amounts: impl IntoIterator<Item = Amount>) -> Amount {
  amounts
    .into_iter()
    .try_fold(Amount::ZERO, Amount::checked_add)
    .unwrap_or(Amount::MAX)
}

pub(super) struct BuiltSpend {
  pub(super) change: Option<(u32, u32)>,
  pub(super) psbt: Psbt,
}

pub(super) struct SpendBuilder<'a> {
  pub(super) change_index: u32,
  pub(super) coins: Vec<Coin>,
  pub(super) descriptor: &'a WalletDescriptor,
  pub(super) dust_limit: Amount,
  pub(super) fee_rate: FeeRate,
  pub(super) outputs: Vec<TxOut>,
  pub(super) satisfaction_weight: Weight,
  change: Option<(usize, Descriptor<DefiniteDescriptorKey>)>,
}

impl<'a> SpendBuilder<'a> {
  pub(super) fn new(
    coins: Vec<Coin>,
    outputs: Vec<TxOut>,
    descriptor: &'a WalletDescriptor,
    change_index: u32,
    fee_rate: FeeRate,
    dust_limit: Amount,
  ) -> Result<Self> {
    Ok(Self {
      change_index,
      coins,
      descriptor,
      dust_limit,
      fee_rate,
      outputs,
      satisfaction_weight: descriptor.max_satisfaction_weight()?,
      change: None,
    })
  }

  pub(super) fn build(self) -> Result<BuiltSpend> {
    self.check_shape()?.check_funds()?.add_change()?.build_psbt()
  }

  fn total_in(&self) -> Amount {
    total(self.coins.iter().map(|coin| coin.amount))
  }

  fn total_out(&self) -> Amount {
    total(self.outputs.iter().map(|output| output.value))
  }

  fn estimate_fee_with(&self, outputs: &[TxOut]) -> Amount {
    self.fee_rate.fee(estimate_vsize(
      self.coins.len(),
      outputs,
      self.satisfaction_weight,
    ))
  }

  fn check_shape(self) -> Result<Self> {
    if self.outputs.is_empty() {
      return Err(Error::NoDestination);
    }

    if self.coins.is_empty() {
      return Err(Error::NoOutpoint);
    }

    for output in &self.outputs {
      if output.value < self.dust_limit || output.value > Amount::MAX_MONEY {
        return Err(Error::InvalidOutputValue {
          value: output.value,
          dust_limit: self.dust_limit,
        });
      }
    }

    Ok(self)
  }

  fn check_funds(self) -> Result<Self> {
    let available = self.total_in();
    let needed = total([self.total_out(), self.estimate_fee_with(&self.outputs)]);

    if available < needed {
      return Err(Error::InsufficientFunds { available, needed });
    }

    Ok(self)
  }

  /// Appends a change output if the value left after paying for it is at
  /// least the dust limit. The change descriptor is only derived when the
  /// leftover without a change output could reach the dust limit.
  fn add_change(mut self) -> Result<Self> {
    let excess = self
      .total_in()
      .checked_sub(self.total_out())
      .and_then(|excess| excess.checked_sub(self.estimate_fee_with(&self.outputs)));

    if !excess.is_some_and(|excess| excess >= self.dust_limit) {
      tprintln!("no value left for change");
      return Ok(self);
    }

    let change_descriptor = self.descriptor.derive(Branch::Change, self.change_index)?;

    let change_output = TxOut {
      value: Amount::ZERO,
      script_pubkey: change_descriptor.script_pubkey(),
    };

    let mut outputs = self.outputs.clone();
    outputs.push(change_output.clone());

    let fee = self.estimate_fee_with(&outputs);

    match self
      .total_in()
      .checked_sub(self.total_out())
      .and_then(|excess| excess.checked_sub(fee))
    {
      Some(change) if change >= self.dust_limit => {
        tprintln!("adding {} sat change output", change.to_sat());
        self.change = Some((self.outputs.len(), change_descriptor));
        self.outputs.push(TxOut {
          value: change,
          ..change_output
        });
      }
      Some(change) => {
        tprintln!("leaving {} sat below dust limit to fees", change.to_sat());
      }
      None => tprintln!("no value left for change"),
    }

    Ok(self)
  }

  fn build_psbt(self) -> Result<BuiltSpend> {
    let unsigned_tx = Transaction {
      version: Version(2),
      lock_time: LockTime::ZERO,
      input: self
        .coins
        .iter()
        .map(|coin| TxIn {
          previous_output: coin.outpoint,
          script_sig: ScriptBuf::new(),
          sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
          witness: Witness::new(),
        })
        .collect(),
      output: self.outputs.clone(),
    };

    let mut psbt = Psbt::from_unsigned_tx(unsigned_tx).map_err(|err| Error::Psbt {
      message: err.to_string(),
    })?;

    for (i, coin) in self.coins.iter().enumerate() {
      let derived = self.descriptor.derive(coin.branch(), coin.derivation_index)?;

      psbt.inputs[i].witness_utxo = Some(TxOut {
        value: coin.amount,
        script_pubkey: derived.script_pubkey(),
      });

      psbt
        .update_input_with_descriptor(i, &derived)
        .map_err(|err| Error::Psbt {
          message: format!("failed to update input {i}: {err:?}"),
        })?;
    }

    if let Some((vout, change_descriptor)) = &self.change {
      psbt
        .update_output_with_descriptor(*vout, change_descriptor)
        .map_err(|err| Error::Psbt {
          message: format!("failed to update change output: {err:?}"),
        })?;
    }

    let fee = self.total_in() - self.total_out();

    sanity_check(
      &psbt,
      fee,
      estimate_vsize(
        self.coins.len(),
        &psbt.unsigned_tx.output,
        self.satisfaction_weight,
      ),
    )?;

    Ok(BuiltSpend {
      change: self
        .change
        .as_ref()
        .map(|(vout, _)| (self.change_index, u32::try_from(*vout).unwrap_or(u32::MAX))),
      psbt,
    })
  }
}

fn sanity_check(psbt: &Psbt, fee: Amount, vsize: usize) -> Result {
  if psbt.inputs.len() != psbt.unsigned_tx.input.len()
    || psbt.outputs.len() != psbt.unsigned_tx.output.len()
  {
    return Err(Error::Psbt {
      message: "PSBT input or output count does not match its transaction".into(),
    });
  }

  if fee > MAX_FEE {
    return Err(Error::InsaneFees {
      message: format!(
        "fee of {} sat exceeds {} sat",
        fee.to_sat(),
        MAX_FEE.to_sat()
      ),
    });
  }

  let vsize = u64::try_from(vsize).unwrap_or(u64::MAX).max(1);

  if fee.to_sat() / vsize > MAX_FEE_RATE {
    return Err(Error::InsaneFees {
      message: format!(
        "fee rate of {} sat/vB exceeds {MAX_FEE_RATE} sat/vB",
        fee.to_sat() / vsize
      ),
    });
  }

  if fee.to_sat() < vsize {
    return Err(Error::InsaneFees {
      message: format!("fee of {} sat is below 1 sat/vB", fee.to_sat()),
    });
  }

  Ok(())
}

impl Wallet {
  /// Validates destinations and turns them into outputs, in order.
  pub(super) fn destination_outputs(
    &self,
    destinations: &[(Address<NetworkUnchecked>, Amount)],
  ) -> Result<Vec<TxOut>> {
    if destinations.is_empty() {
      return Err(Error::NoDestination);
    }

    destinations
      .iter()
      .map(|(address, amount)| {
        if !address.is_valid_for_network(self.network) {
          return Err(Error::WrongNetwork {
            address: address.clone().assume_checked().to_string(),
            network: self.network,
          });
        }

        if *amount < self.policy.dust_limit || *amount > Amount::MAX_MONEY {
          return Err(Error::InvalidOutputValue {
            value: *amount,
            dust_limit: self.policy.dust_limit,
          });
        }

        Ok(TxOut {
          value: *amount,
          script_pubkey: address.clone().assume_checked().script_pubkey(),
        })
      })
      .collect()
  }

  fn estimate_fee_rate(
    &self,
    fee_estimator: &dyn FeeEstimator,
    conf_target: u32,
  ) -> Result<FeeRate> {
    let fee_rate = fee_estimator
      .estimate(conf_target)
      .map_err(|err| Error::FeeEstimationUnavailable {
        conf_target,
        message: format!("{err:#}"),
      })?;

    if fee_rate.exceeds(MAX_FEE_RATE) {
      return Err(Error::InsaneFees {
        message: format!("fee rate of {fee_rate} exceeds {MAX_FEE_RATE} sat/vB"),
      });
    }

    if fee_rate < FeeRate::MIN_RELAY {
      log::debug!("Raising estimated fee rate {fee_rate} to minimum relay fee rate");
      return Ok(FeeRate::MIN_RELAY);
    }

    Ok(fee_rate)
  }

  /// Builds an unsigned spend paying `destinations` in order, funded by
  /// `outpoints` if given or by automatic coin selection otherwise, at the fee
  /// rate estimated for `conf_target`. Change index allocation, input
  /// reservation, and proposal registration commit atomically.
  pub fn create_spend(
    &self,
    fee_estimator: &dyn FeeEstimator,
    destinations: &[(Address<NetworkUnchecked>, Amount)],
    outpoints: Option<&[OutPoint]>,
    conf_target: u32,
  ) -> Result<SpendProposal> {
    self.create_spend_at(
      fee_estimator,
      destinations,
      outpoints,
      conf_target,
      unix_time(),
    )
  }

  pub(crate) fn create_spend_at(
    &self,
    fee_estimator: &dyn FeeEstimator,
    destinations: &[(Address<NetworkUnchecked>, Amount)],
    outpoints: Option<&[OutPoint]>,
    conf_target: u32,
    now: u64,
  ) -> Result<SpendProposal> {
    let outputs = self.destination_outputs(destinations)?;

    let fee_rate = self.estimate_fee_rate(fee_estimator, conf_target)?;

    let wtx = self.begin_write()?;

    let coins = CoinSelector {
      candidates: &self.candidates(&wtx)?,
      fee_rate,
      now,
      outputs: &outputs,
      reservation_timeout: self.policy.reservation_timeout,
      satisfaction_weight: self.descriptor.max_satisfaction_weight()?,
    }
    .select(outpoints)?;

    let allocator = Allocator::new(&wtx, &self.descriptor);

    let spend = SpendBuilder::new(
      coins,
      outputs,
      &self.descriptor,
      allocator.peek(Branch::Change)?,
      fee_rate,
      self.policy.dust_limit,
    )?
    .build()?;

    if let Some((change_index, _)) = spend.change {
      let allocated = allocator.allocate(Branch::Change)?;
      debug_assert_eq!(allocated, change_index, "change index allocated twice");
    }

    let proposal = Tracker::new(&wtx).register(spend.psbt, spend.change, now)?;

    wtx.commit()?;

    log::info!(
      "Created spend {} with {} inputs and {} outputs at {fee_rate}",
      proposal.txid,
      proposal.psbt.unsigned_tx.input.len(),
      proposal.psbt.unsigned_tx.output.len(),
    );

    Ok(proposal)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fee_rate(rate: f64) -> FixedFeeRate {
    FixedFeeRate(FeeRate::try_from(rate).unwrap())
  }

  fn total_in(context: &Context, psbt: &Psbt) -> Amount {
    context
      .wallet
      .coins_by_outpoints(
        &psbt
          .unsigned_tx
          .input
          .iter()
          .map(|input| input.previous_output)
          .collect::<Vec<OutPoint>>(),
      )
      .unwrap()
      .iter()
      .map(|coin| coin.amount)
      .sum()
  }

  #[test]
  fn estimate_grows_with_inputs_and_satisfaction() {
    let outputs = [TxOut {
      value: Amount::from_sat(1_000),
      script_pubkey: ScriptBuf::new_p2wsh(&WScriptHash::all_zeros()),
    }];

    let light = estimate_vsize(1, &outputs, Weight::from_wu(100));
    let heavy = estimate_vsize(1, &outputs, Weight::from_wu(400));

    assert_eq!(heavy - light, 75);
    assert!(estimate_vsize(2, &outputs, Weight::from_wu(100)) > light + 41);
  }

  #[test]
  fn spend_with_change() {
    let context = Context::new();
    let coin = context.fund(1_000_000, Some(1));

    let proposal = context
      .wallet
      .create_spend(
        &fee_rate(2.0),
        &[
          (external_address(0), Amount::from_sat(100_000)),
          (external_address(1), Amount::from_sat(100_000)),
        ],
        Some(&[coin]),
        2,
      )
      .unwrap();

    let tx = &proposal.psbt.unsigned_tx;

    assert_eq!(tx.input.len(), 1);
    assert_eq!(tx.output.len(), 3);
    assert_eq!(tx.output[0].value, Amount::from_sat(100_000));
    assert_eq!(
      tx.output[0].script_pubkey,
      external_address(0).assume_checked().script_pubkey()
    );
    assert_eq!(tx.output[1].value, Amount::from_sat(100_000));
    assert_eq!(proposal.change_index, Some(0));
    assert_eq!(proposal.change_vout, Some(2));
    assert_eq!(proposal.status, SpendStatus::Created);

    let fee = Amount::from_sat(1_000_000) - total(tx.output.iter().map(|output| output.value));
    let satisfaction_weight = context.wallet.descriptor.max_satisfaction_weight().unwrap();
    assert_eq!(
      fee,
      FeeRate::try_from(2.0)
        .unwrap()
        .fee(estimate_vsize(1, &tx.output, satisfaction_weight)),
    );

    assert!(proposal.psbt.inputs[0].witness_utxo.is_some());
    assert!(proposal.psbt.inputs[0].witness_script.is_some());
    assert!(!proposal.psbt.inputs[0].bip32_derivation.is_empty());
    assert!(!proposal.psbt.outputs[2].bip32_derivation.is_empty());
    assert!(proposal.psbt.outputs[0].bip32_derivation.is_empty());
  }

  #[test]
  fn dust_change_goes_to_fees() {
    let context = Context::new();
    let coin = context.fund(103_000, Some(1));

    let proposal = context
      .wallet
      .create_spend(
        &fee_rate(1.0),
        &[(external_address(0), Amount::from_sat(100_000))],
        Some(&[coin]),
        6,
      )
      .unwrap();

    assert_eq!(proposal.psbt.unsigned_tx.output.len(), 1);
    assert_eq!(proposal.change_index, None);
    assert_eq!(proposal.change_vout, None);
    assert_eq!(context.wallet.peek_index(Branch::Change).unwrap(), 0);
  }

  #[test]
  fn outputs_plus_fee_equal_inputs() {
    let context = Context::new();
    let a = context.fund(300_000, Some(1));
    let b = context.fund(200_000, Some(1));

    let proposal = context
      .wallet
      .create_spend(
        &fee_rate(3.0),
        &[(external_address(0), Amount::from_sat(450_000))],
        Some(&[a, b]),
        2,
      )
      .unwrap();

    let tx = &proposal.psbt.unsigned_tx;
    let fee =
      total_in(&context, &proposal.psbt) - total(tx.output.iter().map(|output| output.value));

    let satisfaction_weight = context.wallet.descriptor.max_satisfaction_weight().unwrap();
    let estimated = FeeRate::try_from(3.0)
      .unwrap()
      .fee(estimate_vsize(2, &tx.output, satisfaction_weight));

    assert!(fee >= estimated);
    assert!(fee < estimated + context.wallet.policy.dust_limit);
  }

  #[test]
  fn consecutive_change_indices_increase() {
    let context = Context::new();
    context.fund(1_000_000, Some(1));
    context.fund(1_000_000, Some(1));

    let destinations = [(external_address(0), Amount::from_sat(100_000))];

    let first = context
      .wallet
      .create_spend(&fee_rate(1.0), &destinations, None, 2)
      .unwrap();

    context.wallet.abandon(first.txid).unwrap();

    let second = context
      .wallet
      .create_spend(&fee_rate(1.0), &destinations, None, 2)
      .unwrap();

    assert_eq!(first.change_index, Some(0));
    assert_eq!(second.change_index, Some(1));
  }

  #[test]
  fn failed_build_mutates_nothing() {
    let context = Context::new();
    let coin = context.fund(50_000, Some(1));

    assert_matches!(
      context.wallet.create_spend(
        &fee_rate(1.0),
        &[(external_address(0), Amount::from_sat(100_000))],
        Some(&[coin]),
        2,
      ),
      Err(Error::InsufficientFunds { .. })
    );

    assert_eq!(context.wallet.peek_index(Branch::Change).unwrap(), 0);
    assert!(context.wallet.list_proposals().unwrap().is_empty());
  }

  #[test]
  fn destination_errors() {
    let context = Context::new();
    let coin = context.fund(1_000_000, Some(1));

    assert_matches!(
      context
        .wallet
        .create_spend(&fee_rate(1.0), &[], Some(&[coin]), 2),
      Err(Error::NoDestination)
    );

    assert_matches!(
      context.wallet.create_spend(
        &fee_rate(1.0),
        &[(external_address(0), Amount::from_sat(4_999))],
        Some(&[coin]),
        2,
      ),
      Err(Error::InvalidOutputValue { value, .. }) if value == Amount::from_sat(4_999)
    );

    let mainnet = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
      .parse::<Address<NetworkUnchecked>>()
      .unwrap();

    assert_matches!(
      context.wallet.create_spend(
        &fee_rate(1.0),
        &[(mainnet, Amount::from_sat(10_000))],
        Some(&[coin]),
        2,
      ),
      Err(Error::WrongNetwork { .. })
    );
  }

  #[test]
  fn unavailable_fee_estimate_is_reported() {
    let context = Context::new();
    context.fund(1_000_000, Some(1));

    assert_matches!(
      context.wallet.create_spend(
        &NoFeeEstimate,
        &[(external_address(0), Amount::from_sat(10_000))],
        None,
        18,
      ),
      Err(Error::FeeEstimationUnavailable { conf_target: 18, .. })
    );
  }

  #[test]
  fn fee_rate_is_raised_to_minimum() {
    let context = Context::new();
    let coin = context.fund(1_000_000, Some(1));

    let proposal = context
      .wallet
      .create_spend(
        &fee_rate(0.1),
        &[(external_address(0), Amount::from_sat(10_000))],
        Some(&[coin]),
        2,
      )
      .unwrap();

    let tx = &proposal.psbt.unsigned_tx;
    let fee = Amount::from_sat(1_000_000) - total(tx.output.iter().map(|output| output.value));
    let satisfaction_weight = context.wallet.descriptor.max_satisfaction_weight().unwrap();

    assert_eq!(
      fee.to_sat(),
      u64::try_from(estimate_vsize(1, &tx.output, satisfaction_weight)).unwrap()
    );
  }

  #[test]
  fn insane_fee_rate_is_refused() {
    let context = Context::new();
    let coin = context.fund(10_000_000, Some(1));

    assert_matches!(
      context.wallet.create_spend(
        &fee_rate(2_000.0),
        &[(external_address(0), Amount::from_sat(10_000))],
        Some(&[coin]),
        1,
      ),
      Err(Error::InsaneFees { .. })
    );
  }

  #[test]
  fn absurd_fee_rate_is_refused_before_selection() {
    let context = Context::new();
    let coin = context.fund(1_000_000, Some(1));

    for rate in [1_000.5, 1e17, 1e18] {
      assert_matches!(
        context.wallet.create_spend(
          &fee_rate(rate),
          &[(external_address(0), Amount::from_sat(100_000))],
          Some(&[coin]),
          2,
        ),
        Err(Error::InsaneFees { .. })
      );
    }

    assert!(context.wallet.list_proposals().unwrap().is_empty());
  }

  #[test]
  fn exhausted_change_branch_only_fails_spends_needing_change() {
    let context = Context::new();
    let small = context.fund(103_000, Some(1));
    let large = context.fund(1_000_000, Some(1));

    {
      let wtx = context.wallet.begin_write().unwrap();
      wtx
        .open_table(STATISTICS)
        .unwrap()
        .insert(&Statistic::ChangeIndex.key(), &(1u64 << 31))
        .unwrap();
      wtx.commit().unwrap();
    }

    let destinations = [(external_address(0), Amount::from_sat(100_000))];

    let proposal = context
      .wallet
      .create_spend(&fee_rate(1.0), &destinations, Some(&[small]), 2)
      .unwrap();

    assert_eq!(proposal.change_index, None);

    assert_matches!(
      context
        .wallet
        .create_spend(&fee_rate(1.0), &destinations, Some(&[large]), 2),
      Err(Error::IndexExhausted {
        branch: Branch::Change
      })
    );
  }

  #[test]
  fn rebuilding_identical_spend_does_not_duplicate_proposal() {
    let context = Context::new();
    let coin = context.fund(103_000, Some(1));

    let destinations = [(external_address(0), Amount::from_sat(100_000))];

    let first = context
      .wallet
      .create_spend(&fee_rate(1.0), &destinations, Some(&[coin]), 2)
      .unwrap();

    let second = context
      .wallet
      .create_spend(&fee_rate(1.0), &destinations, Some(&[coin]), 2)
      .unwrap();

    assert_eq!(first.txid, second.txid);
    assert_eq!(context.wallet.list_proposals().unwrap().len(), 1);
  }
}
