use super::*;

#[derive(Default)]
struct Mempool(Mutex<Vec<Transaction>>);

impl Broadcaster for Mempool {
  fn broadcast(&self, transaction: &Transaction) -> anyhow::Result<Txid> {
    self.0.lock().unwrap().push(transaction.clone());
    Ok(transaction.compute_txid())
  }
}

fn fee_rate(rate: f64) -> FixedFeeRate {
  FixedFeeRate(FeeRate::try_from(rate).unwrap())
}

fn wallet(tempdir: &TempDir) -> Wallet {
  Wallet::create(
    &tempdir.path().join("wallet.redb"),
    descriptor(1).parse::<WalletDescriptor>().unwrap(),
    Network::Regtest,
    Policy::default(),
  )
  .unwrap()
}

fn fund(wallet: &Wallet, n: u8, sats: u64) -> OutPoint {
  let transaction = deposit_transaction(n, &wallet.get_new_address().unwrap(), sats);

  assert!(wallet
    .apply(ChainEvent::Transaction {
      transaction: transaction.clone(),
      height: Some(100),
    })
    .unwrap());

  OutPoint {
    txid: transaction.compute_txid(),
    vout: 0,
  }
}

fn unchecked(address: Address) -> Address<NetworkUnchecked> {
  address.as_unchecked().clone()
}

#[test]
fn self_payment_end_to_end() {
  let tempdir = TempDir::new().unwrap();
  let wallet = wallet(&tempdir);

  let funding = fund(&wallet, 1, 1_000_000);

  let destinations = [
    (
      unchecked(wallet.get_new_address().unwrap()),
      Amount::from_sat(100_000),
    ),
    (
      unchecked(wallet.get_new_address().unwrap()),
      Amount::from_sat(100_000),
    ),
  ];

  let proposal = wallet
    .create_spend(&fee_rate(2.0), &destinations, None, 2)
    .unwrap();

  assert_eq!(proposal.status, SpendStatus::Created);
  assert_eq!(proposal.selected_outpoints(), vec![funding]);
  assert_eq!(proposal.psbt.unsigned_tx.output.len(), 3);
  assert_eq!(proposal.destinations().len(), 2);

  let fee = proposal.psbt.fee().unwrap();

  assert_eq!(
    proposal
      .psbt
      .unsigned_tx
      .output
      .iter()
      .map(|output| output.value)
      .sum::<Amount>()
      + fee,
    Amount::from_sat(1_000_000)
  );

  let mut psbt = proposal.psbt.clone();
  psbt.sign(&xpriv(1), &Secp256k1::new()).unwrap();

  assert_eq!(wallet.submit_signed(psbt).unwrap(), SpendStatus::Signed);

  let mempool = Mempool::default();

  assert_eq!(
    wallet.broadcast(&mempool, proposal.txid).unwrap(),
    proposal.txid
  );

  let transaction = mempool.0.lock().unwrap()[0].clone();

  let vsize = u64::try_from(transaction.vsize()).unwrap();
  assert!(fee.to_sat() >= 2 * vsize);
  assert!(fee.to_sat() < 2 * vsize + Policy::default().dust_limit.to_sat());

  assert_eq!(
    wallet.proposal(proposal.txid).unwrap().unwrap().status,
    SpendStatus::Broadcast
  );

  assert!(wallet
    .apply(ChainEvent::Transaction {
      transaction,
      height: Some(101),
    })
    .unwrap());

  assert_eq!(wallet.unspent_coins().unwrap().len(), 3);

  assert_eq!(
    wallet.coins_by_outpoints(&[funding]).unwrap()[0].spend_info,
    Some(SpendInfo {
      txid: proposal.txid,
      height: Some(101),
    })
  );
}

#[test]
fn batch_spend_marks_every_input() {
  let tempdir = TempDir::new().unwrap();
  let wallet = wallet(&tempdir);

  let a = fund(&wallet, 1, 300_000);
  let b = fund(&wallet, 2, 300_000);

  let proposal = wallet
    .create_spend(
      &fee_rate(1.0),
      &[
        (unchecked(external_address(1)), Amount::from_sat(250_000)),
        (unchecked(external_address(2)), Amount::from_sat(250_000)),
      ],
      Some(&[a, b][..]),
      6,
    )
    .unwrap();

  assert_eq!(proposal.psbt.unsigned_tx.output.len(), 3);

  let transaction = sign_and_finalize(proposal.psbt, 1);

  assert!(wallet
    .apply(ChainEvent::Transaction {
      transaction,
      height: None,
    })
    .unwrap());

  for coin in wallet.coins_by_outpoints(&[a, b]).unwrap() {
    assert_eq!(coin.spend_info.unwrap().txid, proposal.txid);
  }
}

#[test]
fn concurrent_builds_never_share_coins() {
  let tempdir = TempDir::new().unwrap();
  let wallet = wallet(&tempdir);

  fund(&wallet, 1, 200_000);
  fund(&wallet, 2, 200_000);

  let proposals = std::thread::scope(|scope| {
    let handles = (1..=2)
      .map(|n| {
        let wallet = &wallet;
        scope.spawn(move || {
          wallet
            .create_spend(
              &fee_rate(1.0),
              &[(unchecked(external_address(n)), Amount::from_sat(100_000))],
              None,
              6,
            )
            .unwrap()
        })
      })
      .collect::<Vec<_>>();

    handles
      .into_iter()
      .map(|handle| handle.join().unwrap())
      .collect::<Vec<_>>()
  });

  let first = proposals[0].selected_outpoints();
  let second = proposals[1].selected_outpoints();

  assert_eq!(first.len(), 1);
  assert_eq!(second.len(), 1);
  assert_ne!(first, second);
}

#[test]
fn wallet_survives_reopen() {
  let tempdir = TempDir::new().unwrap();

  let (outpoint, address) = {
    let wallet = wallet(&tempdir);
    (fund(&wallet, 1, 50_000), wallet.get_new_address().unwrap())
  };

  let wallet = Wallet::open(
    &tempdir.path().join("wallet.redb"),
    Network::Regtest,
    Policy::default(),
  )
  .unwrap();

  assert_eq!(wallet.unspent_coins().unwrap()[0].outpoint, outpoint);
  assert_ne!(wallet.get_new_address().unwrap(), address);
}
