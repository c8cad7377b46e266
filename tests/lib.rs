#![allow(clippy::type_complexity)]

use {
  self::{command_builder::CommandBuilder, expected::Expected},
  bitcoin::{
    absolute::LockTime,
    address::{Address, NetworkUnchecked},
    bip32::{Xpriv, Xpub},
    consensus,
    psbt::Psbt,
    secp256k1::Secp256k1,
    transaction::Version,
    Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
  },
  coinkeep::{
    base64_decode, base64_encode,
    subcommand::{
      create, create_spend, get_history, get_new_address, list_coins, list_spend_txs, notify,
      update_spend,
    },
    wallet::{
      Broadcaster, ChainEvent, Coin, FixedFeeRate, HistoryKind, Policy, SpendInfo, SpendStatus,
      Wallet, WalletDescriptor,
    },
    FeeRate,
  },
  executable_path::executable_path,
  miniscript::psbt::PsbtExt,
  pretty_assertions::assert_eq as pretty_assert_eq,
  regex::Regex,
  serde::de::DeserializeOwned,
  std::{
    collections::BTreeMap,
    ffi::{OsStr, OsString},
    fs,
    path::Path,
    process::{Command, Stdio},
    str,
    sync::{Arc, Mutex},
  },
  tempfile::TempDir,
};


mod library;

fn xpriv(n: u8) -> Xpriv {
  Xpriv::new_master(Network::Regtest, &[n; 32]).unwrap()
}

fn xpub(n: u8) -> Xpub {
  Xpub::from_priv(&Secp256k1::new(), &xpriv(n))
}

/// A 1-of-1 P2WSH multisig descriptor over test key `n`.
fn descriptor(n: u8) -> String {
  format!("wsh(multi(1,{}/<0;1>/*))", xpub(n))
}

fn external_address(n: u8) -> Address {
  Address::p2wpkh(&xpub(100 + n).to_pub(), Network::Regtest)
}

/// A transaction spending a foreign output `n` and paying `sats` to
/// `address`.
fn deposit_transaction(n: u8, address: &Address, sats: u64) -> Transaction {
  Transaction {
    version: Version::TWO,
    lock_time: LockTime::ZERO,
    input: vec![TxIn {
      previous_output: OutPoint {
        txid: format!("{n:02x}").repeat(32).parse().unwrap(),
        vout: 0,
      },
      script_sig: ScriptBuf::new(),
      sequence: Sequence::MAX,
      witness: Witness::new(),
    }],
    output: vec![TxOut {
      value: Amount::from_sat(sats),
      script_pubkey: address.script_pubkey(),
    }],
  }
}

/// Signs `psbt` with test key `n` and extracts the finalized transaction.
fn sign_and_finalize(mut psbt: Psbt, n: u8) -> Transaction {
  let secp = Secp256k1::new();
  psbt.sign(&xpriv(n), &secp).unwrap();
  psbt.finalize_mut(&secp).unwrap();
  psbt.extract_tx_unchecked_fee_rate()
}
