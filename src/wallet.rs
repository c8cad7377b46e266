use {
  self::{
    allocator::Allocator,
    database::{
      Statistic, OUTPOINT_TO_COIN, OUTPOINT_TO_RESERVATION, SCRIPT_TO_DERIVATION, STATISTICS,
      TXID_TO_SPEND,
    },
    entry::{
      CoinEntry, CoinEntryValue, Entry, OutPointValue, SpendEntry, SpendEntryValue, TxidValue,
    },
    ledger::{load_coins, Ledger},
    selector::{CoinSelector, Hold},
    spend_builder::{estimate_vsize, total},
    tracker::Tracker,
  },
  super::*,
  miniscript::{
    descriptor::{DefiniteDescriptorKey, DescriptorPublicKey},
    psbt::{PsbtExt, PsbtInputSatisfier},
    Descriptor,
  },
  redb::{
    Database, Durability, MultimapTableDefinition, ReadOnlyTable, ReadableMultimapTable,
    ReadableTable, RepairSession, TableDefinition, WriteTransaction,
  },
  std::sync::Once,
};

pub use self::{
  allocator::Branch,
  backend::{Broadcaster, FeeEstimator, FixedFeeRate},
  descriptor::WalletDescriptor,
  error::Error,
  event::ChainEvent,
  history::{HistoryEvent, HistoryKind},
  ledger::{Coin, CoinSnapshot, Deposit, SpendInfo},
  tracker::{SpendProposal, SpendStatus},
};

pub(crate) use wallet_constructor::WalletConstructor;

mod allocator;
mod backend;
mod database;
mod descriptor;
mod entry;
mod error;
mod event;
mod history;
mod ledger;
mod selector;
mod spend_builder;
mod tracker;
mod wallet_constructor;

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Spend construction limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
  /// Smallest destination or change output value the wallet creates.
  pub dust_limit: Amount,
  /// How long a `Created` proposal keeps automatic selection away from its
  /// inputs.
  pub reservation_timeout: Duration,
}

impl Policy {
  pub const DEFAULT_DUST_LIMIT: Amount = Amount::from_sat(5_000);
  pub const DEFAULT_RESERVATION_TIMEOUT: Duration = Duration::from_secs(60 * 60);
}

impl Default for Policy {
  fn default() -> Self {
    Self {
      dust_limit: Self::DEFAULT_DUST_LIMIT,
      reservation_timeout: Self::DEFAULT_RESERVATION_TIMEOUT,
    }
  }
}

pub struct Wallet {
  database: Database,
  descriptor: WalletDescriptor,
  network: Network,
  policy: Policy,
  secp: Secp256k1<secp256k1::VerifyOnly>,
}

impl Wallet {
  /// Creates a wallet database at `path` for `descriptor`. An existing
  /// database is reopened if it was created for the same descriptor.
  pub fn create(
    path: &Path,
    descriptor: WalletDescriptor,
    network: Network,
    policy: Policy,
  ) -> Result<Self> {
    if path.exists() {
      let wallet = Self::open(path, network, policy)?;

      if wallet.descriptor != descriptor {
        return Err(Error::DescriptorMismatch {
          given: descriptor.to_string(),
          stored: wallet.descriptor.to_string(),
        });
      }

      return Ok(wallet);
    }

    Ok(Self {
      database: database::create(path, &descriptor)?,
      descriptor,
      network,
      policy,
      secp: Secp256k1::verification_only(),
    })
  }

  pub fn open(path: &Path, network: Network, policy: Policy) -> Result<Self> {
    let (database, descriptor) = database::open(path)?;

    log::info!("Opened wallet `{}` for {descriptor}", path.display());

    Ok(Self {
      database,
      descriptor,
      network,
      policy,
      secp: Secp256k1::verification_only(),
    })
  }

  pub fn descriptor(&self) -> &WalletDescriptor {
    &self.descriptor
  }

  pub fn network(&self) -> Network {
    self.network
  }

  pub fn policy(&self) -> Policy {
    self.policy
  }

  fn begin_write(&self) -> Result<WriteTransaction> {
    let mut wtx = self.database.begin_write()?;
    wtx.set_durability(Durability::Immediate);
    Ok(wtx)
  }

  /// Runs `f` in a write transaction, committing only if it succeeds.
  fn write<T>(&self, f: impl FnOnce(&WriteTransaction) -> Result<T>) -> Result<T> {
    let wtx = self.begin_write()?;
    let value = f(&wtx)?;
    wtx.commit()?;
    Ok(value)
  }
}

fn unix_time() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|duration| duration.as_secs())
    .unwrap_or_default()
}
