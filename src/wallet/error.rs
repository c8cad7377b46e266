use super::*;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum Error {
  #[snafu(display("output `{outpoint}` already spent by `{txid}`"))]
  AlreadySpent { outpoint: OutPoint, txid: Txid },
  #[snafu(display("failed to broadcast `{txid}`: {message}"))]
  Broadcast { txid: Txid, message: String },
  #[snafu(display("output `{outpoint}` is reserved by spend `{txid}`"))]
  CoinReserved { outpoint: OutPoint, txid: Txid },
  #[snafu(display("wallet database error"))]
  Database { source: redb::Error },
  #[snafu(display("invalid descriptor: {message}"))]
  Descriptor { message: String },
  #[snafu(display("wallet descriptor `{stored}` does not match `{given}`"))]
  DescriptorMismatch { given: String, stored: String },
  #[snafu(display("outpoint `{outpoint}` selected more than once"))]
  DuplicateOutpoint { outpoint: OutPoint },
  #[snafu(display(
    "fee estimate for a {conf_target} block confirmation target unavailable: {message}"
  ))]
  FeeEstimationUnavailable { conf_target: u32, message: String },
  #[snafu(display("spend `{txid}` is missing signatures for inputs {inputs:?}"))]
  IncompleteSignature { txid: Txid, inputs: Vec<usize> },
  #[snafu(display("{branch} derivation index space exhausted"))]
  IndexExhausted { branch: Branch },
  #[snafu(display("refusing to create spend with insane fees: {message}"))]
  InsaneFees { message: String },
  #[snafu(display(
    "insufficient funds: {} sat available, {} sat needed",
    available.to_sat(),
    needed.to_sat()
  ))]
  InsufficientFunds { available: Amount, needed: Amount },
  #[snafu(display(
    "output value of {} sat must be at least {} sat and at most {} sat",
    value.to_sat(),
    dust_limit.to_sat(),
    Amount::MAX_MONEY.to_sat()
  ))]
  InvalidOutputValue { value: Amount, dust_limit: Amount },
  #[snafu(display("spend has no destination"))]
  NoDestination,
  #[snafu(display("spend has no input"))]
  NoOutpoint,
  #[snafu(display("spend `{txid}` has already been broadcast"))]
  ProposalBroadcast { txid: Txid },
  #[snafu(display("invalid PSBT: {message}"))]
  Psbt { message: String },
  #[snafu(display(
    "wallet database schema {found} is incompatible with this version's schema {expected}"
  ))]
  SchemaVersion { expected: u64, found: u64 },
  #[snafu(display("failed to finalize spend `{txid}`: {message}"))]
  SpendFinalization { txid: Txid, message: String },
  #[snafu(display("unknown outpoint `{outpoint}`"))]
  UnknownOutpoint { outpoint: OutPoint },
  #[snafu(display("unknown spend `{txid}`"))]
  UnknownProposal { txid: Txid },
  #[snafu(display("address `{address}` is not valid on {network}"))]
  WrongNetwork { address: String, network: Network },
}

impl Error {
  /// Whether retrying the same call later may succeed without any change on
  /// the caller's side.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::FeeEstimationUnavailable { .. } | Self::Broadcast { .. })
  }
}

macro_rules! from_redb {
  ($($error:ty),* $(,)?) => {
    $(
      impl From<$error> for Error {
        fn from(err: $error) -> Self {
          Self::Database { source: err.into() }
        }
      }
    )*
  };
}

from_redb!(
  redb::CommitError,
  redb::DatabaseError,
  redb::Error,
  redb::StorageError,
  redb::TableError,
  redb::TransactionError,
);
