use super::*;

pub(crate) trait Entry: Sized {
  type Value;

  fn load(value: Self::Value) -> Self;

  fn store(self) -> Self::Value;
}

pub(super) type OutPointValue = [u8; 36];

impl Entry for OutPoint {
  type Value = OutPointValue;

  fn load(value: Self::Value) -> Self {
    let mut txid = [0; 32];
    txid.copy_from_slice(&value[..32]);

    let mut vout = [0; 4];
    vout.copy_from_slice(&value[32..]);

    Self {
      txid: Txid::load(txid),
      vout: u32::from_le_bytes(vout),
    }
  }

  fn store(self) -> Self::Value {
    let mut value = [0; 36];
    value[..32].copy_from_slice(&self.txid.store());
    value[32..].copy_from_slice(&self.vout.to_le_bytes());
    value
  }
}

pub(super) type TxidValue = [u8; 32];

impl Entry for Txid {
  type Value = TxidValue;

  fn load(value: Self::Value) -> Self {
    Txid::from_byte_array(value)
  }

  fn store(self) -> Self::Value {
    self.to_byte_array()
  }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub(crate) struct CoinEntry {
  pub(crate) amount: Amount,
  pub(crate) block_height: Option<u32>,
  pub(crate) derivation_index: u32,
  /// Output of a transaction that is no longer observable.
  pub(crate) dropped: bool,
  pub(crate) is_change: bool,
  pub(crate) spend_info: Option<SpendInfo>,
}

pub(super) type CoinEntryValue = (
  u64,              // amount
  Option<u32>,      // block height
  u32,              // derivation index
  bool,             // is change
  Option<[u8; 32]>, // spend txid
  Option<u32>,      // spend height
  bool,             // dropped
);

impl CoinEntry {
  pub(crate) fn coin(self, outpoint: OutPoint) -> Coin {
    Coin {
      outpoint,
      amount: self.amount,
      block_height: self.block_height,
      derivation_index: self.derivation_index,
      is_change: self.is_change,
      spend_info: self.spend_info,
    }
  }
}

impl Entry for CoinEntry {
  type Value = CoinEntryValue;

  fn load(value: Self::Value) -> Self {
    let (amount, block_height, derivation_index, is_change, spend_txid, spend_height, dropped) =
      value;

    Self {
      amount: Amount::from_sat(amount),
      block_height,
      derivation_index,
      dropped,
      is_change,
      spend_info: spend_txid.map(|txid| SpendInfo {
        txid: Txid::load(txid),
        height: spend_height,
      }),
    }
  }

  fn store(self) -> Self::Value {
    (
      self.amount.to_sat(),
      self.block_height,
      self.derivation_index,
      self.is_change,
      self.spend_info.map(|info| info.txid.store()),
      self.spend_info.and_then(|info| info.height),
      self.dropped,
    )
  }
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) struct SpendEntry {
  pub(crate) change_index: Option<u32>,
  pub(crate) change_vout: Option<u32>,
  pub(crate) created_at: u64,
  pub(crate) psbt: Vec<u8>,
  pub(crate) status: SpendStatus,
}

pub(super) type SpendEntryValue = (
  Option<u32>, // change index
  Option<u32>, // change vout
  u64,         // created at
  Vec<u8>,     // psbt
  u8,          // status
);

impl SpendEntry {
  pub(crate) fn proposal(self, txid: Txid) -> Result<SpendProposal> {
    Ok(SpendProposal {
      txid,
      psbt: Psbt::deserialize(&self.psbt).map_err(|err| Error::Psbt {
        message: err.to_string(),
      })?,
      change_index: self.change_index,
      change_vout: self.change_vout,
      created_at: self.created_at,
      status: self.status,
    })
  }
}

impl Entry for SpendEntry {
  type Value = SpendEntryValue;

  fn load((change_index, change_vout, created_at, psbt, status): SpendEntryValue) -> Self {
    Self {
      change_index,
      change_vout,
      created_at,
      psbt,
      status: SpendStatus::load(status),
    }
  }

  fn store(self) -> Self::Value {
    (
      self.change_index,
      self.change_vout,
      self.created_at,
      self.psbt,
      self.status.store(),
    )
  }
}

impl Entry for SpendStatus {
  type Value = u8;

  fn load(value: Self::Value) -> Self {
    match value {
      0 => Self::Created,
      1 => Self::Signed,
      _ => Self::Broadcast,
    }
  }

  fn store(self) -> Self::Value {
    match self {
      Self::Created => 0,
      Self::Signed => 1,
      Self::Broadcast => 2,
    }
  }
}
