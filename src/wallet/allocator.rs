use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Branch {
  Receive,
  Change,
}

impl Branch {
  pub fn is_change(self) -> bool {
    self == Self::Change
  }

  fn statistic(self) -> Statistic {
    match self {
      Self::Receive => Statistic::ReceiveIndex,
      Self::Change => Statistic::ChangeIndex,
    }
  }
}

impl From<bool> for Branch {
  fn from(is_change: bool) -> Self {
    if is_change {
      Self::Change
    } else {
      Self::Receive
    }
  }
}

impl Display for Branch {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    match self {
      Self::Receive => write!(f, "receive"),
      Self::Change => write!(f, "change"),
    }
  }
}

pub(super) fn next_unused(
  statistics: &impl ReadableTable<u64, u64>,
  branch: Branch,
) -> Result<u32> {
  let next = statistics
    .get(&branch.statistic().key())?
    .map(|next| next.value())
    .unwrap_or_default();

  u32::try_from(next).map_err(|_| Error::IndexExhausted { branch })
}

pub(super) fn derivation_of(
  addresses: &impl ReadableTable<&'static [u8], (bool, u32)>,
  script_pubkey: &Script,
) -> Result<Option<(Branch, u32)>> {
  Ok(
    addresses
      .get(script_pubkey.as_bytes())?
      .map(|derivation| {
        let (is_change, index) = derivation.value();
        (Branch::from(is_change), index)
      }),
  )
}

/// Issues derivation indices inside a caller-owned write transaction, so
/// allocation commits or aborts together with whatever else the caller
/// writes.
pub(super) struct Allocator<'a> {
  descriptor: &'a WalletDescriptor,
  wtx: &'a WriteTransaction,
}

impl<'a> Allocator<'a> {
  pub(super) fn new(wtx: &'a WriteTransaction, descriptor: &'a WalletDescriptor) -> Self {
    Self { descriptor, wtx }
  }

  pub(super) fn peek(&self, branch: Branch) -> Result<u32> {
    next_unused(&self.wtx.open_table(STATISTICS)?, branch)
  }

  pub(super) fn allocate(&self, branch: Branch) -> Result<u32> {
    let index = self.peek(branch)?;
    self.claim(branch, index)?;
    Ok(index)
  }

  /// Marks `index` as issued, advancing the counter past it if it was not
  /// already. Used when an output to a derived script shows up for an index
  /// this wallet has not issued yet.
  pub(super) fn observe(&self, branch: Branch, index: u32) -> Result {
    if index >= self.peek(branch)? {
      log::info!("Advancing {branch} index past externally used index {index}");
      self.claim(branch, index)?;
    }

    Ok(())
  }

  pub(super) fn derivation(&self, script_pubkey: &Script) -> Result<Option<(Branch, u32)>> {
    derivation_of(&self.wtx.open_table(SCRIPT_TO_DERIVATION)?, script_pubkey)
  }

  fn claim(&self, branch: Branch, index: u32) -> Result {
    let script_pubkey = self.descriptor.script_pubkey(branch, index)?;

    self
      .wtx
      .open_table(SCRIPT_TO_DERIVATION)?
      .insert(script_pubkey.as_bytes(), (branch.is_change(), index))?;

    self
      .wtx
      .open_table(STATISTICS)?
      .insert(&branch.statistic().key(), &(u64::from(index) + 1))?;

    Ok(())
  }
}

impl Wallet {
  /// Allocates the next unused index on `branch`. The counter is durably
  /// advanced before the index is returned and is never rolled back.
  pub fn next_index(&self, branch: Branch) -> Result<u32> {
    let wtx = self.begin_write()?;
    let index = Allocator::new(&wtx, &self.descriptor).allocate(branch)?;
    wtx.commit()?;

    log::info!("Allocated {branch} index {index}");

    Ok(index)
  }

  /// The index `next_index` would return, without allocating it.
  pub fn peek_index(&self, branch: Branch) -> Result<u32> {
    next_unused(
      &self.database.begin_read()?.open_table(STATISTICS)?,
      branch,
    )
  }

  pub fn get_new_address(&self) -> Result<Address> {
    let index = self.next_index(Branch::Receive)?;
    self
      .descriptor
      .address(Branch::Receive, index, self.network)
  }

  /// The branch and index `script_pubkey` was derived at, if this wallet
  /// has issued it.
  pub fn derivation(&self, script_pubkey: &Script) -> Result<Option<(Branch, u32)>> {
    derivation_of(
      &self.database.begin_read()?.open_table(SCRIPT_TO_DERIVATION)?,
      script_pubkey,
    )
  }
}
