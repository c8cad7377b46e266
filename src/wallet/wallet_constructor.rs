use super::*;

/// Locates and opens the wallet database named by the settings.
#[derive(Clone)]
pub(crate) struct WalletConstructor {
  name: String,
  settings: Settings,
}

impl WalletConstructor {
  pub(crate) fn new(settings: Settings) -> Self {
    Self {
      name: settings.wallet().into(),
      settings,
    }
  }

  pub(crate) fn path(&self) -> SnafuResult<PathBuf> {
    let dir = self.settings.data_dir().join("wallets");

    fs::create_dir_all(&dir).snafu_context(crate::error::Io { path: &dir })?;

    Ok(dir.join(format!("{}.redb", self.name)))
  }

  pub(crate) fn create(self, descriptor: WalletDescriptor) -> crate::Result<Wallet> {
    let path = self.path()?;

    log::info!("Creating wallet `{}` at `{}`", self.name, path.display());

    Ok(Wallet::create(
      &path,
      descriptor,
      self.settings.chain().network(),
      self.settings.policy(),
    )?)
  }

  pub(crate) fn open(self) -> crate::Result<Wallet> {
    let path = self.path()?;

    ensure!(
      path.exists(),
      "wallet `{}` does not exist, create it first",
      self.name
    );

    Ok(Wallet::open(
      &path,
      self.settings.chain().network(),
      self.settings.policy(),
    )?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn constructor(data_dir: &Path) -> WalletConstructor {
    WalletConstructor::new(
      Settings::merge(
        Options::try_parse_from([
          "coinkeep",
          "--regtest",
          "--datadir",
          data_dir.to_str().unwrap(),
          "--wallet",
          "savings",
        ])
        .unwrap(),
        Config::default(),
      )
      .unwrap(),
    )
  }

  #[test]
  fn path_is_per_chain_and_name() {
    let tempdir = TempDir::new().unwrap();

    assert_eq!(
      constructor(tempdir.path()).path().unwrap(),
      tempdir.path().join("regtest/wallets/savings.redb")
    );
  }

  #[test]
  fn open_missing_wallet_is_an_error() {
    let tempdir = TempDir::new().unwrap();

    assert_eq!(
      constructor(tempdir.path())
        .open()
        .map(|_| ())
        .unwrap_err()
        .to_string(),
      "wallet `savings` does not exist, create it first"
    );
  }

  #[test]
  fn create_then_open() {
    let tempdir = TempDir::new().unwrap();

    let address = constructor(tempdir.path())
      .create(descriptor(1, &[1]))
      .unwrap()
      .get_new_address()
      .unwrap();

    let wallet = constructor(tempdir.path()).open().unwrap();

    assert_eq!(wallet.network(), Network::Regtest);
    assert_eq!(wallet.descriptor(), &descriptor(1, &[1]));
    assert_ne!(wallet.get_new_address().unwrap(), address);
  }
}
