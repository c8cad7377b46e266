use {super::*, bitcoincore_rpc::Auth};

#[derive(Default, Debug, Clone)]
pub struct Settings {
  bitcoin_data_dir: Option<PathBuf>,
  bitcoin_rpc_password: Option<String>,
  bitcoin_rpc_timeout: Duration,
  bitcoin_rpc_url: Option<String>,
  bitcoin_rpc_username: Option<String>,
  chain: Chain,
  cookie_file: Option<PathBuf>,
  data_dir: PathBuf,
  descriptor: Option<String>,
  dust_limit: Amount,
  fee_rate: Option<FeeRate>,
  reservation_timeout: Duration,
  wallet: String,
}

impl Settings {
  pub const DEFAULT_BITCOIN_RPC_TIMEOUT: Duration = Duration::from_secs(15);
  pub const DEFAULT_WALLET: &'static str = "coinkeep";

  pub fn load(options: Options) -> Result<Self> {
    let config = match &options.config {
      Some(path) => Config::load(path)?,
      None => match &options.config_dir {
        Some(dir) if dir.join("coinkeep.yaml").exists() => {
          Config::load(&dir.join("coinkeep.yaml"))?
        }
        Some(_) | None => Config::default(),
      },
    };

    Self::merge(options, config)
  }

  pub(crate) fn merge(options: Options, config: Config) -> Result<Self> {
    let chain = Self::setting_typed(
      options
        .signet
        .then_some(Chain::Signet)
        .or(options.regtest.then_some(Chain::Regtest))
        .or(options.testnet.then_some(Chain::Testnet))
        .or(options.chain_argument),
      Some("CHAIN"),
      config.chain,
      Chain::Mainnet,
    )?;

    let data_dir = match Self::setting(
      options.data_dir.as_deref().and_then(Path::to_str),
      Some("DATA_DIR"),
      config.data_dir.as_deref().and_then(Path::to_str),
      None,
    )? {
      Some(data_dir) => PathBuf::from(data_dir),
      None => dirs::data_dir()
        .context("could not get data dir")?
        .join("coinkeep"),
    };

    let dust_limit = Amount::from_sat(Self::setting_typed(
      options.dust_limit,
      Some("DUST_LIMIT"),
      config.dust_limit,
      Policy::DEFAULT_DUST_LIMIT.to_sat(),
    )?);

    let fee_rate = match options.fee_rate {
      Some(fee_rate) => Some(fee_rate),
      None => match Self::env(Some("FEE_RATE"))? {
        Some(fee_rate) => Some(
          fee_rate
            .parse()
            .with_context(|| anyhow!("failed to parse FEE_RATE"))?,
        ),
        None => config.fee_rate,
      },
    };

    let bitcoin_rpc_timeout = Self::setting_typed(
      options.bitcoin_rpc_timeout,
      Some("BITCOIN_RPC_TIMEOUT"),
      config
        .bitcoin_rpc_timeout
        .as_deref()
        .map(str::parse)
        .transpose()
        .context("failed to parse bitcoin_rpc_timeout")?,
      Self::DEFAULT_BITCOIN_RPC_TIMEOUT.into(),
    )?;

    let reservation_timeout = Self::setting_typed(
      options.reservation_timeout,
      Some("RESERVATION_TIMEOUT"),
      config
        .reservation_timeout
        .as_deref()
        .map(str::parse)
        .transpose()
        .context("failed to parse reservation_timeout")?,
      Policy::DEFAULT_RESERVATION_TIMEOUT.into(),
    )?;

    Ok(Self {
      bitcoin_data_dir: Self::setting(
        options.bitcoin_data_dir.as_deref().and_then(Path::to_str),
        Some("BITCOIN_DATA_DIR"),
        config.bitcoin_data_dir.as_deref().and_then(Path::to_str),
        None,
      )?
      .map(PathBuf::from),
      bitcoin_rpc_password: Self::setting(
        options.bitcoin_rpc_password.as_deref(),
        Some("BITCOIN_RPC_PASSWORD"),
        config.bitcoin_rpc_password.as_deref(),
        None,
      )?,
      bitcoin_rpc_timeout: bitcoin_rpc_timeout.into(),
      bitcoin_rpc_url: Self::setting(
        options.bitcoin_rpc_url.as_deref(),
        Some("BITCOIN_RPC_URL"),
        config.bitcoin_rpc_url.as_deref(),
        None,
      )?,
      bitcoin_rpc_username: Self::setting(
        options.bitcoin_rpc_username.as_deref(),
        Some("BITCOIN_RPC_USERNAME"),
        config.bitcoin_rpc_username.as_deref(),
        None,
      )?,
      chain,
      cookie_file: Self::setting(
        options.cookie_file.as_deref().and_then(Path::to_str),
        Some("COOKIE_FILE"),
        config.cookie_file.as_deref().and_then(Path::to_str),
        None,
      )?
      .map(PathBuf::from),
      data_dir,
      descriptor: Self::setting(
        None,
        Some("DESCRIPTOR"),
        config.descriptor.as_deref(),
        None,
      )?,
      dust_limit,
      fee_rate,
      reservation_timeout: reservation_timeout.into(),
      wallet: Self::setting(
        options.wallet.as_deref(),
        Some("WALLET"),
        config.wallet.as_deref(),
        Some(Self::DEFAULT_WALLET),
      )?
      .unwrap_or_else(|| Self::DEFAULT_WALLET.into()),
    })
  }

  pub(crate) fn auth(&self) -> Result<Auth> {
    match (&self.bitcoin_rpc_username, &self.bitcoin_rpc_password) {
      (Some(username), Some(password)) => Ok(Auth::UserPass(username.clone(), password.clone())),
      (None, Some(_)) => Err(anyhow!("no bitcoind rpc user specified")),
      (Some(_), None) => Err(anyhow!("no bitcoind rpc password specified")),
      (None, None) => Ok(Auth::CookieFile(self.cookie_file()?)),
    }
  }

  pub(crate) fn bitcoin_rpc_timeout(&self) -> Duration {
    self.bitcoin_rpc_timeout
  }

  pub(crate) fn bitcoin_rpc_url(&self) -> String {
    self
      .bitcoin_rpc_url
      .clone()
      .unwrap_or_else(|| format!("127.0.0.1:{}", self.chain.default_rpc_port()))
  }

  pub(crate) fn chain(&self) -> Chain {
    self.chain
  }

  pub(crate) fn cookie_file(&self) -> Result<PathBuf> {
    if let Some(cookie_file) = &self.cookie_file {
      return Ok(cookie_file.clone());
    }

    let path = if let Some(bitcoin_data_dir) = &self.bitcoin_data_dir {
      bitcoin_data_dir.clone()
    } else if cfg!(target_os = "linux") {
      dirs::home_dir()
        .ok_or_else(|| anyhow!("failed to get cookie file path: could not get home dir"))?
        .join(".bitcoin")
    } else {
      dirs::data_dir()
        .ok_or_else(|| anyhow!("failed to get cookie file path: could not get data dir"))?
        .join("Bitcoin")
    };

    Ok(self.chain.join_with_data_dir(path).join(".cookie"))
  }

  /// Per-chain directory holding wallet databases.
  pub(crate) fn data_dir(&self) -> PathBuf {
    self.chain.join_with_data_dir(&self.data_dir)
  }

  /// Descriptor for `create` when none is given on the command line.
  pub(crate) fn descriptor(&self) -> Option<&str> {
    self.descriptor.as_deref()
  }

  pub(crate) fn fee_rate(&self) -> Option<FeeRate> {
    self.fee_rate
  }

  pub(crate) fn policy(&self) -> Policy {
    Policy {
      dust_limit: self.dust_limit,
      reservation_timeout: self.reservation_timeout,
    }
  }

  pub(crate) fn wallet(&self) -> &str {
    &self.wallet
  }

  fn setting_typed<T: FromStr>(
    arg_value: Option<T>,
    env_key: Option<&str>,
    config_value: Option<T>,
    default_value: T,
  ) -> Result<T>
  where
    T::Err: Into<Error>,
  {
    if let Some(arg_value) = arg_value {
      return Ok(arg_value);
    }

    if let Some(env_value) = Self::env(env_key)? {
      return env_value
        .parse()
        .map_err(Into::into)
        .with_context(|| anyhow!("failed to parse {}", env_key.unwrap_or_default()));
    }

    Ok(config_value.unwrap_or(default_value))
  }

  fn setting(
    arg_value: Option<&str>,
    env_key: Option<&str>,
    config_value: Option<&str>,
    default_value: Option<&str>,
  ) -> Result<Option<String>> {
    if let Some(arg_value) = arg_value {
      return Ok(Some(arg_value.into()));
    }

    if let Some(env_value) = Self::env(env_key)? {
      return Ok(Some(env_value));
    }

    Ok(config_value.or(default_value).map(str::to_string))
  }

  fn env(key: Option<&str>) -> Result<Option<String>> {
    let Some(key) = key else {
      return Ok(None);
    };

    let variable = format!("COINKEEP_{key}");

    match env::var(&variable) {
      Ok(value) => Ok(Some(value)),
      Err(env::VarError::NotUnicode(value)) => {
        Err(error::EnvVarUnicode { value, variable }.build().into())
      }
      Err(env::VarError::NotPresent) => Ok(None),
    }
  }
}
