use {
  super::*,
  bitcoincore_rpc::{
    jsonrpc::{self, simple_http::SimpleHttpTransport},
    Auth,
  },
  wallet::Broadcaster,
};

/// Bitcoin Core, queried for fee estimates and used to relay spends.
pub(crate) struct Node {
  client: Client,
}

impl Node {
  pub(crate) fn connect(settings: &Settings) -> Result<Self> {
    let url = settings.bitcoin_rpc_url();

    let auth = settings.auth()?;

    log::info!("Connecting to Bitcoin Core at {url}");

    if let Auth::CookieFile(cookie_file) = &auth {
      log::info!(
        "Using credentials from cookie file at `{}`",
        cookie_file.display()
      );

      ensure!(
        cookie_file.is_file(),
        "cookie file `{}` does not exist",
        cookie_file.display()
      );
    }

    let (username, password) = auth
      .get_user_pass()
      .with_context(|| format!("failed to read Bitcoin Core RPC credentials for `{url}`"))?;

    let mut builder = SimpleHttpTransport::builder()
      .url(&url)
      .with_context(|| format!("invalid Bitcoin Core RPC url `{url}`"))?
      .timeout(settings.bitcoin_rpc_timeout());

    if let Some(username) = username {
      builder = builder.auth(username, password);
    }

    Ok(Self {
      client: Client::from_jsonrpc(jsonrpc::Client::with_transport(builder.build())),
    })
  }
}

impl FeeEstimator for Node {
  fn estimate(&self, conf_target: u32) -> Result<FeeRate> {
    let target = u16::try_from(conf_target)
      .with_context(|| format!("confirmation target {conf_target} out of range"))?;

    let estimate = self
      .client
      .estimate_smart_fee(target, None)
      .context("failed to estimate fee")?;

    let Some(fee_rate) = estimate.fee_rate else {
      bail!(
        "no fee estimate for confirmation target {conf_target}: {}",
        estimate
          .errors
          .unwrap_or_default()
          .join(", ")
      );
    };

    let fee_rate = FeeRate::from_btc_per_kvb(fee_rate);

    log::debug!("Bitcoin Core estimates {fee_rate} for {conf_target} blocks");

    Ok(fee_rate)
  }
}

impl Broadcaster for Node {
  fn broadcast(&self, transaction: &Transaction) -> Result<Txid> {
    Ok(self.client.send_raw_transaction(transaction)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_cookie_file_is_an_error() {
    let tempdir = TempDir::new().unwrap();

    let cookie_file = tempdir.path().join(".cookie");

    let settings = Settings::merge(
      Options::try_parse_from([
        "coinkeep",
        "--regtest",
        "--cookie-file",
        cookie_file.to_str().unwrap(),
      ])
      .unwrap(),
      Config::default(),
    )
    .unwrap();

    assert_eq!(
      Node::connect(&settings).err().unwrap().to_string(),
      format!("cookie file `{}` does not exist", cookie_file.display())
    );
  }

  #[test]
  fn connect_with_cookie_file_does_not_contact_node() {
    let tempdir = TempDir::new().unwrap();

    let cookie_file = tempdir.path().join(".cookie");

    fs::write(&cookie_file, "__cookie__:secret").unwrap();

    let settings = Settings::merge(
      Options::try_parse_from([
        "coinkeep",
        "--regtest",
        "--cookie-file",
        cookie_file.to_str().unwrap(),
      ])
      .unwrap(),
      Config::default(),
    )
    .unwrap();

    assert!(Node::connect(&settings).is_ok());
  }
}
