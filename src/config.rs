use super::*;

#[derive(Deserialize, Default, PartialEq, Debug)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
  pub(crate) bitcoin_data_dir: Option<PathBuf>,
  pub(crate) bitcoin_rpc_password: Option<String>,
  pub(crate) bitcoin_rpc_timeout: Option<String>,
  pub(crate) bitcoin_rpc_url: Option<String>,
  pub(crate) bitcoin_rpc_username: Option<String>,
  pub(crate) chain: Option<Chain>,
  pub(crate) cookie_file: Option<PathBuf>,
  pub(crate) data_dir: Option<PathBuf>,
  pub(crate) descriptor: Option<String>,
  pub(crate) dust_limit: Option<u64>,
  pub(crate) fee_rate: Option<FeeRate>,
  pub(crate) reservation_timeout: Option<String>,
  pub(crate) wallet: Option<String>,
}

impl Config {
  pub(crate) fn load(path: &Path) -> Result<Self> {
    serde_yaml::from_reader(
      File::open(path).with_context(|| format!("failed to open config `{}`", path.display()))?,
    )
    .with_context(|| format!("failed to parse config `{}`", path.display()))
  }
}
