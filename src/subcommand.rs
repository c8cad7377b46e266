use {super::*, clap::ValueEnum};

pub mod broadcast_spend;
pub mod create;
pub mod create_spend;
pub mod del_spend_tx;
pub mod get_history;
pub mod get_new_address;
pub mod list_coins;
pub mod list_spend_txs;
pub mod notify;
pub mod update_spend;

#[derive(Debug, Parser)]
pub(crate) enum Subcommand {
  #[command(about = "Broadcast a signed spend")]
  #[command(name = "broadcastspend")]
  BroadcastSpend(broadcast_spend::BroadcastSpend),
  #[command(about = "Create a wallet for a descriptor")]
  Create(create::Create),
  #[command(about = "Build an unsigned spend")]
  #[command(name = "createspend")]
  CreateSpend(create_spend::CreateSpend),
  #[command(about = "Abandon an unbroadcast spend")]
  #[command(name = "delspendtx")]
  DelSpendTx(del_spend_tx::DelSpendTx),
  #[command(about = "List confirmed receives and spends")]
  #[command(name = "gethistory")]
  GetHistory(get_history::GetHistory),
  #[command(about = "Issue a fresh receive address")]
  #[command(name = "getnewaddress")]
  GetNewAddress,
  #[command(about = "List wallet coins")]
  #[command(name = "listcoins")]
  ListCoins(list_coins::ListCoins),
  #[command(about = "List spends")]
  #[command(name = "listspendtxs")]
  ListSpendTxs,
  #[command(about = "Report chain activity", subcommand)]
  Notify(notify::Notify),
  #[command(about = "Submit signatures for a spend")]
  #[command(name = "updatespend")]
  UpdateSpend(update_spend::UpdateSpend),
}

impl Subcommand {
  pub(crate) fn run(self, settings: Settings) -> SubcommandResult {
    match self {
      Self::BroadcastSpend(broadcast_spend) => broadcast_spend.run(settings),
      Self::Create(create) => create.run(settings),
      Self::CreateSpend(create_spend) => create_spend.run(settings),
      Self::DelSpendTx(del_spend_tx) => del_spend_tx.run(settings),
      Self::GetHistory(get_history) => get_history.run(settings),
      Self::GetNewAddress => get_new_address::run(settings),
      Self::ListCoins(list_coins) => list_coins.run(settings),
      Self::ListSpendTxs => list_spend_txs::run(settings),
      Self::Notify(notify) => notify.run(settings),
      Self::UpdateSpend(update_spend) => update_spend.run(settings),
    }
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Json,
  Yaml,
  Minify,
}

pub trait Output: Send {
  fn print(&self, format: OutputFormat);
}

impl<T> Output for T
where
  T: Serialize + Send,
{
  fn print(&self, format: OutputFormat) {
    match format {
      OutputFormat::Json => serde_json::to_writer_pretty(io::stdout(), self).ok(),
      OutputFormat::Yaml => serde_yaml::to_writer(io::stdout(), self).ok(),
      OutputFormat::Minify => serde_json::to_writer(io::stdout(), self).ok(),
    };
    println!();
  }
}

pub(crate) type SubcommandResult = Result<Option<Box<dyn Output>>>;

fn open_wallet(settings: Settings) -> Result<Wallet> {
  WalletConstructor::new(settings).open()
}
