use {super::*, wallet::WalletDescriptor};

#[derive(Debug, Parser)]
pub(crate) struct Create {
  #[arg(
    long,
    help = "Derive addresses from <DESCRIPTOR>, a ranged segwit descriptor with a `<0;1>` step."
  )]
  descriptor: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Output {
  pub name: String,
  pub descriptor: String,
}

impl Create {
  pub(crate) fn run(self, settings: Settings) -> SubcommandResult {
    let Some(descriptor) = self
      .descriptor
      .as_deref()
      .or(settings.descriptor())
      .map(str::to_string)
    else {
      bail!("no descriptor given, pass `--descriptor` or set `COINKEEP_DESCRIPTOR`");
    };

    let descriptor = descriptor.parse::<WalletDescriptor>()?;

    let name = settings.wallet().to_string();

    let wallet = WalletConstructor::new(settings).create(descriptor)?;

    Ok(Some(Box::new(Output {
      name,
      descriptor: wallet.descriptor().to_string(),
    })))
  }
}
