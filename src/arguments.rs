use super::*;

#[derive(Debug, Parser)]
#[command(version, about = "Descriptor wallet coin ledger and spend builder")]
pub(crate) struct Arguments {
  #[command(flatten)]
  pub(crate) options: Options,
  #[command(subcommand)]
  pub(crate) subcommand: Subcommand,
}

impl Arguments {
  pub(crate) fn run(self) -> SnafuResult<Option<Box<dyn subcommand::Output>>> {
    let settings = Settings::load(self.options)?;

    Ok(self.subcommand.run(settings)?)
  }
}
