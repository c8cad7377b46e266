use {super::*, wallet::HistoryEvent};

#[derive(Debug, Parser)]
pub(crate) struct GetHistory {
  #[arg(long, default_value_t = 0, help = "List events from block <START>.")]
  start: u32,
  #[arg(long, help = "List events up to block <END>. [default: chain tip]")]
  end: Option<u32>,
  #[arg(
    long,
    default_value_t = 10,
    help = "List at most <LIMIT> events, most recent first."
  )]
  limit: usize,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Output {
  pub events: Vec<HistoryEvent>,
}

impl GetHistory {
  pub(crate) fn run(self, settings: Settings) -> SubcommandResult {
    let events = open_wallet(settings)?.history(
      self.start..=self.end.unwrap_or(u32::MAX),
      self.limit,
    )?;

    Ok(Some(Box::new(Output { events })))
  }
}
