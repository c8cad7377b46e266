use super::*;

#[derive(Debug, Parser)]
pub(crate) enum Notify {
  #[command(about = "Report an output paying a wallet address")]
  Deposit {
    #[arg(long, help = "Deposit at <OUTPOINT>.")]
    outpoint: OutPoint,
    #[arg(long, help = "Deposit of <AMOUNT> sats.")]
    amount: u64,
    #[arg(long, help = "Paid to derivation index <INDEX>.")]
    index: u32,
    #[arg(long, help = "Paid to the change branch.")]
    change: bool,
    #[arg(long, help = "Confirmed at <HEIGHT>.")]
    height: Option<u32>,
  },
  #[command(about = "Report a mempool or block transaction")]
  Transaction {
    #[arg(help = "Hex encoded <TRANSACTION>.")]
    transaction: String,
    #[arg(long, help = "Confirmed at <HEIGHT>.")]
    height: Option<u32>,
  },
  #[command(about = "Report a spend of a wallet coin")]
  Spend {
    #[arg(long, help = "Spent coin <OUTPOINT>.")]
    outpoint: OutPoint,
    #[arg(long, help = "Spent by <TXID>.")]
    txid: Txid,
    #[arg(long, help = "Confirmed at <HEIGHT>.")]
    height: Option<u32>,
  },
  #[command(about = "Report a transaction that is no longer observable")]
  Dropped {
    #[arg(help = "Dropped <TXID>.")]
    txid: Txid,
  },
  #[command(about = "Report a reorganization of blocks above a height")]
  Rollback {
    #[arg(help = "Keep confirmations up to <HEIGHT>.")]
    height: u32,
  },
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Output {
  pub changed: bool,
}

impl Notify {
  fn event(self) -> Result<ChainEvent> {
    Ok(match self {
      Self::Deposit {
        outpoint,
        amount,
        index,
        change,
        height,
      } => ChainEvent::Deposit(Deposit {
        outpoint,
        amount: Amount::from_sat(amount),
        derivation_index: index,
        is_change: change,
        height,
      }),
      Self::Transaction {
        transaction,
        height,
      } => ChainEvent::Transaction {
        transaction: consensus::deserialize(
          &hex::decode(transaction.trim()).context("transaction is not valid hex")?,
        )
        .context("invalid transaction")?,
        height,
      },
      Self::Spend {
        outpoint,
        txid,
        height,
      } => ChainEvent::Spend {
        outpoint,
        txid,
        height,
      },
      Self::Dropped { txid } => ChainEvent::Dropped { txid },
      Self::Rollback { height } => ChainEvent::Rollback { height },
    })
  }

  pub(crate) fn run(self, settings: Settings) -> SubcommandResult {
    let event = self.event()?;

    let changed = open_wallet(settings)?.apply(event)?;

    Ok(Some(Box::new(Output { changed })))
  }
}
