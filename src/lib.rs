#![allow(clippy::result_large_err, clippy::too_many_arguments)]
#![deny(
  clippy::cast_lossless,
  clippy::cast_possible_truncation,
  clippy::cast_possible_wrap,
  clippy::cast_sign_loss
)]

use {
  self::{
    arguments::Arguments,
    config::Config,
    error::{ResultExt, SnafuError},
    node::Node,
    settings::Settings,
    subcommand::{OutputFormat, Subcommand},
    wallet::{
      ChainEvent, Coin, Deposit, FeeEstimator, FixedFeeRate, Policy, SpendStatus, Wallet,
      WalletConstructor,
    },
  },
  anyhow::{anyhow, bail, ensure, Context as _, Error},
  bitcoin::{
    absolute::LockTime,
    address::{Address, NetworkUnchecked},
    consensus,
    hashes::Hash,
    psbt::Psbt,
    secp256k1::{self, Secp256k1},
    transaction::Version,
    Amount, Network, OutPoint, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Weight, Witness,
  },
  bitcoincore_rpc::{Client, RpcApi},
  clap::{ArgGroup, Parser},
  serde::{Deserialize, Serialize},
  snafu::{Backtrace, ErrorCompat, Snafu},
  std::{
    backtrace::BacktraceStatus,
    collections::{HashMap, HashSet},
    env,
    ffi::OsString,
    fmt::{self, Display, Formatter},
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    process,
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
  },
};

pub use self::{chain::Chain, fee_rate::FeeRate, options::Options};


#[cfg(test)]
use self::test::*;

pub mod arguments;
pub mod chain;
mod config;
mod error;
mod fee_rate;
mod macros;
mod node;
pub mod options;
pub mod settings;
pub mod subcommand;
pub mod wallet;

type Result<T = (), E = Error> = std::result::Result<T, E>;
type SnafuResult<T = (), E = SnafuError> = std::result::Result<T, E>;

pub fn base64_encode(data: &[u8]) -> String {
  use base64::Engine;
  base64::engine::general_purpose::STANDARD.encode(data)
}

pub fn base64_decode(s: &str) -> Result<Vec<u8>> {
  use base64::Engine;
  Ok(base64::engine::general_purpose::STANDARD.decode(s)?)
}

pub fn main() {
  env_logger::init();

  let args = Arguments::parse();

  let format = args.options.format;

  match args.run() {
    Err(err) => {
      eprintln!("error: {err}");

      if let SnafuError::Anyhow { err } = err {
        for (i, err) in err.chain().skip(1).enumerate() {
          if i == 0 {
            eprintln!();
            eprintln!("because:");
          }

          eprintln!("- {err}");
        }

        if env::var_os("RUST_BACKTRACE")
          .map(|val| val == "1")
          .unwrap_or_default()
        {
          eprintln!("{}", err.backtrace());
        }
      } else {
        for (i, err) in err.iter_chain().skip(1).enumerate() {
          if i == 0 {
            eprintln!();
            eprintln!("because:");
          }

          eprintln!("- {err}");
        }

        if let Some(backtrace) = err.backtrace() {
          if backtrace.status() == BacktraceStatus::Captured {
            eprintln!("backtrace:");
            eprintln!("{backtrace}");
          }
        }
      }

      process::exit(1);
    }
    Ok(output) => {
      if let Some(output) = output {
        output.print(format.unwrap_or_default());
      }
    }
  }
}
