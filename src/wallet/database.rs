use super::*;

macro_rules! define_table {
  ($name:ident, $key:ty, $value:ty) => {
    pub(super) const $name: TableDefinition<$key, $value> = TableDefinition::new(stringify!($name));
  };
}

macro_rules! define_multimap_table {
  ($name:ident, $key:ty, $value:ty) => {
    pub(super) const $name: MultimapTableDefinition<$key, $value> =
      MultimapTableDefinition::new(stringify!($name));
  };
}

define_table! { DESCRIPTOR, (), &str }
define_table! { OUTPOINT_TO_COIN, &OutPointValue, CoinEntryValue }
define_table! { SCRIPT_TO_DERIVATION, &[u8], (bool, u32) }
define_table! { STATISTICS, u64, u64 }
define_table! { TXID_TO_SPEND, &TxidValue, SpendEntryValue }
define_multimap_table! { OUTPOINT_TO_RESERVATION, &OutPointValue, &TxidValue }

const SCHEMA_VERSION: u64 = 2;

#[derive(Copy, Clone)]
pub(super) enum Statistic {
  Schema = 0,
  ReceiveIndex = 1,
  ChangeIndex = 2,
}

impl Statistic {
  pub(super) fn key(self) -> u64 {
    self.into()
  }
}

impl From<Statistic> for u64 {
  fn from(statistic: Statistic) -> Self {
    statistic as u64
  }
}

pub(super) fn create(path: &Path, descriptor: &WalletDescriptor) -> Result<Database> {
  let database = Database::builder().create(path)?;

  let mut wtx = database.begin_write()?;
  wtx.set_durability(Durability::Immediate);

  wtx
    .open_table(DESCRIPTOR)?
    .insert((), descriptor.to_string().as_str())?;

  wtx.open_table(OUTPOINT_TO_COIN)?;
  wtx.open_table(SCRIPT_TO_DERIVATION)?;
  wtx.open_table(TXID_TO_SPEND)?;
  wtx.open_multimap_table(OUTPOINT_TO_RESERVATION)?;

  {
    let mut statistics = wtx.open_table(STATISTICS)?;
    statistics.insert(&Statistic::Schema.key(), &SCHEMA_VERSION)?;
    statistics.insert(&Statistic::ReceiveIndex.key(), &0u64)?;
    statistics.insert(&Statistic::ChangeIndex.key(), &0u64)?;
  }

  wtx.commit()?;

  log::info!("Created wallet database at `{}`", path.display());

  Ok(database)
}

pub(super) fn open(path: &Path) -> Result<(Database, WalletDescriptor)> {
  let db_path = path.to_owned();
  let once = Once::new();

  let database = Database::builder()
    .set_repair_callback(move |session: &mut RepairSession| {
      once.call_once(|| {
        log::warn!(
          "Wallet database `{}` needs recovery. This can take some time.",
          db_path.display()
        )
      });
      log::info!("Repairing wallet database: {:.0}%", session.progress() * 100.0);
    })
    .open(path)?;

  let rtx = database.begin_read()?;

  let found = rtx
    .open_table(STATISTICS)?
    .get(&Statistic::Schema.key())?
    .map(|schema| schema.value())
    .unwrap_or_default();

  if found != SCHEMA_VERSION {
    return Err(Error::SchemaVersion {
      expected: SCHEMA_VERSION,
      found,
    });
  }

  let descriptor = rtx
    .open_table(DESCRIPTOR)?
    .get(())?
    .map(|descriptor| descriptor.value().to_string())
    .ok_or_else(|| Error::Descriptor {
      message: format!("wallet database `{}` has no descriptor", path.display()),
    })?
    .parse::<WalletDescriptor>()?;

  drop(rtx);

  Ok((database, descriptor))
}
