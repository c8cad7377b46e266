use super::*;

#[derive(Deserialize, Serialize)]
pub struct Output {
  pub address: Address<NetworkUnchecked>,
}

pub(crate) fn run(settings: Settings) -> SubcommandResult {
  let address = open_wallet(settings)?.get_new_address()?;

  Ok(Some(Box::new(Output {
    address: address.as_unchecked().clone(),
  })))
}
