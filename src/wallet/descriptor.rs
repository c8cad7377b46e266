use super::*;

/// A ranged segwit output descriptor with a `<0;1>` multipath step, split
/// into its receive and change branches.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletDescriptor {
  change: Descriptor<DescriptorPublicKey>,
  multipath: Descriptor<DescriptorPublicKey>,
  receive: Descriptor<DescriptorPublicKey>,
}

impl WalletDescriptor {
  pub fn new(descriptor: Descriptor<DescriptorPublicKey>) -> Result<Self> {
    if !matches!(
      descriptor,
      Descriptor::Wpkh(_) | Descriptor::Wsh(_) | Descriptor::Tr(_)
    ) {
      return Err(Error::Descriptor {
        message: "only native segwit descriptors are supported".into(),
      });
    }

    if !descriptor.has_wildcard() {
      return Err(Error::Descriptor {
        message: "descriptor is not ranged".into(),
      });
    }

    let [receive, change] = <[Descriptor<DescriptorPublicKey>; 2]>::try_from(
      descriptor
        .clone()
        .into_single_descriptors()
        .map_err(|err| Error::Descriptor {
          message: err.to_string(),
        })?,
    )
    .map_err(|_| Error::Descriptor {
      message: "descriptor must have exactly two derivation paths, `<0;1>`".into(),
    })?;

    Ok(Self {
      change,
      multipath: descriptor,
      receive,
    })
  }

  fn branch(&self, branch: Branch) -> &Descriptor<DescriptorPublicKey> {
    match branch {
      Branch::Receive => &self.receive,
      Branch::Change => &self.change,
    }
  }

  pub(crate) fn derive(
    &self,
    branch: Branch,
    index: u32,
  ) -> Result<Descriptor<DefiniteDescriptorKey>> {
    self
      .branch(branch)
      .at_derivation_index(index)
      .map_err(|_| Error::IndexExhausted { branch })
  }

  pub(crate) fn script_pubkey(&self, branch: Branch, index: u32) -> Result<ScriptBuf> {
    Ok(self.derive(branch, index)?.script_pubkey())
  }

  pub(crate) fn address(&self, branch: Branch, index: u32, network: Network) -> Result<Address> {
    self
      .derive(branch, index)?
      .address(network)
      .map_err(|err| Error::Descriptor {
        message: err.to_string(),
      })
  }

  /// Upper bound on the weight a satisfaction adds to an input spending any
  /// output of this descriptor.
  pub(crate) fn max_satisfaction_weight(&self) -> Result<Weight> {
    self
      .receive
      .max_weight_to_satisfy()
      .map_err(|err| Error::Descriptor {
        message: err.to_string(),
      })
  }
}

impl FromStr for WalletDescriptor {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::new(
      Descriptor::from_str(s).map_err(|err| Error::Descriptor {
        message: err.to_string(),
      })?,
    )
  }
}

impl Display for WalletDescriptor {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    write!(f, "{}", self.multipath)
  }
}

impl Serialize for WalletDescriptor {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}
