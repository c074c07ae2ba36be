use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, TransportError};

const SEPARATOR: char = '+';

/// Addressing information a peer needs to connect to a bridge server.
///
/// Paths are named from the server's point of view: the server reads from
/// `inbound` and writes to `outbound`, so a client connects its outbound half
/// to `inbound` and its inbound half to `outbound`.
///
/// The textual form is `"<inbound>+<outbound>"`. It is the only artifact
/// handed across the process boundary and is good for a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    inbound: PathBuf,
    outbound: PathBuf,
}

impl ConnectionDescriptor {
    /// Create a descriptor from the server's inbound and outbound socket paths.
    pub fn new(inbound: impl Into<PathBuf>, outbound: impl Into<PathBuf>) -> Result<Self> {
        let inbound = inbound.into();
        let outbound = outbound.into();
        validate_path(&inbound)?;
        validate_path(&outbound)?;
        Ok(Self { inbound, outbound })
    }

    /// Path the server reads from (the client writes here).
    pub fn inbound(&self) -> &Path {
        &self.inbound
    }

    /// Path the server writes to (the client reads from here).
    pub fn outbound(&self) -> &Path {
        &self.outbound
    }
}

fn validate_path(path: &Path) -> Result<()> {
    let text = path.to_str().ok_or_else(|| {
        TransportError::InvalidDescriptor(format!("path is not valid UTF-8: {}", path.display()))
    })?;
    if text.is_empty() {
        return Err(TransportError::InvalidDescriptor(
            "path must not be empty".to_string(),
        ));
    }
    if text.contains(SEPARATOR) {
        return Err(TransportError::InvalidDescriptor(format!(
            "path must not contain '{SEPARATOR}': {text}"
        )));
    }
    Ok(())
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}",
            self.inbound.display(),
            self.outbound.display()
        )
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let (inbound, outbound) = s.trim().split_once(SEPARATOR).ok_or_else(|| {
            TransportError::InvalidDescriptor(format!("expected '<inbound>{SEPARATOR}<outbound>'"))
        })?;
        Self::new(inbound, outbound)
    }
}
