//! Default value sources resolved at mount

use super::value::FormValue;
use anyhow::Result;
use async_trait::async_trait;

/// Supplies a form's default values, possibly over the network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DefaultValuesSource: Send + Sync {
    async fn load(&self) -> Result<FormValue>;
}

/// Defaults known up front
#[derive(Debug, Clone)]
pub struct StaticDefaults {
    values: FormValue,
}

impl StaticDefaults {
    pub fn new(values: FormValue) -> Self {
        Self { values }
    }
}

#[async_trait]
impl DefaultValuesSource for StaticDefaults {
    async fn load(&self) -> Result<FormValue> {
        Ok(self.values.clone())
    }
}

/// Identifies one default-value load; stale tickets are ignored on completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    pub(crate) generation: u64,
}
