//! Canned-record adapter for tests.

use crate::traits::{Source, SourceError};
use async_trait::async_trait;
use iw_core::{Record, SourceContext};

/// Source that hands out a fixed record list.
pub struct MockSource {
    context: SourceContext,
    records: Vec<Record>,
    fail_validation: Option<String>,
}

impl MockSource {
    /// Creates a mock source returning the given records.
    pub fn new(name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            context: SourceContext::new(name),
            records,
            fail_validation: None,
        }
    }

    /// Enables PTR lookups for this source's addresses.
    pub fn with_hostname_resolution(mut self, dns_servers: Option<Vec<String>>) -> Self {
        self.context.resolve_hostnames = true;
        self.context.dns_servers = dns_servers;
        self
    }

    /// Makes validation fail with the given message.
    pub fn failing_validation(mut self, message: impl Into<String>) -> Self {
        self.fail_validation = Some(message.into());
        self
    }
}

#[async_trait]
impl Source for MockSource {
    fn context(&self) -> SourceContext {
        self.context.clone()
    }

    async fn validate(&self) -> Result<(), SourceError> {
        match &self.fail_validation {
            Some(message) => Err(SourceError::Configuration(message.clone())),
            None => Ok(()),
        }
    }

    async fn collect(&self) -> Result<Vec<Record>, SourceError> {
        Ok(self.records.clone())
    }
}
