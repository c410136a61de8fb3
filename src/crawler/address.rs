//! Page address generation
//!
//! Enumerates the page URLs of a paginated listing. Pagination is expressed
//! as an offset query parameter stepping by the page size.

use crate::config::{category_for, SourceConfig};
use crate::ConfigError;
use url::Url;

/// One fetchable page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageAddress {
    /// Category the page's records are stored under
    pub category: String,
    /// Item offset of the first record on the page
    pub offset: u64,
    /// Full URL including pagination parameters
    pub url: String,
}

/// Template for the pages of one listing
#[derive(Debug, Clone)]
pub struct PageTemplate {
    base: Url,
    category: String,
    offset_param: String,
    limit_param: Option<String>,
}

impl PageTemplate {
    pub fn new(base: Url, category: impl Into<String>, offset_param: impl Into<String>) -> Self {
        Self {
            base,
            category: category.into(),
            offset_param: offset_param.into(),
            limit_param: None,
        }
    }

    /// Also sends the page size under `param` on every page
    pub fn with_limit_param(mut self, param: impl Into<String>) -> Self {
        self.limit_param = Some(param.into());
        self
    }

    /// Builds the template for a configured source
    pub fn from_source(source: &SourceConfig) -> Result<Self, ConfigError> {
        let base = Url::parse(&source.base).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid base URL '{}': {}", source.base, e))
        })?;
        let template = Self::new(base, category_for(source)?, source.offset_param());

        Ok(match source.limit_param() {
            Some(param) => template.with_limit_param(param),
            None => template,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Produces `page_count` addresses with offsets `0, page_size, 2*page_size, ...`
    ///
    /// Query parameters already present on the base URL are kept. Counts are
    /// validated by the configuration layer; a zero `page_count` simply yields
    /// no addresses.
    pub fn build(&self, page_count: u32, page_size: u32) -> Vec<PageAddress> {
        (0..u64::from(page_count))
            .map(|page| {
                let offset = page * u64::from(page_size);
                let mut url = self.base.clone();
                {
                    let mut query = url.query_pairs_mut();
                    if let Some(limit) = &self.limit_param {
                        query.append_pair(limit, &page_size.to_string());
                    }
                    query.append_pair(&self.offset_param, &offset.to_string());
                }

                PageAddress {
                    category: self.category.clone(),
                    offset,
                    url: url.to_string(),
                }
            })
            .collect()
    }
}
