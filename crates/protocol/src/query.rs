//! Query conditions
//!
//! The filter predicate attached to every long-lived reader. A condition
//! combines type/level bitmasks with optional pid, domain and tag lists,
//! each with an exclusion counterpart.
//!
//! Domains match in one of two modes:
//!
//! - strict (`>= 0x0d000000`): compared against the record's domain exactly
//! - fuzzy (`<= 0x000dffff`): compared against `record.domain >> 8`

use crate::record::LogRecord;
use crate::{
    ErrorCode, DOMAIN_FUZZY_MASK, DOMAIN_MODULE_BITS, DOMAIN_STRICT_MASK, MAX_DOMAINS, MAX_PIDS,
    MAX_TAGS,
};

/// Filter predicate for buffer queries.
///
/// Empty inclusion lists match everything; exclusion lists always apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryCondition {
    /// Bitmask of accepted log types.
    pub types: u16,
    /// Bitmask of accepted log levels.
    pub levels: u16,
    /// Accepted pids (at most [`MAX_PIDS`]).
    pub pids: Vec<u32>,
    /// Accepted domains, strict or fuzzy (at most [`MAX_DOMAINS`]).
    pub domains: Vec<u32>,
    /// Accepted tags (at most [`MAX_TAGS`]).
    pub tags: Vec<String>,
    /// Bitmask of rejected log types.
    pub no_types: u16,
    /// Bitmask of rejected log levels.
    pub no_levels: u16,
    /// Rejected pids.
    pub no_pids: Vec<u32>,
    /// Rejected domains, strict or fuzzy.
    pub no_domains: Vec<u32>,
    /// Rejected tags.
    pub no_tags: Vec<String>,
}

impl QueryCondition {
    /// A condition that matches every record.
    pub fn match_all() -> Self {
        Self {
            types: u16::MAX,
            levels: u16::MAX,
            ..Default::default()
        }
    }

    /// Validate the list limits.
    pub fn validate(&self) -> Result<(), ErrorCode> {
        if self.pids.len() > MAX_PIDS || self.no_pids.len() > MAX_PIDS {
            return Err(ErrorCode::QueryPidInvalid);
        }
        if self.domains.len() > MAX_DOMAINS || self.no_domains.len() > MAX_DOMAINS {
            return Err(ErrorCode::DomainInvalid);
        }
        if self.tags.len() > MAX_TAGS || self.no_tags.len() > MAX_TAGS {
            return Err(ErrorCode::QueryTagInvalid);
        }
        Ok(())
    }

    /// Whether a record passes this condition.
    pub fn matches(&self, record: &LogRecord) -> bool {
        if record.ty.bit() & self.types == 0 || (1u16 << record.level) & self.levels == 0 {
            return false;
        }

        if !self.pids.is_empty() && !self.pids.contains(&record.pid) {
            return false;
        }
        if !self.domains.is_empty()
            && !self
                .domains
                .iter()
                .any(|&d| domain_matches(d, record.domain))
        {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| t == &record.tag) {
            return false;
        }

        if self.no_pids.contains(&record.pid) {
            return false;
        }
        if self
            .no_domains
            .iter()
            .any(|&d| domain_matches(d, record.domain))
        {
            return false;
        }
        if self.no_tags.iter().any(|t| t == &record.tag) {
            return false;
        }

        record.ty.bit() & self.no_types == 0 && (1u16 << record.level) & self.no_levels == 0
    }
}

/// Strict or fuzzy comparison of a condition domain against a record domain.
fn domain_matches(pattern: u32, domain: u32) -> bool {
    (pattern >= DOMAIN_STRICT_MASK && pattern == domain)
        || (pattern <= DOMAIN_FUZZY_MASK && pattern == domain >> DOMAIN_MODULE_BITS)
}

#[cfg(test)]
#[path = "query_test.rs"]
mod query_test;
