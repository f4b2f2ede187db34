//! Compiles the optional match/replace settings into traffic callbacks.
//!
//! Both compilers degrade to `None` instead of failing: a bad pattern costs
//! one warning and that one feature, never startup.

use regex::bytes::Regex;
use std::{borrow::Cow, sync::Arc};

use crate::counters::Counters;
use crate::logger::Logger;

/// Separates the pattern from the replacement in `replace_regex`. Cannot be escaped.
pub const REPLACE_DELIMITER: char = '~';

/// Logs every match found in a chunk under a process-wide match id.
#[derive(Debug)]
pub struct Matcher {
    regex: Regex,
    counters: Arc<Counters>,
    log: Logger,
}

impl Matcher {
    pub fn inspect(&self, chunk: &[u8]) {
        for found in self.regex.find_iter(chunk) {
            let id = self.counters.next_match_id();
            self.log.info(format_args!(
                "Match #{id}: {}",
                String::from_utf8_lossy(found.as_bytes())
            ));
        }
    }
}

/// Rewrites every match in a chunk with a fixed replacement.
#[derive(Debug)]
pub struct Replacer {
    regex: Regex,
    replacement: Vec<u8>,
}

impl Replacer {
    /// Returns the rewritten chunk, or the input borrowed as-is when nothing matched.
    #[must_use]
    pub fn apply<'a>(&self, chunk: &'a [u8]) -> Cow<'a, [u8]> {
        self.regex.replace_all(chunk, self.replacement.as_slice())
    }
}

#[must_use]
pub fn compile_matcher(pattern: &str, log: &Logger, counters: Arc<Counters>) -> Option<Matcher> {
    if pattern.is_empty() {
        return None;
    }

    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => {
            log.warn(format_args!("Invalid match regex: {e}"));
            return None;
        }
    };

    log.info(format_args!("Matching {}", regex.as_str()));
    Some(Matcher {
        regex,
        counters,
        log: log.clone(),
    })
}

#[must_use]
pub fn compile_replacer(spec: &str, log: &Logger) -> Option<Replacer> {
    if spec.is_empty() {
        return None;
    }

    let parts: Vec<&str> = spec.split(REPLACE_DELIMITER).collect();
    let [pattern, replacement] = parts.as_slice() else {
        log.warn("Invalid replace option");
        return None;
    };

    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => {
            log.warn(format_args!("Invalid replace regex: {e}"));
            return None;
        }
    };

    log.info(format_args!(
        "Replacing {} with {replacement}",
        regex.as_str()
    ));
    Some(Replacer {
        regex,
        replacement: replacement.as_bytes().to_vec(),
    })
}
