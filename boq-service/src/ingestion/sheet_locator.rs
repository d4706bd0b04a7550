//! Resolves logical sheet names against the sheets actually present.

use crate::error::BoqError;
use std::collections::HashMap;

/// Logical name -> actual sheet name as it appears in the workbook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSheets {
    names: HashMap<String, String>,
}

impl ResolvedSheets {
    pub fn actual(&self, logical: &str) -> Option<&str> {
        self.names.get(logical).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Match every required name against the trimmed workbook sheet names.
///
/// Comparison is exact after trimming, so `" BOQ "` satisfies `"BOQ"` but
/// `"boq"` does not. Fails with every missing name at once.
pub fn locate_sheets<S: AsRef<str>>(
    available: &[S],
    required: &[&str],
) -> Result<ResolvedSheets, BoqError> {
    let mut names = HashMap::with_capacity(required.len());
    let mut missing = Vec::new();

    for &logical in required {
        match available.iter().find(|name| name.as_ref().trim() == logical) {
            Some(actual) => {
                names.insert(logical.to_string(), actual.as_ref().to_string());
            }
            None => missing.push(logical.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(BoqError::MissingSheets {
            missing,
            available: available.iter().map(|s| s.as_ref().to_string()).collect(),
        });
    }

    Ok(ResolvedSheets { names })
}
