use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MissingCreditPolicy {
    #[default]
    Exclude,
    Fallback(f64),
}

impl std::str::FromStr for MissingCreditPolicy {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("exclude") {
            return Ok(MissingCreditPolicy::Exclude);
        }
        match value.parse::<f64>() {
            Ok(hours) if valid_hours(hours) => Ok(MissingCreditPolicy::Fallback(hours)),
            _ => Err(ValidationError::MalformedFilter {
                field: "missing-credit".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

fn valid_hours(hours: f64) -> bool {
    hours.is_finite() && hours >= 0.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Found(f64),
    Fallback(f64),
    Excluded,
}

impl Resolution {
    pub fn weight(self) -> Option<f64> {
        match self {
            Resolution::Found(hours) | Resolution::Fallback(hours) => Some(hours),
            Resolution::Excluded => None,
        }
    }

    pub fn is_gap(self) -> bool {
        !matches!(self, Resolution::Found(_))
    }
}

const FALLBACK_SUBJECT: &str = "<missing-credit fallback>";

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreditMap {
    hours: BTreeMap<String, f64>,
    #[serde(skip)]
    missing: MissingCreditPolicy,
}

impl CreditMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, S>(entries: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut map = CreditMap::new();
        for (subject, hours) in entries {
            map.insert(subject, hours)?;
        }
        Ok(map)
    }

    pub fn with_policy(mut self, policy: MissingCreditPolicy) -> Result<Self, ValidationError> {
        if let MissingCreditPolicy::Fallback(hours) = policy {
            if !valid_hours(hours) {
                return Err(ValidationError::InvalidCredit {
                    subject: FALLBACK_SUBJECT.to_string(),
                    value: hours,
                });
            }
        }
        self.missing = policy;
        Ok(self)
    }

    pub fn insert(
        &mut self,
        subject: impl Into<String>,
        hours: f64,
    ) -> Result<(), ValidationError> {
        let subject = subject.into();
        if !valid_hours(hours) {
            return Err(ValidationError::InvalidCredit { subject, value: hours });
        }
        self.hours.insert(subject, hours);
        Ok(())
    }

    pub fn resolve(&self, subject: &str) -> Resolution {
        match (self.hours.get(subject), self.missing) {
            (Some(hours), _) => Resolution::Found(*hours),
            (None, MissingCreditPolicy::Fallback(hours)) => Resolution::Fallback(hours),
            (None, MissingCreditPolicy::Exclude) => Resolution::Excluded,
        }
    }

    pub fn len(&self) -> usize {
        self.hours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hours.is_empty()
    }
}
