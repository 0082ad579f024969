use crate::cohort::SubjectUniverse;
use crate::credits::{CreditMap, MissingCreditPolicy};
use crate::error::ValidationError;
use crate::grades::GradeTable;

#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    pub grade_table: GradeTable,
    pub missing_credit: MissingCreditPolicy,
    pub universe: SubjectUniverse,
}

impl AnalysisOptions {
    pub fn credits(&self, map: CreditMap) -> Result<CreditMap, ValidationError> {
        map.with_policy(self.missing_credit)
    }
}
