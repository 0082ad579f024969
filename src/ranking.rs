use std::cmp::Ordering;

use crate::error::ValidationError;
use crate::models::StudentAggregate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Cgpa,
    RegistrationNumber,
    Name,
}

impl std::str::FromStr for SortKey {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cgpa" => Ok(SortKey::Cgpa),
            "reg" | "reg_no" | "registration" => Ok(SortKey::RegistrationNumber),
            "name" => Ok(SortKey::Name),
            _ => Err(ValidationError::MalformedFilter {
                field: "sort".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

pub fn compare(a: &StudentAggregate, b: &StudentAggregate, key: SortKey) -> Ordering {
    let by_reg = || a.registration_number.cmp(&b.registration_number);
    match key {
        SortKey::Cgpa => b.cgpa.total_cmp(&a.cgpa).then_with(by_reg),
        SortKey::RegistrationNumber => by_reg(),
        SortKey::Name => a.name.cmp(&b.name).then_with(by_reg),
    }
}

pub fn rank_students(mut students: Vec<StudentAggregate>, key: SortKey) -> Vec<StudentAggregate> {
    students.sort_by(|a, b| compare(a, b, key));
    for (position, student) in students.iter_mut().enumerate() {
        student.rank = position + 1;
    }
    students
}
