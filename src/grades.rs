use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "O")]
    O,
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "P")]
    P,
    #[serde(rename = "U")]
    U,
    #[serde(rename = "RA")]
    RA,
    #[serde(rename = "UA")]
    UA,
}

impl Grade {
    pub const ALL: [Grade; 10] = [
        Grade::O,
        Grade::APlus,
        Grade::A,
        Grade::BPlus,
        Grade::B,
        Grade::C,
        Grade::P,
        Grade::U,
        Grade::RA,
        Grade::UA,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::O => "O",
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::C => "C",
            Grade::P => "P",
            Grade::U => "U",
            Grade::RA => "RA",
            Grade::UA => "UA",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "O" => Ok(Grade::O),
            "A+" => Ok(Grade::APlus),
            "A" => Ok(Grade::A),
            "B+" => Ok(Grade::BPlus),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "P" => Ok(Grade::P),
            "U" => Ok(Grade::U),
            "RA" => Ok(Grade::RA),
            "UA" => Ok(Grade::UA),
            _ => Err(ValidationError::UnknownGradeLetter {
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeTable {
    points: [f64; 10],
    passing: [bool; 10],
    excellent: [bool; 10],
}

impl GradeTable {
    pub fn standard() -> Self {
        GradeTable {
            points: [10.0, 9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 0.0, 0.0, 0.0],
            passing: [true, true, true, true, true, true, true, false, false, false],
            excellent: [true, true, true, false, false, false, false, false, false, false],
        }
    }

    pub fn point(&self, grade: Grade) -> f64 {
        self.points[Self::index(grade)]
    }

    pub fn is_pass(&self, grade: Grade) -> bool {
        self.passing[Self::index(grade)]
    }

    pub fn is_excellent(&self, grade: Grade) -> bool {
        self.excellent[Self::index(grade)]
    }

    fn index(grade: Grade) -> usize {
        match grade {
            Grade::O => 0,
            Grade::APlus => 1,
            Grade::A => 2,
            Grade::BPlus => 3,
            Grade::B => 4,
            Grade::C => 5,
            Grade::P => 6,
            Grade::U => 7,
            Grade::RA => 8,
            Grade::UA => 9,
        }
    }
}

impl Default for GradeTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_letter_in_the_fixed_set() {
        for grade in Grade::ALL {
            assert_eq!(grade.as_str().parse::<Grade>(), Ok(grade));
        }
        assert_eq!(" A+ ".parse::<Grade>(), Ok(Grade::APlus));
    }

    #[test]
    fn rejects_letters_outside_the_set() {
        for value in ["X", "a+", "", "F", "AA"] {
            assert!(value.parse::<Grade>().is_err(), "{value} should be rejected");
        }
    }

    #[test]
    fn only_u_ra_ua_fail() {
        let table = GradeTable::standard();
        let failing: Vec<Grade> = Grade::ALL
            .into_iter()
            .filter(|g| !table.is_pass(*g))
            .collect();
        assert_eq!(failing, vec![Grade::U, Grade::RA, Grade::UA]);
        assert!(table.is_pass(Grade::P));
    }

    #[test]
    fn excellent_grades_are_o_a_plus_and_a() {
        let table = GradeTable::standard();
        let excellent: Vec<Grade> = Grade::ALL
            .into_iter()
            .filter(|g| table.is_excellent(*g))
            .collect();
        assert_eq!(excellent, vec![Grade::O, Grade::APlus, Grade::A]);
    }

    #[test]
    fn standard_points_follow_ten_point_scale() {
        let table = GradeTable::standard();
        assert_eq!(table.point(Grade::O), 10.0);
        assert_eq!(table.point(Grade::APlus), 9.0);
        assert_eq!(table.point(Grade::C), 5.0);
        assert_eq!(table.point(Grade::P), 4.0);
        for grade in [Grade::U, Grade::RA, Grade::UA] {
            assert_eq!(table.point(grade), 0.0);
        }
    }

    #[test]
    fn serializes_as_letter() {
        let json = serde_json::to_string(&Grade::BPlus).unwrap();
        assert_eq!(json, "\"B+\"");
    }
}
