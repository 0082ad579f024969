use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::{debug, warn};

use crate::error::{AnalyticsError, DataGap, Result, ValidationError};
use crate::grades::{Grade, GradeTable};
use crate::models::{AttentionEntry, CohortStatistics, SemesterRecord, SubjectStats, TopPerformer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubjectUniverse {
    #[default]
    Union,
    Intersection,
    Strict,
}

impl std::str::FromStr for SubjectUniverse {
    type Err = ValidationError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "union" => Ok(SubjectUniverse::Union),
            "intersection" => Ok(SubjectUniverse::Intersection),
            "strict" => Ok(SubjectUniverse::Strict),
            _ => Err(ValidationError::MalformedFilter {
                field: "universe".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CohortAnalysis {
    pub statistics: CohortStatistics,
    pub gaps: Vec<DataGap>,
}

fn percentage(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (part as f64 / total as f64 * 100.0).round() as u32
}

fn subject_universe(
    records: &[SemesterRecord],
    universe: SubjectUniverse,
) -> Result<(BTreeSet<String>, Vec<DataGap>)> {
    let sets: Vec<BTreeSet<&String>> = records.iter().map(|r| r.grades.keys().collect()).collect();

    let union: BTreeSet<String> = sets.iter().flatten().map(|s| (*s).clone()).collect();
    let chosen: BTreeSet<String> = match universe {
        SubjectUniverse::Union | SubjectUniverse::Strict => union,
        // Records without any grade do not narrow the intersection.
        SubjectUniverse::Intersection => union
            .into_iter()
            .filter(|subject| {
                sets.iter()
                    .filter(|set| !set.is_empty())
                    .all(|set| set.contains(subject))
            })
            .collect(),
    };

    let mut gaps = Vec::new();
    for (record, set) in records.iter().zip(&sets) {
        let missing: Vec<String> = chosen.iter().filter(|s| !set.contains(s)).cloned().collect();
        let extra: Vec<String> = set
            .iter()
            .filter(|s| !chosen.contains(**s))
            .map(|s| (*s).clone())
            .collect();
        if missing.is_empty() && extra.is_empty() {
            continue;
        }
        if universe == SubjectUniverse::Strict {
            return Err(ValidationError::SubjectSetMismatch {
                registration_number: record.registration_number.clone(),
                missing,
                extra,
            }
            .into());
        }
        warn!(
            "{}: subject set differs from cohort (missing {:?}, extra {:?})",
            record.registration_number, missing, extra
        );
        gaps.push(DataGap::SubjectSetMismatch {
            registration_number: record.registration_number.clone(),
            missing,
            extra,
        });
    }

    Ok((chosen, gaps))
}

fn check_identities(records: &[SemesterRecord]) -> Result<()> {
    let mut seen = HashSet::new();
    for record in records {
        if record.registration_number.trim().is_empty() {
            return Err(ValidationError::MissingRegistrationNumber {
                name: record.name.clone(),
            }
            .into());
        }
        if !seen.insert(record.registration_number.as_str()) {
            return Err(ValidationError::DuplicateRegistrationNumber {
                registration_number: record.registration_number.clone(),
            }
            .into());
        }
    }
    Ok(())
}

pub fn compute_semester_analysis(
    records: &[SemesterRecord],
    table: &GradeTable,
    universe: SubjectUniverse,
) -> Result<CohortAnalysis> {
    if records.is_empty() {
        return Err(AnalyticsError::EmptyInput {
            scope: "semester analysis".to_string(),
        });
    }
    check_identities(records)?;

    let (subjects, gaps) = subject_universe(records, universe)?;

    let mut grade_distribution: BTreeMap<Grade, usize> = BTreeMap::new();
    let mut subject_wise: BTreeMap<String, SubjectStats> = subjects
        .iter()
        .map(|subject| {
            (
                subject.clone(),
                SubjectStats {
                    pass_count: 0,
                    fail_count: 0,
                    pass_percentage: 0,
                    grade_distribution: BTreeMap::new(),
                },
            )
        })
        .collect();
    let mut top_performers = Vec::new();
    let mut needs_attention = Vec::new();
    let mut passed_students = 0usize;

    for record in records {
        let mut excellent_count = 0usize;
        let mut graded_count = 0usize;
        let mut failing_subjects = Vec::new();

        for subject in &subjects {
            let Some(grade) = record.grades.get(subject).copied() else {
                continue;
            };
            graded_count += 1;
            *grade_distribution.entry(grade).or_insert(0) += 1;

            if let Some(stats) = subject_wise.get_mut(subject) {
                *stats.grade_distribution.entry(grade).or_insert(0) += 1;
                if table.is_pass(grade) {
                    stats.pass_count += 1;
                } else {
                    stats.fail_count += 1;
                }
            }

            if table.is_excellent(grade) {
                excellent_count += 1;
            }
            if !table.is_pass(grade) {
                failing_subjects.push(subject.clone());
            }
        }

        if failing_subjects.is_empty() {
            passed_students += 1;
        } else {
            needs_attention.push(AttentionEntry {
                registration_number: record.registration_number.clone(),
                name: record.name.clone(),
                failing_subjects,
            });
        }

        if excellent_count > 0 {
            top_performers.push(TopPerformer {
                registration_number: record.registration_number.clone(),
                name: record.name.clone(),
                excellent_count,
                graded_count,
                excellence_ratio: excellent_count as f64 / graded_count as f64,
            });
        }
    }

    for stats in subject_wise.values_mut() {
        stats.pass_percentage = percentage(stats.pass_count, stats.pass_count + stats.fail_count);
    }

    top_performers.sort_by(|a, b| {
        b.excellence_ratio
            .total_cmp(&a.excellence_ratio)
            .then_with(|| a.registration_number.cmp(&b.registration_number))
    });
    needs_attention.sort_by(|a, b| {
        b.failing_count()
            .cmp(&a.failing_count())
            .then_with(|| a.registration_number.cmp(&b.registration_number))
    });

    let statistics = CohortStatistics {
        total_students: records.len(),
        total_subjects: subjects.len(),
        passed_students,
        pass_percentage: percentage(passed_students, records.len()),
        subjects: subjects.into_iter().collect(),
        grade_distribution,
        subject_wise,
        top_performers,
        needs_attention,
    };

    debug!(
        "cohort analysis: {} students, {} subjects, {}% passed",
        statistics.total_students, statistics.total_subjects, statistics.pass_percentage
    );

    Ok(CohortAnalysis { statistics, gaps })
}
