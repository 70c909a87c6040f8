//! Models handed to the document renderer. Nothing here formats numbers or
//! text; the renderer owns layout, rounding and localization.

use crate::calc::{self, AnnualResult, ResultRows, ResultSet, SequenceResult, View};
use crate::error::{GradebookError, Result};
use crate::store::Gradebook;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsReport {
    pub title: String,
    pub generated_on: String,
    #[serde(flatten)]
    pub results: ResultSet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectLine {
    pub subject: String,
    pub total: f64,
    pub mark: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StudentResultRow {
    Scoped(SequenceResult),
    Annual(AnnualResult),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student_id: String,
    pub student: String,
    pub view: View,
    pub generated_on: String,
    /// Per-subject marks; only filled for a sequence view.
    pub lines: Vec<SubjectLine>,
    /// The student's ranked row; only filled for term and annual views.
    pub result: Option<StudentResultRow>,
    pub comment: Option<String>,
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

pub fn results_report(view: View, book: &Gradebook) -> Result<ResultsReport> {
    let results = calc::compute_view(view, book)?;
    Ok(ResultsReport {
        title: view.key().to_string(),
        generated_on: today(),
        results,
    })
}

fn row_for(results: &ResultSet, student_id: &str) -> Option<StudentResultRow> {
    match &results.rows {
        ResultRows::Scoped(rows) => rows
            .iter()
            .find(|r| r.student_id == student_id)
            .cloned()
            .map(StudentResultRow::Scoped),
        ResultRows::Annual(rows) => rows
            .iter()
            .find(|r| r.student_id == student_id)
            .cloned()
            .map(StudentResultRow::Annual),
    }
}

fn build_student_report(
    view: View,
    book: &Gradebook,
    student_id: &str,
    results: Option<&ResultSet>,
    generated_on: &str,
) -> Result<StudentReport> {
    let student = book
        .student(student_id)
        .ok_or(GradebookError::NotFound("student"))?;

    let lines = match view {
        View::Sequence(seq) => book
            .subjects
            .iter()
            .map(|sub| SubjectLine {
                subject: sub.name.clone(),
                total: sub.total,
                mark: book.marks.mark(student_id, seq, &sub.name),
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(StudentReport {
        student_id: student.id.clone(),
        student: student.name.clone(),
        view,
        generated_on: generated_on.to_string(),
        lines,
        result: results.and_then(|r| row_for(r, student_id)),
        comment: book
            .marks
            .comment(student_id, view.key())
            .map(|s| s.to_string()),
    })
}

/// A sequence report only lists raw marks, so it works before any results
/// can be computed. Term and annual reports need the ranked result set.
fn results_for(view: View, book: &Gradebook) -> Result<Option<ResultSet>> {
    match view {
        View::Sequence(_) => Ok(None),
        _ => calc::compute_view(view, book).map(Some),
    }
}

pub fn student_report(view: View, book: &Gradebook, student_id: &str) -> Result<StudentReport> {
    let results = results_for(view, book)?;
    build_student_report(view, book, student_id, results.as_ref(), &today())
}

pub fn all_student_reports(view: View, book: &Gradebook) -> Result<Vec<StudentReport>> {
    let results = results_for(view, book)?;
    let generated_on = today();
    book.students
        .iter()
        .map(|s| build_student_report(view, book, &s.id, results.as_ref(), &generated_on))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Sequence, Student, Subject};
    use std::collections::BTreeMap;

    fn book() -> Gradebook {
        let mut b = Gradebook::default();
        for (id, name) in [("a", "Ann"), ("b", "Bob")] {
            b.add_student(Student {
                id: id.into(),
                name: name.into(),
            });
        }
        for (name, total) in [("Math", 20.0), ("English", 40.0)] {
            b.add_subject(Subject {
                id: name.to_lowercase(),
                name: name.into(),
                total,
            });
        }
        b.marks
            .set_mark("a", Sequence::First, "Math", Some(16.0), 20.0)
            .expect("set");
        b.marks
            .set_mark("b", Sequence::First, "Math", Some(18.0), 20.0)
            .expect("set");
        b.marks
            .set_mark("b", Sequence::Second, "English", Some(30.0), 40.0)
            .expect("set");
        let mut c = BTreeMap::new();
        c.insert("firstSequence".to_string(), "Keep it up".to_string());
        c.insert("annual".to_string(), "Promoted".to_string());
        b.marks.set_comments("a", c);
        b
    }

    #[test]
    fn sequence_report_lists_every_subject() {
        let b = book();
        let r = student_report(View::Sequence(Sequence::First), &b, "a").expect("report");
        assert_eq!(
            r.lines,
            vec![
                SubjectLine {
                    subject: "Math".into(),
                    total: 20.0,
                    mark: Some(16.0)
                },
                SubjectLine {
                    subject: "English".into(),
                    total: 40.0,
                    mark: None
                },
            ]
        );
        assert!(r.result.is_none());
        assert_eq!(r.comment.as_deref(), Some("Keep it up"));
    }

    #[test]
    fn sequence_report_needs_no_roster_wide_results() {
        let mut b = book();
        b.subjects.clear();
        let r = student_report(View::Sequence(Sequence::Second), &b, "b").expect("report");
        assert!(r.lines.is_empty());
    }

    #[test]
    fn term_report_carries_the_students_row() {
        let b = book();
        let r = student_report(View::FirstTerm, &b, "b").expect("report");
        let Some(StudentResultRow::Scoped(row)) = r.result else {
            panic!("expected term row");
        };
        assert_eq!(row.rank, 1);
        assert!((row.total_marks - 48.0).abs() < 1e-9);
        assert!((row.average - 48.0 / 120.0 * 20.0).abs() < 1e-9);
        assert!(r.lines.is_empty());
        assert_eq!(r.comment, None);
    }

    #[test]
    fn annual_report_uses_annual_comment() {
        let b = book();
        let r = student_report(View::Annual, &b, "a").expect("report");
        assert!(matches!(r.result, Some(StudentResultRow::Annual(_))));
        assert_eq!(r.comment.as_deref(), Some("Promoted"));
    }

    #[test]
    fn all_reports_follow_roster_order() {
        let b = book();
        let all = all_student_reports(View::SecondTerm, &b).expect("reports");
        let names: Vec<&str> = all.iter().map(|r| r.student.as_str()).collect();
        assert_eq!(names, vec!["Ann", "Bob"]);
    }

    #[test]
    fn unknown_student_is_not_found() {
        let b = book();
        let err = student_report(View::Annual, &b, "zed").expect_err("missing");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn results_report_flattens_result_set() {
        let b = book();
        let r = results_report(View::Sequence(Sequence::First), &b).expect("report");
        let v = serde_json::to_value(&r).expect("json");
        assert_eq!(v["title"], "firstSequence");
        assert_eq!(v["view"], "firstSequence");
        assert_eq!(v["rows"].as_array().map(|a| a.len()), Some(2));
        assert_eq!(v["stats"]["passingMark"], 10.0);
    }
}
