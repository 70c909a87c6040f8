use crate::error::{GradebookError, Result, Shortfall};
use crate::store::{Gradebook, MarkStore, Sequence, Student, Subject};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Every average is expressed on a 0..=20 scale.
pub const SCALE: f64 = 20.0;
/// Half the scale. Fixed; not a setting.
pub const PASSING_MARK: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Term {
    First,
    Second,
    Third,
}

impl Term {
    pub const ALL: [Term; 3] = [Term::First, Term::Second, Term::Third];

    pub fn sequences(self) -> [Sequence; 2] {
        match self {
            Term::First => [Sequence::First, Sequence::Second],
            Term::Second => [Sequence::Third, Sequence::Fourth],
            Term::Third => [Sequence::Fifth, Sequence::Sixth],
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Term::First => "firstTerm",
            Term::Second => "secondTerm",
            Term::Third => "thirdTerm",
        }
    }
}

/// What a result set (and a report) is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Sequence(Sequence),
    FirstTerm,
    SecondTerm,
    ThirdTerm,
    Annual,
}

impl View {
    pub fn term(self) -> Option<Term> {
        match self {
            View::FirstTerm => Some(Term::First),
            View::SecondTerm => Some(Term::Second),
            View::ThirdTerm => Some(Term::Third),
            View::Sequence(_) | View::Annual => None,
        }
    }

    /// Also the key under which comments for this view are stored.
    pub fn key(self) -> &'static str {
        match self {
            View::Sequence(seq) => seq.key(),
            View::FirstTerm => Term::First.key(),
            View::SecondTerm => Term::Second.key(),
            View::ThirdTerm => Term::Third.key(),
            View::Annual => "annual",
        }
    }

    /// `firstTerm`, `annual`, a sequence key, or `sequence` together with a
    /// separate sequence selector.
    pub fn parse(view: &str, sequence: Option<&str>) -> Option<Self> {
        match view.trim() {
            "firstTerm" => Some(View::FirstTerm),
            "secondTerm" => Some(View::SecondTerm),
            "thirdTerm" => Some(View::ThirdTerm),
            "annual" => Some(View::Annual),
            "sequence" => Sequence::parse(sequence?).map(View::Sequence),
            other => Sequence::parse(other).map(View::Sequence),
        }
    }
}

impl Serialize for View {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.key())
    }
}

impl From<Term> for View {
    fn from(t: Term) -> Self {
        match t {
            Term::First => View::FirstTerm,
            Term::Second => View::SecondTerm,
            Term::Third => View::ThirdTerm,
        }
    }
}

/// Unranked per-student figures for one scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub student_id: String,
    pub student: String,
    pub total_marks: f64,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnualAggregate {
    pub student_id: String,
    pub student: String,
    pub first_term_average: f64,
    pub second_term_average: f64,
    pub third_term_average: f64,
    pub final_average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceResult {
    pub student_id: String,
    pub student: String,
    pub total_marks: f64,
    pub average: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualResult {
    pub student_id: String,
    pub student: String,
    pub first_term_average: f64,
    pub second_term_average: f64,
    pub third_term_average: f64,
    pub final_average: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStats {
    pub class_average: f64,
    pub pass_percentage: f64,
    pub pass_count: usize,
    pub student_count: usize,
    pub passing_mark: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultRows {
    Scoped(Vec<SequenceResult>),
    Annual(Vec<AnnualResult>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    pub view: View,
    pub rows: ResultRows,
    pub stats: ClassStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermsAndAnnual {
    pub first_term: ResultSet,
    pub second_term: ResultSet,
    pub third_term: ResultSet,
    pub annual: ResultSet,
}

fn ensure_inputs(students: &[Student], subjects: &[Subject]) -> Result<f64> {
    if students.is_empty() {
        return Err(GradebookError::InsufficientData(Shortfall::EmptyRoster));
    }
    let possible: f64 = subjects.iter().map(|s| s.total).sum();
    if subjects.is_empty() || possible <= 0.0 {
        return Err(GradebookError::InsufficientData(Shortfall::NoSubjects));
    }
    Ok(possible)
}

/// Sum marks over `sequences` and scale to 0..=20. Unset marks count as 0 and
/// stay in the denominator.
pub fn compute_span(
    sequences: &[Sequence],
    students: &[Student],
    subjects: &[Subject],
    marks: &MarkStore,
) -> Result<Vec<Aggregate>> {
    let per_sequence = ensure_inputs(students, subjects)?;
    let possible = per_sequence * sequences.len() as f64;

    Ok(students
        .iter()
        .map(|st| {
            let total_marks: f64 = sequences
                .iter()
                .flat_map(|seq| {
                    subjects
                        .iter()
                        .map(move |sub| marks.mark(&st.id, *seq, &sub.name).unwrap_or(0.0))
                })
                .sum();
            Aggregate {
                student_id: st.id.clone(),
                student: st.name.clone(),
                total_marks,
                average: total_marks / possible * SCALE,
            }
        })
        .collect())
}

pub fn compute_sequence(
    seq: Sequence,
    students: &[Student],
    subjects: &[Subject],
    marks: &MarkStore,
) -> Result<Vec<Aggregate>> {
    compute_span(&[seq], students, subjects, marks)
}

pub fn compute_term(
    term: Term,
    students: &[Student],
    subjects: &[Subject],
    marks: &MarkStore,
) -> Result<Vec<Aggregate>> {
    compute_span(&term.sequences(), students, subjects, marks)
}

/// Unweighted mean of the three term averages, matched by student id.
pub fn compute_annual(
    first: &[Aggregate],
    second: &[Aggregate],
    third: &[Aggregate],
) -> Result<Vec<AnnualAggregate>> {
    if first.is_empty() {
        return Err(GradebookError::InsufficientData(Shortfall::EmptyRoster));
    }
    if first.len() != second.len() || first.len() != third.len() {
        return Err(GradebookError::RosterMismatch);
    }
    let second_by_id: HashMap<&str, f64> = second
        .iter()
        .map(|a| (a.student_id.as_str(), a.average))
        .collect();
    let third_by_id: HashMap<&str, f64> = third
        .iter()
        .map(|a| (a.student_id.as_str(), a.average))
        .collect();

    first
        .iter()
        .map(|a| {
            let b = second_by_id
                .get(a.student_id.as_str())
                .copied()
                .ok_or(GradebookError::RosterMismatch)?;
            let c = third_by_id
                .get(a.student_id.as_str())
                .copied()
                .ok_or(GradebookError::RosterMismatch)?;
            Ok(AnnualAggregate {
                student_id: a.student_id.clone(),
                student: a.student.clone(),
                first_term_average: a.average,
                second_term_average: b,
                third_term_average: c,
                final_average: (a.average + b + c) / 3.0,
            })
        })
        .collect()
}

/// Sort by score descending and hand out ranks by position. Equal scores get
/// distinct consecutive ranks in input order (the sort is stable).
pub fn rank<T>(entries: Vec<T>, score: impl Fn(&T) -> f64) -> Vec<(usize, T)> {
    let mut sorted = entries;
    sorted.sort_by(|a, b| score(b).partial_cmp(&score(a)).unwrap_or(Ordering::Equal));
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, e)| (i + 1, e))
        .collect()
}

pub fn class_average(scores: &[f64]) -> Result<f64> {
    if scores.is_empty() {
        return Err(GradebookError::InsufficientData(Shortfall::EmptyRoster));
    }
    Ok(scores.iter().sum::<f64>() / scores.len() as f64)
}

pub fn pass_percentage(scores: &[f64], passing_mark: f64) -> Result<f64> {
    if scores.is_empty() {
        return Err(GradebookError::InsufficientData(Shortfall::EmptyRoster));
    }
    let passed = scores.iter().filter(|s| **s >= passing_mark).count();
    Ok(100.0 * passed as f64 / scores.len() as f64)
}

pub fn class_stats(scores: &[f64]) -> Result<ClassStats> {
    Ok(ClassStats {
        class_average: class_average(scores)?,
        pass_percentage: pass_percentage(scores, PASSING_MARK)?,
        pass_count: scores.iter().filter(|s| **s >= PASSING_MARK).count(),
        student_count: scores.len(),
        passing_mark: PASSING_MARK,
    })
}

fn scoped_result_set(view: View, aggregates: Vec<Aggregate>) -> Result<ResultSet> {
    let scores: Vec<f64> = aggregates.iter().map(|a| a.average).collect();
    let stats = class_stats(&scores)?;
    let rows = rank(aggregates, |a| a.average)
        .into_iter()
        .map(|(rank, a)| SequenceResult {
            student_id: a.student_id,
            student: a.student,
            total_marks: a.total_marks,
            average: a.average,
            rank,
        })
        .collect();
    Ok(ResultSet {
        view,
        rows: ResultRows::Scoped(rows),
        stats,
    })
}

fn annual_result_set(aggregates: Vec<AnnualAggregate>) -> Result<ResultSet> {
    let scores: Vec<f64> = aggregates.iter().map(|a| a.final_average).collect();
    let stats = class_stats(&scores)?;
    let rows = rank(aggregates, |a| a.final_average)
        .into_iter()
        .map(|(rank, a)| AnnualResult {
            student_id: a.student_id,
            student: a.student,
            first_term_average: a.first_term_average,
            second_term_average: a.second_term_average,
            third_term_average: a.third_term_average,
            final_average: a.final_average,
            rank,
        })
        .collect();
    Ok(ResultSet {
        view: View::Annual,
        rows: ResultRows::Annual(rows),
        stats,
    })
}

/// Ranked results plus class statistics for any view, recomputed from the
/// snapshot on every call.
pub fn compute_view(view: View, book: &Gradebook) -> Result<ResultSet> {
    if let Some(term) = view.term() {
        return scoped_result_set(
            view,
            compute_term(term, &book.students, &book.subjects, &book.marks)?,
        );
    }
    match view {
        View::Sequence(seq) => scoped_result_set(
            view,
            compute_sequence(seq, &book.students, &book.subjects, &book.marks)?,
        ),
        _ => Ok(compute_terms_and_annual(book)?.annual),
    }
}

pub fn compute_terms_and_annual(book: &Gradebook) -> Result<TermsAndAnnual> {
    let [t1, t2, t3] = Term::ALL
        .map(|t| compute_term(t, &book.students, &book.subjects, &book.marks));
    let (t1, t2, t3) = (t1?, t2?, t3?);
    let annual = annual_result_set(compute_annual(&t1, &t2, &t3)?)?;
    Ok(TermsAndAnnual {
        first_term: scoped_result_set(View::FirstTerm, t1)?,
        second_term: scoped_result_set(View::SecondTerm, t2)?,
        third_term: scoped_result_set(View::ThirdTerm, t3)?,
        annual,
    })
}
