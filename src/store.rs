use crate::error::{GradebookError, MarkRejection, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One of the six grading periods of the school year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sequence {
    #[serde(rename = "firstSequence")]
    First,
    #[serde(rename = "secondSequence")]
    Second,
    #[serde(rename = "thirdSequence")]
    Third,
    #[serde(rename = "fourthSequence")]
    Fourth,
    #[serde(rename = "fifthSequence")]
    Fifth,
    #[serde(rename = "sixthSequence")]
    Sixth,
}

impl Sequence {
    pub const ALL: [Sequence; 6] = [
        Sequence::First,
        Sequence::Second,
        Sequence::Third,
        Sequence::Fourth,
        Sequence::Fifth,
        Sequence::Sixth,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Sequence::First => "firstSequence",
            Sequence::Second => "secondSequence",
            Sequence::Third => "thirdSequence",
            Sequence::Fourth => "fourthSequence",
            Sequence::Fifth => "fifthSequence",
            Sequence::Sixth => "sixthSequence",
        }
    }

    /// Accepts the slot key (`thirdSequence`) or the 1-based number (`3`).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(seq) = Self::ALL.iter().copied().find(|q| q.key() == s) {
            return Some(seq);
        }
        match s.parse::<usize>() {
            Ok(n) if (1..=6).contains(&n) => Some(Self::ALL[n - 1]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub total: f64,
}

/// Subject name -> mark. `None` is an explicit "no entry yet".
pub type SequenceMarks = BTreeMap<String, Option<f64>>;

/// A student's marks. All six slots always exist so every record has the
/// same shape on disk and on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    #[serde(default)]
    pub first_sequence: SequenceMarks,
    #[serde(default)]
    pub second_sequence: SequenceMarks,
    #[serde(default)]
    pub third_sequence: SequenceMarks,
    #[serde(default)]
    pub fourth_sequence: SequenceMarks,
    #[serde(default)]
    pub fifth_sequence: SequenceMarks,
    #[serde(default)]
    pub sixth_sequence: SequenceMarks,
}

impl MarkRecord {
    pub fn slot(&self, seq: Sequence) -> &SequenceMarks {
        match seq {
            Sequence::First => &self.first_sequence,
            Sequence::Second => &self.second_sequence,
            Sequence::Third => &self.third_sequence,
            Sequence::Fourth => &self.fourth_sequence,
            Sequence::Fifth => &self.fifth_sequence,
            Sequence::Sixth => &self.sixth_sequence,
        }
    }

    pub fn slot_mut(&mut self, seq: Sequence) -> &mut SequenceMarks {
        match seq {
            Sequence::First => &mut self.first_sequence,
            Sequence::Second => &mut self.second_sequence,
            Sequence::Third => &mut self.third_sequence,
            Sequence::Fourth => &mut self.fourth_sequence,
            Sequence::Fifth => &mut self.fifth_sequence,
            Sequence::Sixth => &mut self.sixth_sequence,
        }
    }

    /// Stored mark, or `None` when unset or absent.
    pub fn mark(&self, seq: Sequence, subject: &str) -> Option<f64> {
        self.slot(seq).get(subject).copied().flatten()
    }

    pub fn remove_subject(&mut self, subject: &str) -> usize {
        Sequence::ALL
            .iter()
            .filter(|seq| self.slot_mut(**seq).remove(subject).is_some())
            .count()
    }

    pub fn rename_subject(&mut self, from: &str, to: &str) {
        for seq in Sequence::ALL {
            let slot = self.slot_mut(seq);
            if let Some(v) = slot.remove(from) {
                slot.insert(to.to_string(), v);
            }
        }
    }
}

/// Turn a raw entry into a mark. Blank strings and null mean "no entry yet".
pub fn parse_mark(raw: Option<&serde_json::Value>) -> std::result::Result<Option<f64>, MarkRejection> {
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                return Ok(None);
            }
            t.parse::<f64>()
                .map(Some)
                .map_err(|_| MarkRejection::NotNumeric { raw: s.clone() })
        }
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| MarkRejection::NotNumeric { raw: n.to_string() }),
        Some(other) => Err(MarkRejection::NotNumeric {
            raw: other.to_string(),
        }),
    }
}

/// Range gate applied before anything is written. It never corrects a value.
pub fn validate_mark(value: Option<f64>, max: f64) -> std::result::Result<Option<f64>, MarkRejection> {
    match value {
        None => Ok(None),
        Some(v) if v.is_finite() && v >= 0.0 && v <= max => Ok(Some(v)),
        Some(v) if v.is_nan() => Err(MarkRejection::NotNumeric { raw: "NaN".into() }),
        Some(v) => Err(MarkRejection::OutOfRange { value: v, max }),
    }
}

/// Subject maxima are positive and finite; they are the denominators of every
/// average.
pub fn validate_total(total: f64) -> Result<f64> {
    if total.is_finite() && total > 0.0 {
        Ok(total)
    } else {
        Err(GradebookError::BadParams(format!(
            "subject total must be a positive number, got {}",
            total
        )))
    }
}

/// Per-student mark records plus the free-text comments that ride along
/// with them to reports. Keys are stable student ids, never roster positions.
#[derive(Debug, Clone, Default)]
pub struct MarkStore {
    records: HashMap<String, MarkRecord>,
    comments: HashMap<String, BTreeMap<String, String>>,
}

impl MarkStore {
    pub fn init_student(&mut self, student_id: &str) {
        self.records
            .insert(student_id.to_string(), MarkRecord::default());
    }

    pub fn insert_record(&mut self, student_id: &str, record: MarkRecord) {
        self.records.insert(student_id.to_string(), record);
    }

    pub fn records(&self) -> impl Iterator<Item = (&str, &MarkRecord)> {
        self.records.iter().map(|(id, r)| (id.as_str(), r))
    }

    pub fn record(&self, student_id: &str) -> Option<&MarkRecord> {
        self.records.get(student_id)
    }

    pub fn mark(&self, student_id: &str, seq: Sequence, subject: &str) -> Option<f64> {
        self.records
            .get(student_id)
            .and_then(|r| r.mark(seq, subject))
    }

    /// Validate and store one entry. On rejection the store is left as it was.
    pub fn set_mark(
        &mut self,
        student_id: &str,
        seq: Sequence,
        subject: &str,
        value: Option<f64>,
        subject_max: f64,
    ) -> Result<Option<f64>> {
        let accepted = validate_mark(value, subject_max)?;
        let Some(record) = self.records.get_mut(student_id) else {
            return Err(GradebookError::NotFound("student"));
        };
        record.slot_mut(seq).insert(subject.to_string(), accepted);
        Ok(accepted)
    }

    /// Drop `subject` from every slot of every record. Returns how many
    /// entries were removed.
    pub fn remove_subject(&mut self, subject: &str) -> usize {
        self.records
            .values_mut()
            .map(|r| r.remove_subject(subject))
            .sum()
    }

    pub fn rename_subject(&mut self, from: &str, to: &str) {
        for r in self.records.values_mut() {
            r.rename_subject(from, to);
        }
    }

    pub fn remove_student(&mut self, student_id: &str) -> Option<MarkRecord> {
        self.comments.remove(student_id);
        self.records.remove(student_id)
    }

    /// Stored marks for `subject` that exceed `total`. Used to report drift
    /// after a subject's maximum is lowered; nothing is rewritten.
    pub fn marks_above(&self, subject: &str, total: f64) -> Vec<(String, Sequence, f64)> {
        let mut out = Vec::new();
        for (student_id, record) in &self.records {
            for seq in Sequence::ALL {
                if let Some(v) = record.mark(seq, subject) {
                    if v > total {
                        out.push((student_id.clone(), seq, v));
                    }
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        out
    }

    pub fn comments_for(&self, student_id: &str) -> BTreeMap<String, String> {
        self.comments.get(student_id).cloned().unwrap_or_default()
    }

    pub fn comment(&self, student_id: &str, view_key: &str) -> Option<&str> {
        self.comments
            .get(student_id)
            .and_then(|m| m.get(view_key))
            .map(|s| s.as_str())
    }

    pub fn set_comments(&mut self, student_id: &str, comments: BTreeMap<String, String>) {
        if comments.is_empty() {
            self.comments.remove(student_id);
        } else {
            self.comments.insert(student_id.to_string(), comments);
        }
    }
}

/// Everything the engine reads: roster order, subject list, and the marks.
#[derive(Debug, Clone, Default)]
pub struct Gradebook {
    pub students: Vec<Student>,
    pub subjects: Vec<Subject>,
    pub marks: MarkStore,
}

impl Gradebook {
    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn subject(&self, id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    pub fn subject_by_name(&self, name: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.name == name)
    }

    pub fn add_student(&mut self, student: Student) {
        self.marks.init_student(&student.id);
        self.students.push(student);
    }

    pub fn remove_student(&mut self, id: &str) -> Option<Student> {
        let pos = self.students.iter().position(|s| s.id == id)?;
        self.marks.remove_student(id);
        Some(self.students.remove(pos))
    }

    pub fn rename_student(&mut self, id: &str, name: &str) {
        if let Some(s) = self.students.iter_mut().find(|s| s.id == id) {
            s.name = name.to_string();
        }
    }

    /// Subject names are the mark keys, so two subjects may not share one.
    pub fn check_subject_name(&self, name: &str, except_id: Option<&str>) -> Result<()> {
        match self.subject_by_name(name) {
            Some(s) if Some(s.id.as_str()) != except_id => Err(GradebookError::Conflict(
                format!("subject {} already exists", name),
            )),
            _ => Ok(()),
        }
    }

    pub fn add_subject(&mut self, subject: Subject) {
        self.subjects.push(subject);
    }

    pub fn remove_subject(&mut self, id: &str) -> Option<Subject> {
        let pos = self.subjects.iter().position(|s| s.id == id)?;
        let subject = self.subjects.remove(pos);
        self.marks.remove_subject(&subject.name);
        Some(subject)
    }

    pub fn update_subject(&mut self, id: &str, name: &str, total: f64) {
        let Some(subject) = self.subjects.iter_mut().find(|s| s.id == id) else {
            return;
        };
        if subject.name != name {
            let old = std::mem::replace(&mut subject.name, name.to_string());
            self.marks.rename_subject(&old, name);
        }
        subject.total = total;
    }
}
