use crate::error::{GradebookError, Result};
use crate::store::{Gradebook, MarkRecord, Student, Subject};
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_sort ON students(sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            total REAL NOT NULL CHECK(total > 0),
            sort_order INTEGER NOT NULL,
            created_at TEXT
        )",
        [],
    )?;

    // One JSON document per student carrying all six sequence slots.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS mark_records(
            student_id TEXT PRIMARY KEY,
            record TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS comments(
            student_id TEXT NOT NULL,
            view_key TEXT NOT NULL,
            text TEXT NOT NULL,
            PRIMARY KEY(student_id, view_key),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_comments_student ON comments(student_id)",
        [],
    )?;

    backfill_mark_records(&conn)?;

    Ok(conn)
}

/// Every student gets a record, and every stored record is rewritten with
/// all six slots so older or hand-edited rows end up with the uniform shape.
fn backfill_mark_records(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO mark_records(student_id, record, updated_at)
         SELECT s.id, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now')
         FROM students s
         WHERE NOT EXISTS (SELECT 1 FROM mark_records m WHERE m.student_id = s.id)",
        [serde_json::to_string(&MarkRecord::default())?],
    )?;

    let mut stmt = conn.prepare("SELECT student_id, record FROM mark_records")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for (student_id, raw) in rows {
        let record: MarkRecord = serde_json::from_str(&raw)?;
        let normalized = serde_json::to_string(&record)?;
        if normalized != raw {
            conn.execute(
                "UPDATE mark_records SET record = ? WHERE student_id = ?",
                (&normalized, &student_id),
            )?;
        }
    }
    Ok(())
}

fn decode_record(raw: &str) -> Result<MarkRecord> {
    serde_json::from_str(raw).map_err(|e| {
        GradebookError::Storage(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(e),
        ))
    })
}

fn encode_record(record: &MarkRecord) -> Result<String> {
    serde_json::to_string(record)
        .map_err(|e| GradebookError::Storage(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))
}

fn write_record(tx: &Transaction<'_>, student_id: &str, record: &MarkRecord) -> Result<()> {
    tx.execute(
        "INSERT INTO mark_records(student_id, record, updated_at)
         VALUES(?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
         ON CONFLICT(student_id) DO UPDATE SET
           record = excluded.record,
           updated_at = excluded.updated_at",
        (student_id, encode_record(record)?),
    )?;
    Ok(())
}

pub fn list_students(conn: &Connection) -> Result<Vec<Student>> {
    let mut stmt = conn.prepare("SELECT id, name FROM students ORDER BY sort_order")?;
    let students = stmt
        .query_map([], |r| {
            Ok(Student {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(students)
}

pub fn list_subjects(conn: &Connection) -> Result<Vec<Subject>> {
    let mut stmt = conn.prepare("SELECT id, name, total FROM subjects ORDER BY sort_order")?;
    let subjects = stmt
        .query_map([], |r| {
            Ok(Subject {
                id: r.get(0)?,
                name: r.get(1)?,
                total: r.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(subjects)
}

pub fn get_marks(conn: &Connection, student_id: &str) -> Result<MarkRecord> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT record FROM mark_records WHERE student_id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(raw) => decode_record(&raw),
        None => Err(GradebookError::NotFound("student")),
    }
}

pub fn set_marks(conn: &Connection, student_id: &str, record: &MarkRecord) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let exists: Option<i64> = tx
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(GradebookError::NotFound("student"));
    }
    write_record(&tx, student_id, record)?;
    tx.commit()?;
    Ok(())
}

pub fn get_comments(conn: &Connection, student_id: &str) -> Result<BTreeMap<String, String>> {
    let mut stmt =
        conn.prepare("SELECT view_key, text FROM comments WHERE student_id = ? ORDER BY view_key")?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

/// Replace the student's whole comment map.
pub fn set_comments(
    conn: &Connection,
    student_id: &str,
    comments: &BTreeMap<String, String>,
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM comments WHERE student_id = ?", [student_id])?;
    for (view_key, text) in comments {
        tx.execute(
            "INSERT INTO comments(student_id, view_key, text) VALUES(?, ?, ?)",
            (student_id, view_key, text),
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn insert_student(conn: &Connection, name: &str) -> Result<Student> {
    let tx = conn.unchecked_transaction()?;
    let sort_order: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students",
        [],
        |r| r.get(0),
    )?;
    let student = Student {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
    };
    tx.execute(
        "INSERT INTO students(id, name, sort_order, created_at, updated_at)
         VALUES(?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'), strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (&student.id, &student.name, sort_order),
    )?;
    write_record(&tx, &student.id, &MarkRecord::default())?;
    tx.commit()?;
    Ok(student)
}

pub fn rename_student(conn: &Connection, student_id: &str, name: &str) -> Result<()> {
    let changed = conn.execute(
        "UPDATE students
         SET name = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (name, student_id),
    )?;
    if changed == 0 {
        return Err(GradebookError::NotFound("student"));
    }
    Ok(())
}

/// Student row, mark record and comments go together or not at all.
pub fn delete_student(conn: &Connection, student_id: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let sort_order: Option<i64> = tx
        .query_row(
            "SELECT sort_order FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(sort_order) = sort_order else {
        return Err(GradebookError::NotFound("student"));
    };

    tx.execute("DELETE FROM comments WHERE student_id = ?", [student_id])?;
    tx.execute("DELETE FROM mark_records WHERE student_id = ?", [student_id])?;
    tx.execute("DELETE FROM students WHERE id = ?", [student_id])?;
    // Keep roster order contiguous.
    tx.execute(
        "UPDATE students SET sort_order = sort_order - 1 WHERE sort_order > ?",
        [sort_order],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn insert_subject(conn: &Connection, name: &str, total: f64) -> Result<Subject> {
    let sort_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM subjects",
        [],
        |r| r.get(0),
    )?;
    let subject = Subject {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        total,
    };
    conn.execute(
        "INSERT INTO subjects(id, name, total, sort_order, created_at)
         VALUES(?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (&subject.id, &subject.name, subject.total, sort_order),
    )?;
    Ok(subject)
}

/// Update the subject row and rewrite the given mark records in one
/// transaction. Callers pass the records as they look after a rename.
pub fn update_subject<'a>(
    conn: &Connection,
    subject: &Subject,
    records: impl IntoIterator<Item = (&'a str, &'a MarkRecord)>,
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let changed = tx.execute(
        "UPDATE subjects SET name = ?, total = ? WHERE id = ?",
        (&subject.name, subject.total, &subject.id),
    )?;
    if changed == 0 {
        return Err(GradebookError::NotFound("subject"));
    }
    for (student_id, record) in records {
        write_record(&tx, student_id, record)?;
    }
    tx.commit()?;
    Ok(())
}

/// Delete the subject row and write back every record with the subject's
/// key already stripped, atomically.
pub fn delete_subject<'a>(
    conn: &Connection,
    subject_id: &str,
    records: impl IntoIterator<Item = (&'a str, &'a MarkRecord)>,
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    let changed = tx.execute("DELETE FROM subjects WHERE id = ?", [subject_id])?;
    if changed == 0 {
        return Err(GradebookError::NotFound("subject"));
    }
    for (student_id, record) in records {
        write_record(&tx, student_id, record)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn reset_workspace(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM comments", [])?;
    tx.execute("DELETE FROM mark_records", [])?;
    tx.execute("DELETE FROM students", [])?;
    tx.execute("DELETE FROM subjects", [])?;
    tx.commit()?;
    Ok(())
}

/// Full snapshot of the workspace for the engine.
pub fn load_gradebook(conn: &Connection) -> Result<Gradebook> {
    let mut book = Gradebook {
        students: list_students(conn)?,
        subjects: list_subjects(conn)?,
        ..Gradebook::default()
    };

    let mut stmt = conn.prepare("SELECT student_id, record FROM mark_records")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut records: std::collections::HashMap<String, MarkRecord> = rows
        .into_iter()
        .map(|(id, raw)| decode_record(&raw).map(|r| (id, r)))
        .collect::<Result<_>>()?;

    let mut stmt = conn.prepare("SELECT student_id, view_key, text FROM comments")?;
    let comment_rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut comments: std::collections::HashMap<String, BTreeMap<String, String>> =
        std::collections::HashMap::new();
    for (student_id, view_key, text) in comment_rows {
        comments.entry(student_id).or_default().insert(view_key, text);
    }

    for s in &book.students {
        let record = records.remove(&s.id).unwrap_or_default();
        book.marks.insert_record(&s.id, record);
        if let Some(c) = comments.remove(&s.id) {
            book.marks.set_comments(&s.id, c);
        }
    }
    Ok(book)
}
