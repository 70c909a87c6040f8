use crate::db;
use crate::ipc::error::{err, from_error, ok};
use crate::ipc::helpers::{book, required_name, required_str, workspace};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    match book(state, req) {
        Ok(b) => ok(&req.id, json!({ "students": b.students })),
        Err(resp) => resp,
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match required_name(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (conn, book) = match workspace(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student = match db::insert_student(conn, &name) {
        Ok(s) => s,
        Err(e) => return from_error(&req.id, &e),
    };
    tracing::info!(student_id = %student.id, "student created");
    let result = json!({ "studentId": student.id, "name": student.name });
    book.add_student(student);
    ok(&req.id, result)
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match required_name(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (conn, book) = match workspace(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if book.student(&student_id).is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }
    if let Err(e) = db::rename_student(conn, &student_id, &name) {
        return from_error(&req.id, &e);
    }
    book.rename_student(&student_id, &name);
    ok(&req.id, json!({ "studentId": student_id, "name": name }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (conn, book) = match workspace(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if book.student(&student_id).is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }
    if let Err(e) = db::delete_student(conn, &student_id) {
        return from_error(&req.id, &e);
    }
    book.remove_student(&student_id);
    tracing::info!(student_id = %student_id, "student deleted");
    ok(&req.id, json!({ "studentId": student_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
