use crate::ipc::error::from_result;
use crate::ipc::helpers::{book, required_str, required_view};
use crate::ipc::types::{AppState, Request};
use crate::report;
use serde_json::json;

fn handle_reports_results(state: &mut AppState, req: &Request) -> serde_json::Value {
    let view = match required_view(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match book(state, req) {
        Ok(b) => from_result(&req.id, report::results_report(view, b)),
        Err(resp) => resp,
    }
}

fn handle_reports_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let view = match required_view(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match book(state, req) {
        Ok(b) => from_result(&req.id, report::student_report(view, b, &student_id)),
        Err(resp) => resp,
    }
}

fn handle_reports_all_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let view = match required_view(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match book(state, req) {
        Ok(b) => from_result(
            &req.id,
            report::all_student_reports(view, b).map(|reports| json!({ "reports": reports })),
        ),
        Err(resp) => resp,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.results" => Some(handle_reports_results(state, req)),
        "reports.student" => Some(handle_reports_student(state, req)),
        "reports.allStudents" => Some(handle_reports_all_students(state, req)),
        _ => None,
    }
}
