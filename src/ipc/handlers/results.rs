use crate::calc::{self, View};
use crate::ipc::error::from_result;
use crate::ipc::helpers::{book, required_sequence, required_view};
use crate::ipc::types::{AppState, Request};

fn handle_results_sequence(state: &mut AppState, req: &Request) -> serde_json::Value {
    let seq = match required_sequence(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match book(state, req) {
        Ok(b) => from_result(&req.id, calc::compute_view(View::Sequence(seq), b)),
        Err(resp) => resp,
    }
}

fn handle_results_terms(state: &mut AppState, req: &Request) -> serde_json::Value {
    match book(state, req) {
        Ok(b) => from_result(&req.id, calc::compute_terms_and_annual(b)),
        Err(resp) => resp,
    }
}

fn handle_results_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    let view = match required_view(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match book(state, req) {
        Ok(b) => from_result(&req.id, calc::compute_view(view, b)),
        Err(resp) => resp,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.sequence" => Some(handle_results_sequence(state, req)),
        "results.terms" => Some(handle_results_terms(state, req)),
        "results.view" => Some(handle_results_view(state, req)),
        _ => None,
    }
}
