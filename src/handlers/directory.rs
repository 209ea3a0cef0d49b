// handlers/directory.rs - GET /get-students handler

use axum::{extract::State, http::Method, response::Response};
use serde_json::{json, Value};

use crate::database::models::{AssignmentView, StudentSummary, TeacherSummary};
use crate::database::{DatabaseError, SchoolStore};
use crate::middleware::{ApiResult, Endpoint};
use crate::state::{release, AppState};
use crate::types::Role;

const ENDPOINT: Endpoint = Endpoint::new(&["GET"], "Content-Type");

/// GET /get-students - students, teachers and all assignments for the dashboard
pub async fn get_students(State(state): State<AppState>, method: Method) -> Response {
    ENDPOINT.dispatch(&method, || directory(state)).await
}

async fn directory(state: AppState) -> ApiResult<Value> {
    let mut store = state.open_store().await?;
    let listing = read_directory(store.as_mut()).await;
    release(store).await;
    let (students, teachers, assignments) = listing?;

    Ok(json!({
        "success": true,
        "students": students,
        "teachers": teachers,
        "assignments": assignments,
    }))
}

type Directory = (Vec<StudentSummary>, Vec<TeacherSummary>, Vec<AssignmentView>);

async fn read_directory(store: &mut dyn SchoolStore) -> Result<Directory, DatabaseError> {
    let students = store.list_users(Role::Student).await?;
    let teachers = store.list_users(Role::Teacher).await?;
    let assignments = store.list_assignments().await?;
    Ok((
        students.into_iter().map(StudentSummary::from).collect(),
        teachers.into_iter().map(TeacherSummary::from).collect(),
        assignments.into_iter().map(AssignmentView::from).collect(),
    ))
}
