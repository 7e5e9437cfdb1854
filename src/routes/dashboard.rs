use crate::{data::stats::DashboardStats, error::AppResult, state::AppState};
use axum::{Json, extract::State};

pub async fn get_dashboard_stats(State(state): State<AppState>) -> AppResult<Json<DashboardStats>> {
    let stats = DashboardStats::gather(&*state).await?;
    info!(
        total_students = stats.total_students,
        total_courses = stats.total_courses,
        "Computed dashboard stats"
    );
    Ok(Json(stats))
}
