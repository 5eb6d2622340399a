use crate::dtos::{CreateReportRequest, CreateReportResponse, ReportListResponse, ReportResponse};
use crate::middleware::UserId;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

#[tracing::instrument(skip(state, user_id, request), fields(user_id = user_id.0))]
pub async fn create_report(
    State(state): State<AppState>,
    user_id: UserId,
    Json(request): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<CreateReportResponse>), AppError> {
    request.validate_with_limit(state.max_description_length)?;

    let token = state
        .reports
        .new_report(
            user_id.0,
            request.description.trim().to_string(),
            request.parsed_filter(),
            request.parsed_lang(),
            request.parsed_type(),
        )
        .await?;

    Ok((StatusCode::ACCEPTED, Json(CreateReportResponse { token })))
}

#[tracing::instrument(skip(state, user_id), fields(user_id = user_id.0))]
pub async fn list_reports(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<Json<ReportListResponse>, AppError> {
    let reports: Vec<ReportResponse> = state
        .reports
        .list_reports(user_id.0)
        .await?
        .into_iter()
        .map(ReportResponse::from)
        .collect();

    Ok(Json(ReportListResponse {
        total: reports.len(),
        reports,
    }))
}

#[tracing::instrument(skip(state, user_id), fields(user_id = user_id.0))]
pub async fn get_report(
    State(state): State<AppState>,
    user_id: UserId,
    Path(token): Path<String>,
) -> Result<Json<ReportResponse>, AppError> {
    let job = state.reports.get_report(user_id.0, &token).await?;
    Ok(Json(ReportResponse::from(job)))
}

#[tracing::instrument(skip(state, user_id), fields(user_id = user_id.0))]
pub async fn download_report(
    State(state): State<AppState>,
    user_id: UserId,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (job, data) = state.reports.download(user_id.0, &token).await.map_err(|e| {
        tracing::warn!(error = %e, "Report download refused");
        e
    })?;

    tracing::info!(
        report_type = %job.report_type,
        size = data.len(),
        "Report download completed"
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"report-{}.json\"", job.token),
            ),
        ],
        data,
    ))
}
