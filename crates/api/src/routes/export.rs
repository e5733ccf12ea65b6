//! Data export endpoint.

use analytics_core::DateWindow;
use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use pipeline::{ExportFormat, ExportTable};
use serde::Deserialize;

use crate::response::{ApiError, CsvGuidance};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
    pub table: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl ExportQuery {
    fn format(&self) -> Result<ExportFormat, ApiError> {
        Ok(self.format.as_deref().map(str::parse::<ExportFormat>).transpose()?.unwrap_or_default())
    }

    fn table(&self) -> Result<ExportTable, ApiError> {
        Ok(self.table.as_deref().map(str::parse::<ExportTable>).transpose()?.unwrap_or_default())
    }
}

fn attachment(table: &str, extension: &str) -> String {
    format!(
        "attachment; filename=\"{}_export_{}.{}\"",
        table,
        Utc::now().format("%Y-%m-%d"),
        extension
    )
}

fn csv_guidance() -> CsvGuidance {
    CsvGuidance {
        message: "For multi-table CSV export, please use individual table exports".to_string(),
        available_tables: ExportTable::SINGLE
            .iter()
            .map(|t| t.as_str().to_string())
            .collect(),
        example_urls: [ExportTable::Users, ExportTable::Sessions, ExportTable::Events]
            .iter()
            .map(|t| format!("/export?table={}&format=csv", t))
            .collect(),
    }
}

/// GET /export - Tables as a JSON document or single-table CSV.
pub async fn export_handler(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format = query.format()?;
    let table = query.table()?;
    let window = DateWindow::parse(query.start_date.as_deref(), query.end_date.as_deref())?;

    match (format, table) {
        (ExportFormat::Csv, ExportTable::All) => Ok(Json(csv_guidance()).into_response()),
        (ExportFormat::Csv, table) => {
            let csv = state.export.csv(table, &window).await?;
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (header::CONTENT_DISPOSITION, attachment(table.as_str(), "csv")),
                ],
                csv,
            )
                .into_response())
        }
        (ExportFormat::Json, table) => {
            let document = state.export.document(table, &window).await?;
            Ok((
                [(header::CONTENT_DISPOSITION, attachment("analytics", "json"))],
                Json(document),
            )
                .into_response())
        }
    }
}
