#[cfg(test)]
mod tests;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use itertools::Itertools;
use rust_xlsxwriter::Workbook;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::WebRagError;
use crate::llm::{ChatTurn, SMART_MODEL, format_history, strip_code_fences};
use crate::rag::RagService;

pub const EXPORT_FILENAME: &str = "export.xlsx";

const INTENT_LABEL: &str = "excel";
const INTENT_DESCRIPTION: &str = "an Excel/spreadsheet/table";

/// Outcome of an export request. Intent classification decides whether the
/// user gets a spreadsheet or a plain chat answer.
#[derive(Debug, Clone)]
pub enum ExcelOutcome {
    Chat {
        message: String,
    },
    Excel {
        message: String,
        filename: String,
        file_base64: String,
    },
}

/// Handle an export request against an analysis index.
///
/// Chat-intent messages are routed to the regular question path. Excel-intent
/// messages retrieve an answer from the index, have the LLM restructure it
/// into JSON rows, and return those rows as a base64-encoded `.xlsx` file.
pub async fn create_excel(
    rag: &RagService,
    index_name: &str,
    query: &str,
    history: &[ChatTurn],
) -> crate::Result<ExcelOutcome> {
    let intent = rag
        .llm()
        .classify_intent(query, history, INTENT_LABEL, INTENT_DESCRIPTION)
        .await;
    info!("Export intent classified as: {intent}");

    if intent != INTENT_LABEL {
        let message = rag.ask(index_name, query, history).await?;
        return Ok(ExcelOutcome::Chat { message });
    }

    let rag_answer = rag.ask(index_name, query, &[]).await?;
    if rag_answer.trim().is_empty() {
        return Err(WebRagError::InvalidRequest(
            "No data found to export.".to_string(),
        ));
    }

    let rows = structure_rows(rag, query, &rag_answer, history).await?;
    info!("Structured {} rows for Excel", rows.len());

    let file_base64 = build_excel_base64(&rows)?;

    Ok(ExcelOutcome::Excel {
        message: format!("Excel generated with {} rows.", rows.len()),
        filename: EXPORT_FILENAME.to_string(),
        file_base64,
    })
}

/// Ask the LLM to restructure a text answer into spreadsheet rows.
async fn structure_rows(
    rag: &RagService,
    query: &str,
    rag_answer: &str,
    history: &[ChatTurn],
) -> crate::Result<Vec<Map<String, Value>>> {
    let history_block = format_history(history);
    let prompt = format!(
        "You are a Data Structuring Assistant.\n\
         Convert the text data below into a JSON array of objects suitable for an Excel spreadsheet.\n\n\
         RULES:\n\
         - Each object in the array represents ONE ROW.\n\
         - The keys of every object are the COLUMN HEADERS (use short, clean names).\n\
         - Remove any markdown formatting (**, ##, etc.) from values.\n\
         - If the data compares entities (e.g. companies), each entity should be its own row.\n\
         - If the data is a list of metrics, each metric should be its own row.\n\
         - Keep numbers as numbers, not strings.\n\
         - Use the conversation history (if any) to understand follow-up requests like restructuring or reformatting.\n\
         - Return ONLY the raw JSON array. No explanation, no markdown code fences.\n\n\
         {history_block}DATA:\n{rag_answer}\n\nUSER REQUEST: {query}\n\nJSON ARRAY:"
    );

    let content = rag.llm().complete_once(SMART_MODEL, &prompt).await?;
    parse_table_rows(&content)
}

/// Parse the LLM's reply into row objects, tolerating stray code fences.
pub(crate) fn parse_table_rows(content: &str) -> crate::Result<Vec<Map<String, Value>>> {
    let cleaned = strip_code_fences(content);

    let parsed: Value = serde_json::from_str(&cleaned).map_err(|e| {
        warn!("JSON parse error: {e}");
        WebRagError::Llm("Failed to structure data into table format.".to_string())
    })?;

    let rows: Vec<Map<String, Value>> = match parsed {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                _ => Err(WebRagError::Llm(
                    "Failed to structure data into table format.".to_string(),
                )),
            })
            .collect::<crate::Result<_>>()?,
        _ => {
            return Err(WebRagError::Llm(
                "Failed to structure data into table format.".to_string(),
            ));
        }
    };

    if rows.is_empty() {
        return Err(WebRagError::Llm(
            "Failed to structure data into table format.".to_string(),
        ));
    }

    Ok(rows)
}

/// Render rows into an in-memory `.xlsx` workbook, base64 encoded.
///
/// Column order follows first appearance across rows; headers are cleaned of
/// markdown bold markers. Missing cells are left blank.
pub(crate) fn build_excel_base64(rows: &[Map<String, Value>]) -> crate::Result<String> {
    let columns = column_order(rows);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name("Sheet1")
        .map_err(|e| excel_error(&e))?;

    for (col, header) in columns.iter().enumerate() {
        let clean = header.trim().trim_matches('*');
        worksheet
            .write_string(0, col as u16, clean)
            .map_err(|e| excel_error(&e))?;
    }

    for (row_index, row) in rows.iter().enumerate() {
        let excel_row = (row_index + 1) as u32;
        for (col, header) in columns.iter().enumerate() {
            let col = col as u16;
            match row.get(header) {
                Some(Value::Number(n)) => {
                    let value = n.as_f64().unwrap_or_default();
                    worksheet
                        .write_number(excel_row, col, value)
                        .map_err(|e| excel_error(&e))?;
                }
                Some(Value::String(s)) => {
                    worksheet
                        .write_string(excel_row, col, s)
                        .map_err(|e| excel_error(&e))?;
                }
                Some(Value::Bool(b)) => {
                    worksheet
                        .write_boolean(excel_row, col, *b)
                        .map_err(|e| excel_error(&e))?;
                }
                Some(Value::Null) | None => {}
                Some(other) => {
                    worksheet
                        .write_string(excel_row, col, &other.to_string())
                        .map_err(|e| excel_error(&e))?;
                }
            }
        }
    }

    let buffer = workbook.save_to_buffer().map_err(|e| excel_error(&e))?;
    Ok(BASE64.encode(buffer))
}

/// Union of row keys in first-appearance order.
fn column_order(rows: &[Map<String, Value>]) -> Vec<String> {
    rows.iter()
        .flat_map(|row| row.keys().cloned())
        .unique()
        .collect()
}

fn excel_error(e: &rust_xlsxwriter::XlsxError) -> WebRagError {
    WebRagError::Other(anyhow::anyhow!("Failed to generate Excel file: {e}"))
}
