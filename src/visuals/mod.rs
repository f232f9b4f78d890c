#[cfg(test)]
mod tests;

use anyhow::anyhow;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use plotters::element::Pie;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::WebRagError;
use crate::llm::{ChatTurn, SMART_MODEL, format_history, strip_code_fences};
use crate::rag::RagService;

const INTENT_LABEL: &str = "viz";
const INTENT_DESCRIPTION: &str = "a chart/visualization/graph";

const CHART_WIDTH: u32 = 1200;
const CHART_HEIGHT: u32 = 700;

/// Fixed palette for series colors.
const PALETTE: [RGBColor; 8] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
];

/// Outcome of a visualization request.
#[derive(Debug, Clone)]
pub enum VisualOutcome {
    Chat {
        message: String,
    },
    Visual {
        message: String,
        task: String,
        visualization_type: String,
        /// Base64-encoded PNG images.
        images: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
}

impl ChartKind {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Bar => "Bar Chart",
            Self::Line => "Line Chart",
            Self::Pie => "Pie Chart",
        }
    }
}

/// Declarative chart description produced by the LLM.
///
/// The model never emits code; it only fills in this structure, and a fixed
/// renderer turns it into an image. Anything the renderer does not support
/// simply cannot be expressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(default = "default_task")]
    pub task: String,
    pub kind: ChartKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub x_label: String,
    #[serde(default)]
    pub y_label: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

fn default_task() -> String {
    "Visualization".to_string()
}

impl ChartSpec {
    fn validate(&self) -> crate::Result<()> {
        if self.labels.is_empty() {
            return Err(spec_error("chart has no data points"));
        }
        if self.labels.len() != self.values.len() {
            return Err(spec_error("labels and values have different lengths"));
        }
        if self.values.iter().any(|v| !v.is_finite()) {
            return Err(spec_error("chart values must be finite numbers"));
        }
        if self.kind == ChartKind::Pie && self.values.iter().any(|v| *v <= 0.0) {
            return Err(spec_error("pie chart values must be positive"));
        }
        Ok(())
    }
}

/// Handle a visualization request against an analysis index.
///
/// Chat-intent messages are routed to the regular question path. Chart-intent
/// messages retrieve an answer from the index, have the LLM describe a chart
/// of it as a [`ChartSpec`], and render that spec to a base64 PNG.
pub async fn create_visuals(
    rag: &RagService,
    index_name: &str,
    query: &str,
    history: &[ChatTurn],
) -> crate::Result<VisualOutcome> {
    let intent = rag
        .llm()
        .classify_intent(query, history, INTENT_LABEL, INTENT_DESCRIPTION)
        .await;
    info!("Viz intent classified as: {intent}");

    if intent != INTENT_LABEL {
        let message = rag.ask(index_name, query, history).await?;
        return Ok(VisualOutcome::Chat { message });
    }

    let rag_answer = rag.ask(index_name, query, &[]).await?;

    let spec = generate_chart_spec(rag, query, &rag_answer, history).await?;
    spec.validate()?;
    info!(
        "Rendering {} with {} data points",
        spec.kind.display_name(),
        spec.values.len()
    );

    // Rendering is CPU-bound; keep it off the async workers.
    let render_spec = spec.clone();
    let png = tokio::task::spawn_blocking(move || render_chart_png(&render_spec))
        .await
        .map_err(|e| WebRagError::Other(anyhow!("Chart rendering task panicked: {e}")))??;

    Ok(VisualOutcome::Visual {
        message: format!("Generated {}: {}", spec.kind.display_name(), spec.task),
        task: spec.task,
        visualization_type: spec.kind.display_name().to_string(),
        images: vec![BASE64.encode(png)],
    })
}

/// Ask the LLM for a chart description of the retrieved data.
async fn generate_chart_spec(
    rag: &RagService,
    query: &str,
    rag_answer: &str,
    history: &[ChatTurn],
) -> crate::Result<ChartSpec> {
    let history_block = format_history(history);
    let prompt = format!(
        "You are a Data Visualization Assistant.\n\n\
         STRICT RULES. FOLLOW EVERY SINGLE ONE:\n\
         1. Extract data values EXACTLY as they appear in the DATA section below. \
         DO NOT invent, estimate, or hallucinate any numbers. \
         If DATA says 'Market Cap: 3.94T', use 3.94 (in Trillions). If it says '226.5B', use 226.5 (in Billions).\n\
         2. Keep the UNIT consistent across all values. Convert all to the same unit \
         (e.g., all in Trillions or all in Billions). Put the unit in the axis label (e.g., 'Market Cap (T)').\n\
         3. If the user's follow-up request asks to change the chart (e.g., scale, style, type), \
         apply the change to the SAME data from the DATA section. Do NOT re-extract or guess new numbers.\n\n\
         Return ONLY a valid JSON object with this structure:\n\
         {{\n\
           \"task\": \"Short description of what is being visualized\",\n\
           \"kind\": \"bar\" | \"line\" | \"pie\",\n\
           \"title\": \"Chart title\",\n\
           \"x_label\": \"X axis label\",\n\
           \"y_label\": \"Y axis label (include the unit)\",\n\
           \"labels\": [\"one label per data point\"],\n\
           \"values\": [1.0]\n\
         }}\n\n\
         {history_block}DATA:\n{rag_answer}\n\nUSER REQUEST: {query}\nJSON OUTPUT:"
    );

    let content = rag.llm().complete_once(SMART_MODEL, &prompt).await?;
    parse_chart_spec(&content)
}

pub(crate) fn parse_chart_spec(content: &str) -> crate::Result<ChartSpec> {
    let cleaned = strip_code_fences(content);
    serde_json::from_str(&cleaned).map_err(|e| {
        warn!("Chart spec parse error: {e}");
        spec_error("reply was not a valid chart specification")
    })
}

/// Render a chart spec to PNG bytes.
pub(crate) fn render_chart_png(spec: &ChartSpec) -> crate::Result<Vec<u8>> {
    let mut buffer = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (CHART_WIDTH, CHART_HEIGHT))
            .into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        match spec.kind {
            ChartKind::Bar => draw_bar_chart(&root, spec)?,
            ChartKind::Line => draw_line_chart(&root, spec)?,
            ChartKind::Pie => draw_pie_chart(&root, spec)?,
        }

        root.present().map_err(render_error)?;
    }

    let img = image::RgbImage::from_raw(CHART_WIDTH, CHART_HEIGHT, buffer)
        .ok_or_else(|| WebRagError::Other(anyhow!("Rendered buffer has the wrong size")))?;
    let mut png = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut png),
        image::ImageFormat::Png,
    )
    .map_err(|e| WebRagError::Other(anyhow!("Failed to encode chart as PNG: {e}")))?;

    Ok(png)
}

type Root<'a> = DrawingArea<BitMapBackend<'a>, plotters::coord::Shift>;

fn draw_bar_chart(root: &Root<'_>, spec: &ChartSpec) -> crate::Result<()> {
    let (y_min, y_max) = y_range(&spec.values);
    let n = spec.labels.len();

    let mut chart = ChartBuilder::on(root)
        .caption(&spec.title, ("sans-serif", 30))
        .margin(20)
        .x_label_area_size(70)
        .y_label_area_size(80)
        .build_cartesian_2d((0..n).into_segmented(), y_min..y_max)
        .map_err(render_error)?;

    let labels = &spec.labels;
    chart
        .configure_mesh()
        .x_desc(&spec.x_label)
        .y_desc(&spec.y_label)
        .x_labels(n)
        .x_label_formatter(&|segment| match segment {
            SegmentValue::CenterOf(i) => labels.get(*i).cloned().unwrap_or_default(),
            _ => String::new(),
        })
        .draw()
        .map_err(render_error)?;

    chart
        .draw_series(spec.values.iter().enumerate().map(|(i, value)| {
            Rectangle::new(
                [
                    (SegmentValue::Exact(i), 0.0),
                    (SegmentValue::Exact(i + 1), *value),
                ],
                PALETTE[i % PALETTE.len()].filled(),
            )
        }))
        .map_err(render_error)?;

    Ok(())
}

fn draw_line_chart(root: &Root<'_>, spec: &ChartSpec) -> crate::Result<()> {
    let (y_min, y_max) = y_range(&spec.values);
    let n = spec.labels.len();
    let x_max = (n.saturating_sub(1)).max(1) as f64;

    let mut chart = ChartBuilder::on(root)
        .caption(&spec.title, ("sans-serif", 30))
        .margin(20)
        .x_label_area_size(70)
        .y_label_area_size(80)
        .build_cartesian_2d(0f64..x_max, y_min..y_max)
        .map_err(render_error)?;

    let labels = &spec.labels;
    chart
        .configure_mesh()
        .x_desc(&spec.x_label)
        .y_desc(&spec.y_label)
        .x_labels(n)
        .x_label_formatter(&|x| {
            let i = x.round() as usize;
            labels.get(i).cloned().unwrap_or_default()
        })
        .draw()
        .map_err(render_error)?;

    let color = PALETTE[0];
    chart
        .draw_series(LineSeries::new(
            spec.values
                .iter()
                .enumerate()
                .map(|(i, value)| (i as f64, *value)),
            color.stroke_width(3),
        ))
        .map_err(render_error)?;

    chart
        .draw_series(
            spec.values
                .iter()
                .enumerate()
                .map(|(i, value)| Circle::new((i as f64, *value), 4, color.filled())),
        )
        .map_err(render_error)?;

    Ok(())
}

fn draw_pie_chart(root: &Root<'_>, spec: &ChartSpec) -> crate::Result<()> {
    let area = root
        .titled(&spec.title, ("sans-serif", 30))
        .map_err(render_error)?;

    let colors: Vec<RGBColor> = (0..spec.values.len())
        .map(|i| PALETTE[i % PALETTE.len()])
        .collect();
    let center = (
        (CHART_WIDTH / 2) as i32,
        (CHART_HEIGHT / 2) as i32,
    );
    let radius = f64::from(CHART_HEIGHT) * 0.35;

    let mut pie = Pie::new(&center, &radius, &spec.values, &colors, &spec.labels);
    pie.label_style(("sans-serif", 20).into_font());

    area.draw(&pie).map_err(render_error)?;
    Ok(())
}

/// Y axis bounds with 10% headroom; always spans zero.
fn y_range(values: &[f64]) -> (f64, f64) {
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    let min = values.iter().copied().fold(f64::MAX, f64::min);

    let y_max = if max > 0.0 { max * 1.1 } else { 1.0 };
    let y_min = if min < 0.0 { min * 1.1 } else { 0.0 };
    (y_min, y_max)
}

fn spec_error(detail: &str) -> WebRagError {
    WebRagError::Llm(format!("Failed to generate a valid chart specification: {detail}"))
}

fn render_error<E: std::fmt::Display>(e: E) -> WebRagError {
    WebRagError::Other(anyhow!("Failed to render chart: {e}"))
}
