//! Amount Threshold Node
//!
//! Flags records whose amount field crosses a threshold. Input is a
//! `records` value: `{"type": "records", "rows": [{...}, ...]}`. Output is a
//! `risk_set`: `{"type": "risk_set", "rule": ..., "count": n, "items": [...]}`.

use std::sync::Arc;

use async_trait::async_trait;
use auditflow_engine::{
    ConfigField, DataType, ExecutionContext, FieldKind, Manifest, NodeCategory, NodeError,
    NodeInputs, NodeOutputs, Port, TypedNode, TypedRuntime,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Rows scanned between progress reports
const PROGRESS_CHUNK: usize = 500;

/// Which side of the threshold is flagged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    #[default]
    Above,
    Below,
}

impl ThresholdMode {
    fn flags(&self, amount: f64, threshold: f64) -> bool {
        match self {
            ThresholdMode::Above => amount > threshold,
            ThresholdMode::Below => amount < threshold,
        }
    }
}

/// Configuration for the threshold detector
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_field")]
    pub field: String,
    pub threshold: f64,
    #[serde(default)]
    pub mode: ThresholdMode,
}

fn default_field() -> String {
    "amount".to_string()
}

/// Audit detector over imported records
///
/// # Inputs
/// - `records` (required) - Tagged `records` value
///
/// # Config
/// - `field` - Row key holding the amount (default `amount`)
/// - `threshold` (required) - Boundary value
/// - `mode` - `above` or `below` (default `above`)
///
/// # Outputs
/// - `findings` - `risk_set` of flagged rows with their row index
///
/// Rows without a numeric amount are skipped and counted in `skipped`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmountThresholdNode;

impl AmountThresholdNode {
    pub const NODE_TYPE: &'static str = "amount-threshold";
    pub const PORT_RECORDS: &'static str = "records";
    pub const PORT_FINDINGS: &'static str = "findings";
}

#[async_trait]
impl TypedNode for AmountThresholdNode {
    type Config = ThresholdConfig;

    fn manifest(&self) -> Manifest {
        Manifest::new(Self::NODE_TYPE, "1.0.0", NodeCategory::Audit)
            .label("Amount Threshold")
            .description("Flags records whose amount crosses a threshold")
            .input(Port::required(Self::PORT_RECORDS, DataType::Records))
            .output(Port::optional(Self::PORT_FINDINGS, DataType::RiskSet))
            .config_field(ConfigField::new("field", FieldKind::String).with_default(json!("amount")))
            .config_field(ConfigField::new("threshold", FieldKind::Number).required())
            .config_field(
                ConfigField::new("mode", FieldKind::Select)
                    .with_options([json!("above"), json!("below")])
                    .with_default(json!("above")),
            )
            .cacheable()
            .parallel()
    }

    async fn run(
        &self,
        inputs: &NodeInputs,
        config: ThresholdConfig,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutputs, NodeError> {
        let rows = inputs
            .get(Self::PORT_RECORDS)
            .and_then(|records| records.get("rows"))
            .and_then(Value::as_array)
            .ok_or_else(|| NodeError::failed("records value has no 'rows' array"))?;

        let log = ctx.logger();
        log.debug(format!(
            "Scanning {} rows for {} {:?} {}",
            rows.len(),
            config.field,
            config.mode,
            config.threshold
        ));

        let mut items = Vec::new();
        let mut skipped = 0usize;
        for (index, row) in rows.iter().enumerate() {
            if index > 0 && index % PROGRESS_CHUNK == 0 {
                ctx.report_progress(
                    index as f32 * 100.0 / rows.len() as f32,
                    Some(format!("{} of {} rows", index, rows.len())),
                );
                tokio::task::yield_now().await;
            }

            let Some(amount) = row.get(&config.field).and_then(Value::as_f64) else {
                skipped += 1;
                continue;
            };
            if config.mode.flags(amount, config.threshold) {
                items.push(json!({ "index": index, "amount": amount, "row": row }));
            }
        }

        if skipped > 0 {
            log.warn(format!("{} rows had no numeric '{}'", skipped, config.field));
        }
        log.info(format!("{} of {} rows flagged", items.len(), rows.len()));

        let findings = json!({
            "type": DataType::RiskSet.name(),
            "rule": format!("{} {:?} {}", config.field, config.mode, config.threshold).to_lowercase(),
            "count": items.len(),
            "skipped": skipped,
            "items": items,
        });
        Ok(NodeOutputs::from([(Self::PORT_FINDINGS.to_string(), findings)]))
    }
}

inventory::submit!(auditflow_engine::BuiltinNode(|| Arc::new(TypedRuntime(AmountThresholdNode))));
