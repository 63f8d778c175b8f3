//! Derived-metric stages applied to the merged trial table.
//!
//! Each stage names its output, its input columns and a pure formula from
//! [`crate::metrics`]. A stage whose inputs are absent is skipped and
//! recorded in the [`TransformReport`]; stages run in declaration order so
//! later stages can read earlier outputs.

use polars::prelude::*;
use tracing::debug;

use crate::config::TransformConfig;
use crate::error::Result;
use crate::frame::{f64_values, missing_columns, put_f64, put_i64, put_text, text_values};
use crate::metrics;
use crate::schema::{derived, replicate, treatment};

// ── Report ──────────────────────────────────────────────────────────────────

/// Why a join or filter step did not run.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    MissingTable(String),
    EmptyInput(String),
    MissingColumns(Vec<String>),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingTable(t) => write!(f, "table '{t}' not provided"),
            SkipReason::EmptyInput(t) => write!(f, "'{t}' has no rows"),
            SkipReason::MissingColumns(cols) => write!(f, "missing columns: {}", cols.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedStep {
    pub step: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedMetric {
    pub metric: String,
    pub missing: Vec<String>,
}

/// Plot keys that occur on more than one strip-test row of a round.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateKeys {
    pub round: String,
    pub keys: Vec<String>,
}

/// What the transformer did and did not manage to compute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformReport {
    pub computed: Vec<String>,
    pub skipped: Vec<SkippedMetric>,
    pub skipped_steps: Vec<SkippedStep>,
    pub duplicate_keys: Vec<DuplicateKeys>,
}

impl TransformReport {
    pub fn skip_step(&mut self, step: &str, reason: SkipReason) {
        self.skipped_steps.push(SkippedStep {
            step: step.to_string(),
            reason,
        });
    }

    pub fn has_skipped_step(&self, step: &str) -> bool {
        self.skipped_steps.iter().any(|s| s.step == step)
    }

    pub fn record_duplicate_keys(&mut self, round: &str, keys: Vec<String>) {
        self.duplicate_keys.push(DuplicateKeys {
            round: round.to_string(),
            keys,
        });
    }

    pub fn is_computed(&self, metric: &str) -> bool {
        self.computed.iter().any(|m| m == metric)
    }

    pub fn is_skipped(&self, metric: &str) -> bool {
        self.skipped.iter().any(|m| m.metric == metric)
    }
}

// ── Stage definitions ───────────────────────────────────────────────────────

type NumericFormula = fn(&[Option<f64>], &TransformConfig) -> Option<f64>;

enum Stage {
    /// Float output from float inputs.
    Numeric {
        output: &'static str,
        inputs: Vec<String>,
        formula: NumericFormula,
    },
    /// `dd/mm/yyyy` text from a unix-seconds column.
    Date { output: &'static str, input: &'static str },
    /// Day count between two `dd/mm/yyyy` columns.
    DayCount {
        output: &'static str,
        end: &'static str,
        start: &'static str,
    },
}

impl Stage {
    fn numeric(output: &'static str, inputs: &[&str], formula: NumericFormula) -> Self {
        Stage::Numeric {
            output,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            formula,
        }
    }

    fn output(&self) -> &'static str {
        match self {
            Stage::Numeric { output, .. } | Stage::Date { output, .. } | Stage::DayCount { output, .. } => *output,
        }
    }

    fn inputs(&self) -> Vec<&str> {
        match self {
            Stage::Numeric { inputs, .. } => inputs.iter().map(String::as_str).collect(),
            Stage::Date { input, .. } => vec![*input],
            Stage::DayCount { end, start, .. } => vec![*end, *start],
        }
    }
}

fn replicate_stages() -> Vec<Stage> {
    replicate::GROUPS
        .iter()
        .map(|&(output, suffix)| Stage::Numeric {
            output,
            inputs: replicate::columns(suffix),
            formula: |v, _| metrics::replicate_mean(v),
        })
        .collect()
}

fn loss_stage(output: &'static str, count: &'static str) -> Stage {
    Stage::numeric(output, &[count, derived::MEDIA_NUM_PLANTAS_10M], |v, _| {
        Some(metrics::loss_percentage(v[0], v[1]))
    })
}

fn derived_stages() -> Vec<Stage> {
    use derived::*;
    use treatment::*;

    vec![
        Stage::numeric(CORR_PMG, &[MEDIA_PMG, MEDIA_UMD_PMG], |v, cfg| {
            metrics::corrected_kernel_weight(v[0], v[1], cfg.standard_moisture)
        }),
        Stage::numeric(
            AREA_PARCELA_M2,
            &[NUMERO_LINHAS, COMPRIMENTO_LINHA, ESPACAMENTO],
            |v, _| metrics::plot_area(v[0], v[1], v[2]),
        ),
        Stage::numeric(PROD_KG_HA, &[PESO_PARCELA, AREA_PARCELA_M2], |v, _| {
            metrics::yield_kg_ha(v[0], v[1])
        }),
        Stage::numeric(PROD_KG_HA_CORR, &[PROD_KG_HA, HUMIDADE], |v, cfg| {
            metrics::moisture_corrected_yield(v[0], v[1], cfg.standard_moisture)
        }),
        Stage::numeric(PROD_SC_HA_CORR, &[PROD_KG_HA_CORR], |v, cfg| {
            metrics::sacks_per_ha(v[0], cfg.sack_weight_kg)
        }),
        Stage::numeric(NUM_PLANTAS_HA, &[MEDIA_NUM_PLANTAS_10M, ESPACAMENTO], |v, _| {
            metrics::stand_density(v[0], v[1])
        }),
        loss_stage(PERC_ACAMADAS, MEDIA_ACAMADAS),
        loss_stage(PERC_QUEBRADAS, MEDIA_QUEBRADAS),
        loss_stage(PERC_DOMINADAS, MEDIA_DOMINADAS),
        loss_stage(PERC_COLMO_PODRE, MEDIA_COLMO_PODRE),
        Stage::numeric(PERC_TOTAL, &LOSS_PARTS, |v, _| Some(metrics::total_loss(v))),
        Stage::numeric(MEDIA_ALT_M, &[MEDIA_ALT], |v, cfg| {
            metrics::height_to_meters(v[0], cfg.height_cm_threshold)
        }),
        Stage::numeric(MEDIA_AIE_M, &[MEDIA_AIE], |v, cfg| {
            metrics::height_to_meters(v[0], cfg.height_cm_threshold)
        }),
        Stage::Date { output: PLANTIO, input: DATA_PLANTIO },
        Stage::Date { output: COLHEITA, input: DATA_COLHEITA },
        Stage::Date { output: DATA_FLOR_FEM, input: DATA_FLOR_FEMININA },
        Stage::Date { output: DATA_FLOR_MASC, input: DATA_FLOR_MASCULINA },
        Stage::DayCount { output: CICLO_DIAS, end: COLHEITA, start: PLANTIO },
        Stage::DayCount { output: FLOR_FEM_DIAS, end: DATA_FLOR_FEM, start: PLANTIO },
        Stage::DayCount { output: FLOR_MASC_DIAS, end: DATA_FLOR_MASC, start: PLANTIO },
    ]
}

// ── Execution ───────────────────────────────────────────────────────────────

/// Run every replicate-mean and derived-metric stage over `df` in place.
pub fn apply_metrics(df: &mut DataFrame, config: &TransformConfig, report: &mut TransformReport) -> Result<()> {
    let stages = replicate_stages().into_iter().chain(derived_stages());

    for stage in stages {
        let missing = missing_columns(df, &stage.inputs());
        if !missing.is_empty() {
            debug!(metric = stage.output(), ?missing, "skipping metric");
            report.skipped.push(SkippedMetric {
                metric: stage.output().to_string(),
                missing,
            });
            continue;
        }
        run_stage(df, &stage, config)?;
        report.computed.push(stage.output().to_string());
    }
    Ok(())
}

fn run_stage(df: &mut DataFrame, stage: &Stage, config: &TransformConfig) -> Result<()> {
    match stage {
        Stage::Numeric { output, inputs, formula } => {
            let columns = inputs
                .iter()
                .map(|c| f64_values(df, c))
                .collect::<Result<Vec<_>>>()?;
            let mut row = vec![None; columns.len()];
            let values: Vec<Option<f64>> = (0..df.height())
                .map(|i| {
                    for (slot, column) in row.iter_mut().zip(&columns) {
                        *slot = column[i];
                    }
                    formula(&row, config)
                })
                .collect();
            put_f64(df, output, &values)
        }
        Stage::Date { output, input } => {
            let values: Vec<Option<String>> = f64_values(df, input)?
                .into_iter()
                .map(|secs| Some(metrics::timestamp_to_br_date(secs)))
                .collect();
            put_text(df, output, &values)
        }
        Stage::DayCount { output, end, start } => {
            let end = text_values(df, end)?;
            let start = text_values(df, start)?;
            let values: Vec<Option<i64>> = end
                .iter()
                .zip(&start)
                .map(|(e, s)| metrics::days_between(e.as_deref(), s.as_deref()))
                .collect();
            put_i64(df, output, &values)
        }
    }
}
