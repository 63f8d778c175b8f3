//! Builds the unified strip-trial table.
//!
//! Rounds av2..av4 are filtered to strip tests, linked to their evaluation
//! (and through it to a farm), keyed by farm + hybrid + treatment index and
//! merged onto av4. Farm, city, state, region and technician reference data
//! are joined next, then the derived agronomic metrics are computed.

use polars::prelude::*;
use tracing::{info, warn};

use crate::config::TransformConfig;
use crate::error::Result;
use crate::frame::{
    concat_text, drop_existing, duplicate_values, first_per_value, has_column, left_merge,
    missing_columns, put_text, rename_existing, select_existing, text_values,
};
use crate::pipeline::{apply_metrics, SkipReason, TransformReport};
use crate::schema::{cidade, common, estado, fazenda, regiao, table, treatment, users};
use crate::tables::TrialTables;

/// Result of one transformation run.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    /// Merged and metric-enriched table, one row per av4 strip-test plot.
    pub treated: DataFrame,
    /// av2 round joined to its evaluation, keyed, round-identity columns dropped.
    pub av2_merged: DataFrame,
    /// av3 round, same shape as `av2_merged`.
    pub av3_merged: DataFrame,
    /// av4 round joined to its evaluation and keyed; keeps every column.
    pub av4_merged: DataFrame,
    pub report: TransformReport,
}

/// A reference table joined onto the treated frame.
struct ReferenceJoin {
    step: &'static str,
    keep: Option<&'static [&'static str]>,
    drop: &'static [&'static str],
    rename: &'static [(&'static str, &'static str)],
    on: &'static str,
    suffix: &'static str,
}

const FARM_JOIN: ReferenceJoin = ReferenceJoin {
    step: table::FAZENDA,
    keep: None,
    drop: &fazenda::DROP,
    rename: &[(common::UUID, treatment::FAZENDA_REF)],
    on: treatment::FAZENDA_REF,
    suffix: "_fazenda",
};

const CITY_JOIN: ReferenceJoin = ReferenceJoin {
    step: table::CIDADE,
    keep: None,
    drop: &cidade::DROP,
    rename: &[(common::UUID, fazenda::CIDADE_REF)],
    on: fazenda::CIDADE_REF,
    suffix: "_cidade",
};

const STATE_JOIN: ReferenceJoin = ReferenceJoin {
    step: table::ESTADO,
    keep: None,
    drop: &estado::DROP,
    rename: &[
        (common::UUID, cidade::ESTADO_REF),
        (estado::CODIGO_ESTADO, estado::ESTADO),
        (estado::NOME_ESTADO, estado::SIGLA_ESTADO),
    ],
    on: cidade::ESTADO_REF,
    suffix: "_estado",
};

const REGION_JOIN: ReferenceJoin = ReferenceJoin {
    step: table::REGIOES,
    keep: None,
    drop: &regiao::DROP,
    rename: &[],
    on: cidade::CIDADE_SIGLA_ESTADO,
    suffix: "_base_municipios",
};

const USER_JOIN: ReferenceJoin = ReferenceJoin {
    step: table::USERS,
    keep: Some(&[common::UUID, users::DISPLAY_NAME]),
    drop: &[],
    rename: &[(common::UUID, treatment::DTC_RESPONSAVEL_REF)],
    on: treatment::DTC_RESPONSAVEL_REF,
    suffix: "_user",
};

const KEY_PARTS: [&str; 3] = [
    treatment::FAZENDA_REF,
    treatment::NOME,
    treatment::INDEX_TRATAMENTO,
];

/// Stateless: the same tables always produce the same output.
#[derive(Debug, Clone, Default)]
pub struct TrialDataTransformer {
    config: TransformConfig,
}

impl TrialDataTransformer {
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    pub fn transform(&self, tables: &TrialTables) -> Result<TransformOutput> {
        let mut report = TransformReport::default();

        let evaluation = self.evaluation_link(tables.avaliacao.as_ref(), &mut report)?;

        let mut rounds = Vec::with_capacity(3);
        for (name, raw) in [
            (table::AV2_TRATAMENTO, tables.av2.as_ref()),
            (table::AV3_TRATAMENTO, tables.av3.as_ref()),
            (table::AV4_TRATAMENTO, tables.av4.as_ref()),
        ] {
            let strips = self.strip_tests(name, raw, &mut report)?;
            let merged = self.link_round(name, strips, evaluation.as_ref(), &mut report)?;
            rounds.push(merged);
        }
        let av4_merged = rounds.pop().unwrap_or_else(DataFrame::empty);
        let av3_merged = drop_existing(rounds.pop().unwrap_or_else(DataFrame::empty), &treatment::ROUND_DROP)?;
        let av2_merged = drop_existing(rounds.pop().unwrap_or_else(DataFrame::empty), &treatment::ROUND_DROP)?;

        let mut treated = self.merge_rounds(&av2_merged, &av3_merged, &av4_merged, &mut report)?;

        treated = self.join_reference(treated, tables.fazenda.as_ref(), &FARM_JOIN, &mut report)?;
        treated = self.join_reference(treated, tables.cidade.as_ref(), &CITY_JOIN, &mut report)?;
        add_city_state(&mut treated)?;
        treated = self.join_reference(treated, tables.estado.as_ref(), &STATE_JOIN, &mut report)?;
        add_city_state(&mut treated)?;
        treated = self.join_reference(treated, tables.regions.as_ref(), &REGION_JOIN, &mut report)?;
        treated = self.join_reference(treated, tables.users.as_ref(), &USER_JOIN, &mut report)?;

        apply_metrics(&mut treated, &self.config, &mut report)?;

        treated = self.drop_excluded_user(treated)?;
        uppercase(&mut treated, &[fazenda::NOME_FAZENDA, fazenda::NOME_PRODUTOR])?;

        info!(
            rows = treated.height(),
            columns = treated.width(),
            computed = report.computed.len(),
            skipped = report.skipped.len(),
            "trial table built"
        );

        Ok(TransformOutput {
            treated,
            av2_merged,
            av3_merged,
            av4_merged,
            report,
        })
    }

    // ── Rounds ──────────────────────────────────────────────────────────────

    /// `avaliacao` reduced to `avaliacaoRef` → `fazendaRef`.
    fn evaluation_link(
        &self,
        avaliacao: Option<&DataFrame>,
        report: &mut TransformReport,
    ) -> Result<Option<DataFrame>> {
        let Some(df) = avaliacao else {
            skip(report, table::AVALIACAO, SkipReason::MissingTable(table::AVALIACAO.into()));
            return Ok(None);
        };
        if df.height() == 0 {
            skip(report, table::AVALIACAO, SkipReason::EmptyInput(table::AVALIACAO.into()));
            return Ok(None);
        }
        let missing = missing_columns(df, &[common::UUID, treatment::FAZENDA_REF]);
        if !missing.is_empty() {
            skip(report, table::AVALIACAO, SkipReason::MissingColumns(missing));
            return Ok(None);
        }
        let reduced = select_existing(df, &[common::UUID, treatment::FAZENDA_REF])?;
        Ok(Some(rename_existing(
            reduced,
            &[(common::UUID, treatment::AVALIACAO_REF)],
        )?))
    }

    /// `None` when the round was skipped and already reported.
    fn strip_tests(
        &self,
        name: &str,
        raw: Option<&DataFrame>,
        report: &mut TransformReport,
    ) -> Result<Option<DataFrame>> {
        let Some(df) = raw else {
            skip(report, name, SkipReason::MissingTable(name.into()));
            return Ok(None);
        };
        if !has_column(df, treatment::TIPO_TESTE) {
            skip(
                report,
                name,
                SkipReason::MissingColumns(vec![treatment::TIPO_TESTE.into()]),
            );
            return Ok(None);
        }
        let label = self.config.strip_test_label.as_str();
        let strips = df
            .clone()
            .lazy()
            .filter(col(treatment::TIPO_TESTE).cast(DataType::String).eq(lit(label)))
            .collect()?;
        Ok(Some(strips))
    }

    /// Attach the farm reference of each plot's evaluation and build `key`.
    fn link_round(
        &self,
        name: &str,
        strips: Option<DataFrame>,
        evaluation: Option<&DataFrame>,
        report: &mut TransformReport,
    ) -> Result<DataFrame> {
        let (Some(strips), Some(evaluation)) = (strips, evaluation) else {
            return Ok(DataFrame::empty());
        };
        if strips.height() == 0 {
            skip(report, name, SkipReason::EmptyInput(name.into()));
            return Ok(DataFrame::empty());
        }
        if !has_column(&strips, treatment::AVALIACAO_REF) {
            skip(
                report,
                name,
                SkipReason::MissingColumns(vec![treatment::AVALIACAO_REF.into()]),
            );
            return Ok(DataFrame::empty());
        }

        // The evaluation's farm wins over a stale copy on the plot row.
        let mut merged = left_merge(
            strips,
            evaluation.clone(),
            treatment::AVALIACAO_REF,
            ("_tratamento", ""),
        )?;

        let missing = missing_columns(&merged, &KEY_PARTS);
        if missing.is_empty() {
            let key = concat_text(&merged, &KEY_PARTS, "_")?;
            put_text(&mut merged, treatment::KEY, &key)?;

            let duplicates = duplicate_values(&merged, treatment::KEY)?;
            if !duplicates.is_empty() {
                warn!(round = name, keys = ?duplicates, "plot key is not unique");
                report.record_duplicate_keys(name, duplicates);
            }
        } else {
            skip(report, name, SkipReason::MissingColumns(missing));
        }
        Ok(merged)
    }

    fn merge_rounds(
        &self,
        av2: &DataFrame,
        av3: &DataFrame,
        av4: &DataFrame,
        report: &mut TransformReport,
    ) -> Result<DataFrame> {
        let keyed = |df: &DataFrame| df.height() > 0 && has_column(df, treatment::KEY);

        if !keyed(av4) || !keyed(av3) {
            let culprit = if keyed(av4) {
                table::AV3_TRATAMENTO
            } else {
                table::AV4_TRATAMENTO
            };
            if !report.has_skipped_step(culprit) {
                skip(report, "merge av4+av3", SkipReason::EmptyInput(culprit.into()));
            }
            return Ok(DataFrame::empty());
        }
        // One av4 plot stays one row: later rounds contribute their first row per key.
        let av3 = first_per_value(av3, treatment::KEY)?;
        let mut treated = left_merge(av4.clone(), av3, treatment::KEY, ("_av4", "_av3"))?;

        if keyed(av2) {
            let av2 = first_per_value(av2, treatment::KEY)?;
            treated = left_merge(treated, av2, treatment::KEY, ("", "_av2"))?;
        } else if !report.has_skipped_step(table::AV2_TRATAMENTO) {
            skip(
                report,
                "merge av2",
                SkipReason::EmptyInput(table::AV2_TRATAMENTO.into()),
            );
        }
        Ok(treated)
    }

    // ── Reference data ──────────────────────────────────────────────────────

    fn join_reference(
        &self,
        treated: DataFrame,
        reference: Option<&DataFrame>,
        join: &ReferenceJoin,
        report: &mut TransformReport,
    ) -> Result<DataFrame> {
        if treated.height() == 0 {
            return Ok(treated);
        }
        let Some(reference) = reference else {
            skip(report, join.step, SkipReason::MissingTable(join.step.into()));
            return Ok(treated);
        };
        if reference.height() == 0 {
            skip(report, join.step, SkipReason::EmptyInput(join.step.into()));
            return Ok(treated);
        }

        let mut reference = match join.keep {
            Some(keep) => select_existing(reference, keep)?,
            None => reference.clone(),
        };
        reference = drop_existing(reference, join.drop)?;
        reference = rename_existing(reference, join.rename)?;

        let mut missing = missing_columns(&treated, &[join.on]);
        missing.extend(missing_columns(&reference, &[join.on]));
        if !missing.is_empty() {
            skip(report, join.step, SkipReason::MissingColumns(missing));
            return Ok(treated);
        }

        left_merge(treated, reference, join.on, ("", join.suffix))
    }

    // ── Business filters ────────────────────────────────────────────────────

    fn drop_excluded_user(&self, treated: DataFrame) -> Result<DataFrame> {
        if !has_column(&treated, users::DISPLAY_NAME) {
            return Ok(treated);
        }
        let name = col(users::DISPLAY_NAME).cast(DataType::String);
        let excluded = self.config.excluded_user.as_str();
        Ok(treated
            .lazy()
            .filter(name.clone().is_null().or(name.neq(lit(excluded))))
            .collect()?)
    }
}

fn skip(report: &mut TransformReport, step: &str, reason: SkipReason) {
    warn!(step, ?reason, "transform step skipped");
    report.skip_step(step, reason);
}

/// `nomeCidade + "_" + siglaEstado`, the key of the region lookup.
fn add_city_state(df: &mut DataFrame) -> Result<()> {
    let parts = [cidade::NOME_CIDADE, estado::SIGLA_ESTADO];
    if df.height() == 0 || !missing_columns(df, &parts).is_empty() {
        return Ok(());
    }
    let values = concat_text(df, &parts, "_")?;
    put_text(df, cidade::CIDADE_SIGLA_ESTADO, &values)
}

fn uppercase(df: &mut DataFrame, columns: &[&str]) -> Result<()> {
    for &name in columns {
        if !has_column(df, name) {
            continue;
        }
        let values: Vec<Option<String>> = text_values(df, name)?
            .into_iter()
            .map(|v| v.map(|s| s.to_uppercase()))
            .collect();
        put_text(df, name, &values)?;
    }
    Ok(())
}
