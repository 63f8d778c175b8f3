//! Cross-farm analyses over the treated trial table: joint means per
//! treatment pair, environmental index, response ranking, disease summary
//! and head-to-head comparison of two hybrids.

use std::collections::BTreeMap;

use polars::prelude::*;
use tracing::debug;

use crate::error::{Result, TrialError};
use crate::frame::{
    cast_f64, f64_values, has_column, numeric_columns, put_f64, put_i64, require_columns,
    text_values,
};
use crate::schema::{analysis, derived, disease, fazenda, treatment};

// ── Treatment pairing ───────────────────────────────────────────────────────

/// How the second planting of a hybrid maps onto its first.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PairingRule {
    /// 201..=221 pair with index - 100.
    #[default]
    Offset,
    /// Explicit `(index, grouped)` pairs; unlisted indices stay as they are.
    Table(Vec<(i64, i64)>),
}

impl PairingRule {
    /// The pairing used by the joint analysis page: 208 has no second
    /// planting and 219 is grouped with it.
    pub fn joint_table() -> Self {
        let mut pairs: Vec<(i64, i64)> = (201..=221)
            .filter(|idx| *idx != 208 && *idx != 219)
            .map(|idx| (idx, idx - 100))
            .collect();
        pairs.push((219, 208));
        PairingRule::Table(pairs)
    }

    pub fn pair(&self, index: i64) -> i64 {
        match self {
            PairingRule::Offset if (201..=221).contains(&index) => index - 100,
            PairingRule::Offset => index,
            PairingRule::Table(pairs) => pairs
                .iter()
                .find(|(from, _)| *from == index)
                .map(|(_, to)| *to)
                .unwrap_or(index),
        }
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Row indices per group key, keys sorted; rows with a missing key are left out.
fn groups(keys: &[Option<String>]) -> BTreeMap<&str, Vec<usize>> {
    let mut out: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, key) in keys.iter().enumerate() {
        if let Some(k) = key {
            out.entry(k.as_str()).or_default().push(i);
        }
    }
    out
}

// ── Joint analysis ──────────────────────────────────────────────────────────

/// Mean of every numeric column per farm and grouped treatment index.
///
/// Zeros count as missing before averaging. `nome` and `nomeFazenda` take
/// the first non-missing value of the group. Groups keep first-seen order.
pub fn joint_analysis(df: &DataFrame, rule: &PairingRule) -> Result<DataFrame> {
    require_columns(df, &[treatment::FAZENDA_REF, treatment::INDEX_TRATAMENTO])?;

    let mut df = df.clone();
    let grouped: Vec<Option<i64>> = f64_values(&df, treatment::INDEX_TRATAMENTO)?
        .into_iter()
        .map(|v| v.map(|x| rule.pair(x.round() as i64)))
        .collect();
    put_i64(&mut df, analysis::INDEX_AGRUPADO, &grouped)?;

    let numeric = numeric_columns(
        &df,
        &[
            treatment::FAZENDA_REF,
            treatment::INDEX_TRATAMENTO,
            analysis::INDEX_AGRUPADO,
        ],
    );
    let zero_as_null: Vec<Expr> = numeric
        .iter()
        .map(|c| {
            let v = col(c.as_str()).cast(DataType::Float64);
            when(v.clone().eq(lit(0.0)))
                .then(lit(NULL).cast(DataType::Float64))
                .otherwise(v)
                .alias(c.as_str())
        })
        .collect();

    let mut aggs: Vec<Expr> = numeric.iter().map(|c| col(c.as_str()).mean()).collect();
    for name in [treatment::NOME, fazenda::NOME_FAZENDA] {
        if has_column(&df, name) {
            aggs.push(col(name).drop_nulls().first());
        }
    }

    let joint = df
        .lazy()
        .with_column(col(treatment::FAZENDA_REF).cast(DataType::String))
        .with_columns(zero_as_null)
        .filter(
            col(treatment::FAZENDA_REF)
                .is_not_null()
                .and(col(analysis::INDEX_AGRUPADO).is_not_null()),
        )
        .group_by_stable([col(treatment::FAZENDA_REF), col(analysis::INDEX_AGRUPADO)])
        .agg(aggs)
        .collect()?;

    debug!(rows = joint.height(), numeric = numeric.len(), "joint analysis");
    Ok(joint)
}

// ── Environmental index ─────────────────────────────────────────────────────

/// Add `media_local_sc_ha`: mean corrected yield of the row's farm.
pub fn environmental_index(df: &DataFrame) -> Result<DataFrame> {
    require_columns(df, &[treatment::FAZENDA_REF, derived::PROD_SC_HA_CORR])?;

    let mut df = df.clone();
    cast_f64(&mut df, &[derived::PROD_SC_HA_CORR])?;
    Ok(df
        .lazy()
        .with_column(
            col(derived::PROD_SC_HA_CORR)
                .mean()
                .over([col(treatment::FAZENDA_REF)])
                .alias(analysis::MEDIA_LOCAL_SC_HA),
        )
        .collect()?)
}

// ── Response ranking ────────────────────────────────────────────────────────

/// Per farm: best yield, gap to it, relative yield (%, one decimal) and a
/// descending rank on the relative yield. Ties share the lowest rank;
/// rows without a yield are unranked.
pub fn response_ranking(df: &DataFrame) -> Result<DataFrame> {
    require_columns(df, &[treatment::FAZENDA_REF, derived::PROD_SC_HA_CORR])?;

    let farms = text_values(df, treatment::FAZENDA_REF)?;
    let prods = f64_values(df, derived::PROD_SC_HA_CORR)?;
    let n = df.height();

    let mut max_prod = vec![None; n];
    let mut diff = vec![None; n];
    let mut rel = vec![None; n];
    let mut rank = vec![None; n];

    for rows in groups(&farms).values() {
        let best = rows
            .iter()
            .filter_map(|&i| prods[i])
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))));

        for &i in rows {
            max_prod[i] = best;
            diff[i] = best.zip(prods[i]).map(|(m, p)| m - p);
            rel[i] = best
                .filter(|m| *m != 0.0)
                .zip(prods[i])
                .map(|(m, p)| round1(p / m * 100.0));
        }
        for &i in rows {
            rank[i] = rel[i].map(|r| {
                let above = rows
                    .iter()
                    .filter(|&&j| rel[j].is_some_and(|other| other > r))
                    .count();
                above as i64 + 1
            });
        }
    }

    let mut out = df.clone();
    put_f64(&mut out, analysis::PROD_MAX_FAZENDA, &max_prod)?;
    put_f64(&mut out, analysis::DIFF_TO_MAX, &diff)?;
    put_f64(&mut out, analysis::PROD_REL_PCT, &rel)?;
    put_i64(&mut out, analysis::RANKING, &rank)?;
    Ok(out)
}

// ── Disease summary ─────────────────────────────────────────────────────────

/// Per hybrid, sorted by name: mean, min and max of each disease score
/// present, then the share of scores below the incidence threshold.
pub fn disease_summary(df: &DataFrame) -> Result<DataFrame> {
    require_columns(df, &[treatment::NOME])?;

    let names = text_values(df, treatment::NOME)?;
    let by_name = groups(&names);
    let present: Vec<&str> = disease::ALL
        .iter()
        .copied()
        .filter(|c| has_column(df, c))
        .collect();

    let hybrids: Vec<&str> = by_name.keys().copied().collect();
    let mut out = DataFrame::new(vec![Column::new(treatment::NOME.into(), &hybrids)])?;

    let scores = present
        .iter()
        .map(|c| f64_values(df, c))
        .collect::<Result<Vec<_>>>()?;
    let per_group = |values: &[Option<f64>], rows: &[usize]| -> Vec<f64> {
        rows.iter().filter_map(|&i| values[i]).collect()
    };

    type Stat = fn(&[f64]) -> Option<f64>;
    let stats: [(&str, Stat); 3] = [
        ("mean", mean),
        ("min", |v| v.iter().copied().reduce(f64::min)),
        ("max", |v| v.iter().copied().reduce(f64::max)),
    ];
    for (suffix, stat) in stats {
        for (column, values) in present.iter().zip(&scores) {
            let col_values: Vec<Option<f64>> = by_name
                .values()
                .map(|rows| stat(&per_group(values, rows)))
                .collect();
            put_f64(&mut out, &format!("{column}_{suffix}"), &col_values)?;
        }
    }

    for (column, values) in present.iter().zip(&scores) {
        let incidence: Vec<Option<f64>> = by_name
            .values()
            .map(|rows| {
                let observed = per_group(values, rows);
                if observed.is_empty() {
                    return Some(0.0);
                }
                let below = observed
                    .iter()
                    .filter(|v| **v < disease::INCIDENCE_BELOW)
                    .count();
                Some(below as f64 / observed.len() as f64 * 100.0)
            })
            .collect();
        put_f64(&mut out, &format!("{column}_inc_per"), &incidence)?;
    }

    Ok(out)
}

// ── Head to head ────────────────────────────────────────────────────────────

/// Margin (sc/ha) within which a comparison is a tie.
pub const TIE_MARGIN: f64 = 1.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct H2hSummary {
    pub wins: usize,
    pub ties: usize,
    pub losses: usize,
    /// Largest winning margin, 0 without wins.
    pub max_win: f64,
    pub mean_win: f64,
    /// Largest losing margin (most negative), 0 without losses.
    pub min_loss: f64,
    pub mean_loss: f64,
}

impl H2hSummary {
    pub fn from_diffs(diffs: &[Option<f64>]) -> Self {
        let observed: Vec<f64> = diffs.iter().flatten().copied().collect();
        let wins: Vec<f64> = observed.iter().copied().filter(|d| *d > TIE_MARGIN).collect();
        let losses: Vec<f64> = observed.iter().copied().filter(|d| *d < -TIE_MARGIN).collect();

        Self {
            wins: wins.len(),
            ties: observed.len() - wins.len() - losses.len(),
            losses: losses.len(),
            max_win: wins.iter().copied().reduce(f64::max).unwrap_or(0.0),
            mean_win: mean(&wins).unwrap_or(0.0),
            min_loss: losses.iter().copied().reduce(f64::min).unwrap_or(0.0),
            mean_loss: mean(&losses).unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeadToHead {
    /// One row per farm where both hybrids were planted, sorted by farm.
    pub locations: DataFrame,
    pub summary: H2hSummary,
}

/// Compare `head` against `check` on every farm where both appear.
///
/// Plots are first averaged per farm and treatment index; the first plot
/// of each hybrid on a farm is compared. The difference is rounded to one
/// decimal before it is bucketed.
pub fn head_to_head(df: &DataFrame, head: &str, check: &str) -> Result<HeadToHead> {
    if head == check {
        return Err(TrialError::InvalidData(format!(
            "head and check must differ, both are '{head}'"
        )));
    }
    require_columns(
        df,
        &[
            treatment::FAZENDA_REF,
            treatment::INDEX_TRATAMENTO,
            treatment::NOME,
            derived::PROD_SC_HA_CORR,
        ],
    )?;

    let plots = plot_means(df)?;
    let farms = text_values(&plots, treatment::FAZENDA_REF)?;
    let names = text_values(&plots, treatment::NOME)?;
    let prods = f64_values(&plots, derived::PROD_SC_HA_CORR)?;
    let pops = optional_f64(&plots, derived::NUM_PLANTAS_HA)?;
    let umds = optional_f64(&plots, treatment::HUMIDADE)?;
    let farm_names = if has_column(&plots, fazenda::NOME_FAZENDA) {
        text_values(&plots, fazenda::NOME_FAZENDA)?
    } else {
        farms.clone()
    };

    let first_plot = |hybrid: &str| -> BTreeMap<&str, usize> {
        let mut rows = BTreeMap::new();
        for (i, (farm, name)) in farms.iter().zip(&names).enumerate() {
            if let (Some(farm), Some(name)) = (farm, name) {
                if name == hybrid {
                    rows.entry(farm.as_str()).or_insert(i);
                }
            }
        }
        rows
    };
    let head_rows = first_plot(head);
    let check_rows = first_plot(check);

    let shared: Vec<(&str, usize, usize)> = head_rows
        .iter()
        .filter_map(|(farm, &h)| check_rows.get(farm).map(|&c| (*farm, h, c)))
        .collect();
    let head_idx: Vec<usize> = shared.iter().map(|s| s.1).collect();
    let check_idx: Vec<usize> = shared.iter().map(|s| s.2).collect();
    let pick = |values: &[Option<f64>], rows: &[usize]| -> Vec<Option<f64>> {
        rows.iter().map(|&i| values[i]).collect()
    };

    let head_prod = pick(&prods, &head_idx);
    let check_prod = pick(&prods, &check_idx);
    let diffs: Vec<Option<f64>> = head_prod
        .iter()
        .zip(&check_prod)
        .map(|(h, c)| h.zip(*c).map(|(h, c)| round1(h - c)))
        .collect();

    let n = shared.len();
    let farm_refs: Vec<&str> = shared.iter().map(|s| s.0).collect();
    let location_names: Vec<Option<String>> =
        shared.iter().map(|s| farm_names[s.1].clone()).collect();

    let locations = DataFrame::new(vec![
        Column::new(treatment::FAZENDA_REF.into(), &farm_refs),
        Column::new(fazenda::NOME_FAZENDA.into(), &location_names),
        Column::new(analysis::HEAD.into(), vec![head; n]),
        Column::new(analysis::HEAD_POP.into(), &pick(&pops, &head_idx)),
        Column::new(analysis::HEAD_UMD.into(), &pick(&umds, &head_idx)),
        Column::new(analysis::HEAD_PROD.into(), &head_prod),
        Column::new(analysis::CHECK.into(), vec![check; n]),
        Column::new(analysis::CHECK_POP.into(), &pick(&pops, &check_idx)),
        Column::new(analysis::CHECK_UMD.into(), &pick(&umds, &check_idx)),
        Column::new(analysis::CHECK_PROD.into(), &check_prod),
        Column::new(analysis::DIFF_SC_HA.into(), &diffs),
    ])?;

    let summary = H2hSummary::from_diffs(&diffs);
    debug!(head, check, locations = n, wins = summary.wins, "head to head");
    Ok(HeadToHead { locations, summary })
}

/// Mean yield, population and moisture per farm and treatment index.
fn plot_means(df: &DataFrame) -> Result<DataFrame> {
    let measures = [
        derived::PROD_SC_HA_CORR,
        derived::NUM_PLANTAS_HA,
        treatment::HUMIDADE,
    ];
    let mut df = df.clone();
    cast_f64(&mut df, &measures)?;

    let mut aggs: Vec<Expr> = measures
        .iter()
        .filter(|c| has_column(&df, c))
        .map(|c| col(*c).mean())
        .collect();
    aggs.push(col(treatment::NOME).drop_nulls().first());
    if has_column(&df, fazenda::NOME_FAZENDA) {
        aggs.push(col(fazenda::NOME_FAZENDA).drop_nulls().first());
    }

    Ok(df
        .lazy()
        .with_columns([
            col(treatment::FAZENDA_REF).cast(DataType::String),
            col(treatment::INDEX_TRATAMENTO).cast(DataType::String),
        ])
        .group_by_stable([col(treatment::FAZENDA_REF), col(treatment::INDEX_TRATAMENTO)])
        .agg(aggs)
        .collect()?)
}

fn optional_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    if has_column(df, name) {
        f64_values(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;
    use pretty_assertions::assert_eq;

    #[test]
    fn offset_rule_pairs_second_planting() {
        let rule = PairingRule::Offset;
        assert_eq!(rule.pair(205), 105);
        assert_eq!(rule.pair(221), 121);
        assert_eq!(rule.pair(222), 222);
        assert_eq!(rule.pair(101), 101);
    }

    #[test]
    fn joint_table_groups_219_with_208() {
        let rule = PairingRule::joint_table();
        assert_eq!(rule.pair(219), 208);
        assert_eq!(rule.pair(208), 208);
        assert_eq!(rule.pair(207), 107);
        match rule {
            PairingRule::Table(pairs) => assert_eq!(pairs.len(), 20),
            PairingRule::Offset => unreachable!(),
        }
    }

    #[test]
    fn joint_analysis_averages_pairs_and_ignores_zeros() {
        let df = df!(
            "fazendaRef" => ["F1", "F1", "F1", "F2"],
            "indexTratamento" => ["101", "201", "102", "101"],
            "nome" => ["AG", "AG", "BX", "AG"],
            "prod_sc_ha_corr" => [100.0, 120.0, 90.0, 0.0]
        )
        .unwrap();

        let joint = joint_analysis(&df, &PairingRule::Offset).unwrap();

        assert_eq!(joint.height(), 3);
        assert_eq!(
            text_values(&joint, analysis::INDEX_AGRUPADO).unwrap(),
            vec![Some("101".to_string()), Some("102".to_string()), Some("101".to_string())]
        );
        assert_eq!(
            f64_values(&joint, derived::PROD_SC_HA_CORR).unwrap(),
            vec![Some(110.0), Some(90.0), None]
        );
        assert_eq!(
            text_values(&joint, treatment::NOME).unwrap(),
            vec![Some("AG".to_string()), Some("BX".to_string()), Some("AG".to_string())]
        );
    }

    #[test]
    fn environmental_index_is_the_farm_mean() {
        let df = df!(
            "fazendaRef" => ["F1", "F1", "F2"],
            "prod_sc_ha_corr" => [Some(100.0), Some(80.0), None]
        )
        .unwrap();

        let out = environmental_index(&df).unwrap();

        assert_eq!(
            f64_values(&out, analysis::MEDIA_LOCAL_SC_HA).unwrap(),
            vec![Some(90.0), Some(90.0), None]
        );
    }

    #[test]
    fn ranking_uses_min_method_for_ties() {
        let df = df!(
            "fazendaRef" => ["F1", "F1", "F1", "F1", "F2"],
            "prod_sc_ha_corr" => [Some(200.0), Some(150.0), Some(200.0), None, Some(80.0)]
        )
        .unwrap();

        let out = response_ranking(&df).unwrap();

        let rank: Vec<Option<i64>> = out
            .column(analysis::RANKING)
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(rank, vec![Some(1), Some(3), Some(1), None, Some(1)]);
        assert_eq!(
            f64_values(&out, analysis::PROD_REL_PCT).unwrap(),
            vec![Some(100.0), Some(75.0), Some(100.0), None, Some(100.0)]
        );
        assert_eq!(
            f64_values(&out, analysis::DIFF_TO_MAX).unwrap(),
            vec![Some(0.0), Some(50.0), Some(0.0), None, Some(0.0)]
        );
    }

    #[test]
    fn disease_summary_counts_incidence_below_six() {
        let df = df!(
            "nome" => ["B", "A", "A", "A", "B"],
            "manchaBranca" => [Some(9.0), Some(5.0), Some(7.0), None, Some(8.0)],
            "enfezamento" => [None::<f64>, Some(3.0), Some(3.0), Some(9.0), None]
        )
        .unwrap();

        let out = disease_summary(&df).unwrap();

        assert_eq!(
            text_values(&out, treatment::NOME).unwrap(),
            vec![Some("A".to_string()), Some("B".to_string())]
        );
        assert_eq!(
            f64_values(&out, "manchaBranca_mean").unwrap(),
            vec![Some(6.0), Some(8.5)]
        );
        assert_eq!(
            f64_values(&out, "manchaBranca_inc_per").unwrap(),
            vec![Some(50.0), Some(0.0)]
        );
        assert_eq!(f64_values(&out, "enfezamento_max").unwrap(), vec![Some(9.0), None]);
        assert_eq!(f64_values(&out, "enfezamento_inc_per").unwrap()[1], Some(0.0));
        assert!(!has_column(&out, "manchaTurcicum_mean"));
    }

    #[test]
    fn summary_buckets_by_one_sack_margin() {
        let summary = H2hSummary::from_diffs(&[Some(5.0), Some(3.0), Some(1.0), Some(-0.5), Some(-4.0), None]);
        assert_eq!(
            summary,
            H2hSummary {
                wins: 2,
                ties: 2,
                losses: 1,
                max_win: 5.0,
                mean_win: 4.0,
                min_loss: -4.0,
                mean_loss: -4.0,
            }
        );
        assert_eq!(H2hSummary::from_diffs(&[]), H2hSummary::default());
    }

    #[test]
    fn head_to_head_compares_shared_farms_only() {
        let df = df!(
            "fazendaRef" => ["F2", "F2", "F1", "F1", "F3"],
            "nomeFazenda" => ["SAO JOAO", "SAO JOAO", "BOA VISTA", "BOA VISTA", "OUTRA"],
            "indexTratamento" => ["101", "102", "101", "102", "101"],
            "nome" => ["AG", "BX", "AG", "BX", "AG"],
            "prod_sc_ha_corr" => [180.0, 170.04, 150.0, 150.5, 200.0],
            "humidade" => [22.0, 21.0, 20.0, 19.0, 18.0]
        )
        .unwrap();

        let h2h = head_to_head(&df, "AG", "BX").unwrap();

        assert_eq!(
            text_values(&h2h.locations, treatment::FAZENDA_REF).unwrap(),
            vec![Some("F1".to_string()), Some("F2".to_string())]
        );
        assert_eq!(
            f64_values(&h2h.locations, analysis::DIFF_SC_HA).unwrap(),
            vec![Some(-0.5), Some(10.0)]
        );
        assert_eq!(
            f64_values(&h2h.locations, analysis::CHECK_UMD).unwrap(),
            vec![Some(19.0), Some(21.0)]
        );
        assert_eq!(h2h.summary.wins, 1);
        assert_eq!(h2h.summary.ties, 1);
        assert_eq!(h2h.summary.losses, 0);
    }

    #[test]
    fn head_to_head_rejects_self_comparison() {
        let df = df!(
            "fazendaRef" => ["F1"],
            "indexTratamento" => ["101"],
            "nome" => ["AG"],
            "prod_sc_ha_corr" => [100.0]
        )
        .unwrap();
        assert!(matches!(
            head_to_head(&df, "AG", "AG"),
            Err(TrialError::InvalidData(_))
        ));
    }
}
